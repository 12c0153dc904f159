//! Cooperative cancellation for long aggregations and traversals.
//!
//! A superseded request flips its token; the running query observes it
//! through SQLite's progress handler and aborts with `CoreError::Cancelled`.

use crate::error::{CoreError, CoreResult};
use rusqlite::Connection;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Number of SQLite VM instructions between cancellation polls.
const PROGRESS_POLL_OPS: i32 = 1_000;

/// Cloneable flag shared between a request and whoever may supersede it.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Returns `Err(Cancelled)` once the token has fired.
    pub fn check(&self) -> CoreResult<()> {
        if self.is_cancelled() {
            return Err(CoreError::Cancelled);
        }
        Ok(())
    }
}

/// Installs a progress handler polling `token` for the guard's lifetime.
pub(crate) struct InterruptGuard<'conn> {
    conn: &'conn Connection,
    armed: bool,
}

impl<'conn> InterruptGuard<'conn> {
    pub(crate) fn arm(conn: &'conn Connection, token: Option<&CancelToken>) -> Self {
        let Some(token) = token else {
            return Self { conn, armed: false };
        };
        let token = token.clone();
        conn.progress_handler(PROGRESS_POLL_OPS, Some(move || token.is_cancelled()));
        Self { conn, armed: true }
    }
}

impl Drop for InterruptGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.conn.progress_handler(0, None::<fn() -> bool>);
        }
    }
}
