//! Ordered schema migrations for the item/connection store.
//!
//! # Invariants
//! - Versions are contiguous from 1 and never reused.
//! - All pending steps commit together; `PRAGMA user_version` tracks the last.

use crate::db::{DbError, DbResult};
use log::info;
use rusqlite::Connection;

/// `(version, name, sql)` in apply order.
const STEPS: &[(u32, &str, &str)] = &[
    (1, "items", include_str!("0001_items.sql")),
    (2, "items_fts", include_str!("0002_items_fts.sql")),
    (3, "facet_colors", include_str!("0003_facet_colors.sql")),
    (4, "data_version", include_str!("0004_data_version.sql")),
];

/// Schema version this build migrates to.
pub fn latest_version() -> u32 {
    STEPS.last().map_or(0, |(version, _, _)| *version)
}

/// Brings `conn` up to `latest_version()`.
///
/// # Errors
/// - `UnsupportedSchemaVersion` when the store was written by a newer build.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<()> {
    let from = current_user_version(conn)?;
    let to = latest_version();
    if from > to {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: from,
            latest_supported: to,
        });
    }

    let pending: Vec<_> = STEPS
        .iter()
        .filter(|(version, _, _)| *version > from)
        .collect();
    if pending.is_empty() {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for (version, name, sql) in &pending {
        tx.execute_batch(sql)?;
        tx.pragma_update(None, "user_version", *version)?;
        info!("event=db_migrate module=db status=ok version={version} name={name}");
    }
    tx.commit()?;
    info!("event=db_migrate module=db status=done from={from} to={to}");
    Ok(())
}

/// Reads `PRAGMA user_version`.
pub fn current_user_version(conn: &Connection) -> DbResult<u32> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
}
