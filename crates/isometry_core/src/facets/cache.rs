//! Staleness-bounded cache around facet discovery.
//!
//! Keyed by `(column, multi_select)`. Entries expire after the TTL and are
//! re-discovered on the next read; writers may invalidate eagerly.

use crate::config::EngineConfig;
use crate::error::CoreResult;
use crate::facets::discovery::{try_discover_facets, FacetQueryOptions};
use crate::model::facet::Facet;
use moka::sync::Cache;
use rusqlite::Connection;
use std::time::Duration;

/// Facet discovery cache owned by the UI-facing caller.
pub struct FacetCache {
    entries: Cache<(String, bool), Vec<Facet>>,
}

impl FacetCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Cache::builder().time_to_live(ttl).build(),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.facet_cache_ttl())
    }

    /// Returns cached facets when fresh, otherwise discovers and stores them.
    ///
    /// An uninitialized store yields an empty list that is not remembered.
    pub fn get_or_discover(
        &self,
        conn: &Connection,
        column: &str,
        options: &FacetQueryOptions,
    ) -> CoreResult<Vec<Facet>> {
        let key = (column.to_string(), options.explodes(column));
        if let Some(facets) = self.entries.get(&key) {
            return Ok(facets);
        }

        match try_discover_facets(conn, column, options)? {
            Some(facets) => {
                self.entries.insert(key, facets.clone());
                Ok(facets)
            }
            None => Ok(Vec::new()),
        }
    }

    /// Drops both single- and multi-select entries of `column`.
    pub fn invalidate(&self, column: &str) {
        for multi_select in [false, true] {
            self.entries.invalidate(&(column.to_string(), multi_select));
        }
    }

    pub fn invalidate_all(&self) {
        self.entries.invalidate_all();
    }

    /// Live entries after pending expirations and invalidations are applied.
    pub fn len(&self) -> usize {
        self.entries.run_pending_tasks();
        usize::try_from(self.entries.entry_count()).unwrap_or(usize::MAX)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
