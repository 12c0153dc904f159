//! Engine tuning knobs threaded explicitly into every engine call.
//!
//! # Invariants
//! - Defaults match interactive-grid expectations (100 ms target, depth 10).
//! - Configuration is a plain value; engines never keep global state.

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_PERFORMANCE_TARGET_MS: u64 = 100;
pub const DEFAULT_LEAF_ROW_LIMIT: u32 = 5_000;
pub const DEFAULT_MAX_GRANULARITY_LEVEL: u8 = 5;
pub const DEFAULT_MAX_TRAVERSAL_DEPTH: u32 = 10;
pub const DEFAULT_MAX_SPARSE_CELLS: usize = 10_000;
pub const DEFAULT_FACET_CACHE_TTL_SECS: u64 = 300;

/// Configuration shared by aggregation, traversal and facet caching.
///
/// Deserializable so hosts can load it from their own settings files; missing
/// fields fall back to defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Aggregations slower than this are flagged, not failed.
    pub performance_target_ms: u64,
    /// Safety cap on ungrouped rows returned in leaf mode.
    pub leaf_row_limit: u32,
    /// Highest accepted per-axis granularity level.
    pub max_granularity_level: u8,
    /// Hard ceiling for traversal depth, also used when callers omit one.
    pub max_traversal_depth: u32,
    /// Upper bound on cells materialized by sparse extent.
    pub max_sparse_cells: usize,
    /// Staleness window for cached facet discovery.
    pub facet_cache_ttl_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            performance_target_ms: DEFAULT_PERFORMANCE_TARGET_MS,
            leaf_row_limit: DEFAULT_LEAF_ROW_LIMIT,
            max_granularity_level: DEFAULT_MAX_GRANULARITY_LEVEL,
            max_traversal_depth: DEFAULT_MAX_TRAVERSAL_DEPTH,
            max_sparse_cells: DEFAULT_MAX_SPARSE_CELLS,
            facet_cache_ttl_secs: DEFAULT_FACET_CACHE_TTL_SECS,
        }
    }
}

impl EngineConfig {
    pub fn performance_target(&self) -> Duration {
        Duration::from_millis(self.performance_target_ms)
    }

    pub fn facet_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.facet_cache_ttl_secs)
    }
}
