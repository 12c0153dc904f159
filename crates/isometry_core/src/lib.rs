//! Query and aggregation core for the Isometry knowledge graph.
//!
//! Filter clauses on the five LATCH axes compile into one predicate that the
//! density aggregation engine and the graph traversal engine both embed, so
//! grid and network views always agree on the filtered item set.

pub mod aggregate;
pub mod cancel;
pub mod config;
pub mod db;
pub mod error;
pub mod facets;
pub mod filter;
pub mod graph;
pub mod logging;
pub mod model;
pub mod repo;

pub use aggregate::density::{DensityState, ExtentDensity, RegionOverride, ValueDensity};
pub use aggregate::engine::{
    AggregatedRow, AggregationEngine, AggregationMetrics, AggregationPlan, AggregationRequest,
    AggregationResult, GridAxis,
};
pub use aggregate::granularity::{select_time_granularity, TimeGranularity};
pub use cancel::CancelToken;
pub use config::EngineConfig;
pub use db::{data_version, open_db, open_db_in_memory, DbError};
pub use error::{CoreError, CoreResult, ValidationError};
pub use facets::cache::FacetCache;
pub use facets::discovery::{discover_facets, FacetQueryOptions};
pub use filter::clause::{FilterClause, FilterValue};
pub use filter::compiler::{compile_clauses, compile_filters, CompiledFilter};
pub use filter::state::FilterState;
pub use graph::traversal::{
    TraversalEngine, TraversalHit, TraversalRequest, TraversalResult, WeightMode,
};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::edge::Edge;
pub use model::facet::{Facet, LatchAxis, TextProperty};
pub use model::item::{Item, ItemId, ItemType};
pub use repo::edge_repo::{EdgeRepository, SqliteEdgeRepository};
pub use repo::item_repo::{
    ItemListQuery, ItemRepository, RepoError, RepoResult, SqliteItemRepository,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
