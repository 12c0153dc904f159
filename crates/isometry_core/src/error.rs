//! Error taxonomy shared by the filter compiler and query engines.
//!
//! # Invariants
//! - `Validation` errors are raised before any store round-trip.
//! - `Store` errors always carry the SQL shape that failed (never the bound values).
//! - An interrupted query surfaces as `Cancelled`, not as a store failure.

use crate::db::DbError;
use crate::model::facet::LatchAxis;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type CoreResult<T> = Result<T, CoreError>;

/// Caller-recoverable input problems: reject the request, keep prior state.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Column is not part of the facet catalog.
    UnknownFacet(String),
    /// Column exists but belongs to a different LATCH axis.
    FacetAxisMismatch {
        facet: String,
        expected: LatchAxis,
        actual: LatchAxis,
    },
    /// Operator cannot be applied to the column's value kind.
    UnsupportedOperator {
        facet: String,
        operator: &'static str,
    },
    /// Range lower bound exceeds upper bound.
    InvalidRange {
        facet: String,
        min: String,
        max: String,
    },
    /// Clause value type does not fit the column (e.g. text bound on a number).
    IncompatibleValueType { facet: String },
    /// `in_list` clause without values.
    EmptyInList { facet: String },
    /// `text_match` clause with a blank query.
    BlankTextQuery { property: &'static str },
    /// Granularity level outside the configured range.
    GranularityOutOfRange {
        axis: LatchAxis,
        level: u8,
        max: u8,
    },
    /// Two region overrides target the same axis scope.
    OverlappingRegionOverrides { axis: LatchAxis },
    /// Aggregation request names no grid axis.
    MissingGridAxes,
    /// Multi-valued columns cannot partition items into disjoint cells.
    MultiValuedGridAxis { facet: String },
    /// Sparse extent would materialize too many cells.
    SparseGridTooLarge { cells: usize, limit: usize },
    /// Drill-down keys do not match the plan's grid axes.
    CellKeyMismatch { expected: usize, actual: usize },
    /// Traversal depth above the configured ceiling.
    DepthOutOfRange { requested: u32, max: u32 },
    /// Edge weight threshold is not a finite number.
    InvalidWeightThreshold(f64),
    /// Label allow-list given but empty.
    EmptyLabelAllowList,
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownFacet(facet) => write!(f, "unknown facet column `{facet}`"),
            Self::FacetAxisMismatch {
                facet,
                expected,
                actual,
            } => write!(
                f,
                "facet `{facet}` belongs to axis {actual}, not axis {expected}"
            ),
            Self::UnsupportedOperator { facet, operator } => {
                write!(f, "operator `{operator}` is not supported for facet `{facet}`")
            }
            Self::InvalidRange { facet, min, max } => {
                write!(f, "range on `{facet}` has min {min} greater than max {max}")
            }
            Self::IncompatibleValueType { facet } => {
                write!(f, "value type does not match facet `{facet}`")
            }
            Self::EmptyInList { facet } => write!(f, "in_list on `{facet}` has no values"),
            Self::BlankTextQuery { property } => {
                write!(f, "text_match on `{property}` has a blank query")
            }
            Self::GranularityOutOfRange { axis, level, max } => write!(
                f,
                "granularity level {level} for axis {axis} is outside 0..={max}"
            ),
            Self::OverlappingRegionOverrides { axis } => {
                write!(f, "region overrides overlap on axis {axis}")
            }
            Self::MissingGridAxes => write!(f, "aggregation requires at least one grid axis"),
            Self::MultiValuedGridAxis { facet } => {
                write!(f, "multi-valued facet `{facet}` cannot be a grid axis")
            }
            Self::SparseGridTooLarge { cells, limit } => write!(
                f,
                "sparse grid would materialize {cells} cells, limit is {limit}"
            ),
            Self::CellKeyMismatch { expected, actual } => write!(
                f,
                "cell has {actual} bucket keys, plan has {expected} grid axes"
            ),
            Self::DepthOutOfRange { requested, max } => {
                write!(f, "traversal depth {requested} exceeds maximum {max}")
            }
            Self::InvalidWeightThreshold(value) => {
                write!(f, "edge weight threshold {value} is not finite")
            }
            Self::EmptyLabelAllowList => write!(f, "edge label allow-list must not be empty"),
        }
    }
}

impl Error for ValidationError {}

/// Error returned by compiler, discovery, aggregation and traversal calls.
#[derive(Debug)]
pub enum CoreError {
    Validation(ValidationError),
    /// Store is not migrated or lacks a required capability. Retry once ready.
    Initialization(DbError),
    /// Underlying query failed; `query_shape` is the attempted SQL text.
    Store {
        query_shape: String,
        source: rusqlite::Error,
    },
    /// A cancel token fired while the call was running.
    Cancelled,
    /// Persisted row cannot be converted into a read model.
    InvalidData(String),
}

impl CoreError {
    /// Wraps a store failure, collapsing whitespace in the SQL for log output.
    pub(crate) fn store(sql: &str, source: rusqlite::Error) -> Self {
        if is_interrupt(&source) {
            return Self::Cancelled;
        }
        Self::Store {
            query_shape: sql.split_whitespace().collect::<Vec<_>>().join(" "),
            source,
        }
    }

    /// Returns whether the caller may simply fix the input and retry.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

impl Display for CoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "validation failed: {err}"),
            Self::Initialization(err) => write!(f, "store not initialized: {err}"),
            Self::Store {
                query_shape,
                source,
            } => write!(f, "store query failed: {source} (query: {query_shape})"),
            Self::Cancelled => write!(f, "operation cancelled"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for CoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Initialization(err) => Some(err),
            Self::Store { source, .. } => Some(source),
            Self::Cancelled => None,
            Self::InvalidData(_) => None,
        }
    }
}

impl From<ValidationError> for CoreError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

fn is_interrupt(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error {
                code: rusqlite::ErrorCode::OperationInterrupted,
                ..
            },
            _
        )
    )
}
