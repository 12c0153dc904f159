//! Connection (labeled edge) domain model.
//!
//! # Responsibility
//! - Define the relationship record traversed by the graph engine.
//! - Normalize labels so traversal allow-lists match reliably.
//!
//! # Invariants
//! - `label` is free-form, lower-case, with single inner spaces. The `LABEL_*`
//!   constants name the labels the traversal constructors follow.
//! - `(source_id, target_id, via_id)` is unique in storage.
//! - `related` edges carry a weight in `[0, 1]`.

use crate::model::item::ItemId;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid ws regex"));

/// Stable identifier of a connection.
pub type EdgeId = String;

/// Semantics-free cross reference.
pub const LABEL_LINK: &str = "link";
/// Target sits structurally below the source.
pub const LABEL_PARENT: &str = "parent";
/// Source comes before the target in a sequence.
pub const LABEL_PRECEDES: &str = "precedes";
/// Similarity edge; weight is strength in `[0, 1]`.
pub const LABEL_RELATED: &str = "related";

pub const DEFAULT_EDGE_WEIGHT: f64 = 1.0;

/// Directed labeled connection between two items, optionally reified through
/// a third `via` item (e.g. a meeting bridging two people).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    pub source_id: ItemId,
    pub target_id: ItemId,
    pub via_id: Option<ItemId>,
    pub label: String,
    pub weight: f64,
    /// Epoch milliseconds.
    pub created_at: i64,
}

impl Edge {
    /// Creates an edge with a generated ID, normalized label and default weight.
    pub fn new(
        source_id: impl Into<ItemId>,
        target_id: impl Into<ItemId>,
        label: &str,
        created_at: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            source_id: source_id.into(),
            target_id: target_id.into(),
            via_id: None,
            label: normalize_label(label),
            weight: DEFAULT_EDGE_WEIGHT,
            created_at,
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_via(mut self, via_id: impl Into<ItemId>) -> Self {
        self.via_id = Some(via_id.into());
        self
    }

    /// Validates edge invariants before persistence.
    pub fn validate(&self) -> Result<(), EdgeValidationError> {
        if self.source_id.trim().is_empty() || self.target_id.trim().is_empty() {
            return Err(EdgeValidationError::MissingEndpoint);
        }
        if self.label.is_empty() {
            return Err(EdgeValidationError::EmptyLabel);
        }
        if self.label != normalize_label(&self.label) {
            return Err(EdgeValidationError::UnnormalizedLabel(self.label.clone()));
        }
        if !self.weight.is_finite() {
            return Err(EdgeValidationError::NonFiniteWeight);
        }
        if self.label == LABEL_RELATED && !(0.0..=1.0).contains(&self.weight) {
            return Err(EdgeValidationError::RelatedWeightOutOfRange(self.weight));
        }
        Ok(())
    }
}

/// Edge validation failures.
#[derive(Debug, Clone, PartialEq)]
pub enum EdgeValidationError {
    MissingEndpoint,
    EmptyLabel,
    UnnormalizedLabel(String),
    NonFiniteWeight,
    RelatedWeightOutOfRange(f64),
}

impl Display for EdgeValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingEndpoint => write!(f, "connection requires source and target ids"),
            Self::EmptyLabel => write!(f, "connection label must not be blank"),
            Self::UnnormalizedLabel(label) => {
                write!(f, "connection label `{label}` is not normalized")
            }
            Self::NonFiniteWeight => write!(f, "connection weight must be finite"),
            Self::RelatedWeightOutOfRange(weight) => {
                write!(f, "related weight {weight} must lie in [0, 1]")
            }
        }
    }
}

impl Error for EdgeValidationError {}

/// Lower-cases a label and collapses whitespace runs into single spaces.
pub fn normalize_label(label: &str) -> String {
    WHITESPACE_RE
        .replace_all(label.trim(), " ")
        .to_lowercase()
}
