//! Explicit filter state value threaded into compile calls.

use crate::error::ValidationError;
use crate::filter::clause::FilterClause;
use crate::filter::compiler::{compile_filters, CompiledFilter};
use crate::model::facet::LatchAxis;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Axis → clauses, as chosen in the filter UI.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterState {
    clauses: BTreeMap<LatchAxis, Vec<FilterClause>>,
}

impl FilterState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one clause after validating the resulting state.
    ///
    /// # Errors
    /// Returns the compile error and leaves the state untouched.
    pub fn apply(&mut self, clause: FilterClause) -> Result<(), ValidationError> {
        let mut candidate = self.clauses.clone();
        candidate.entry(clause.axis()).or_default().push(clause);
        if let Err(err) = compile_filters(&candidate) {
            debug!("event=filter_apply module=filter status=rejected error={err}");
            return Err(err);
        }
        self.clauses = candidate;
        Ok(())
    }

    /// Removes every clause on `axis` targeting `facet_key`.
    pub fn remove_facet(&mut self, axis: LatchAxis, facet_key: &str) {
        if let Some(clauses) = self.clauses.get_mut(&axis) {
            clauses.retain(|clause| clause.facet_key() != facet_key);
            if clauses.is_empty() {
                self.clauses.remove(&axis);
            }
        }
    }

    pub fn remove_axis(&mut self, axis: LatchAxis) {
        self.clauses.remove(&axis);
    }

    pub fn clear(&mut self) {
        self.clauses.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn clauses(&self, axis: LatchAxis) -> &[FilterClause] {
        self.clauses.get(&axis).map_or(&[], Vec::as_slice)
    }

    pub fn compile(&self) -> Result<CompiledFilter, ValidationError> {
        compile_filters(&self.clauses)
    }
}
