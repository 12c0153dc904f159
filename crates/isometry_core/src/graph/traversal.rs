//! Breadth-first reachability over labeled connections.
//!
//! # Responsibility
//! - Expand from start items with one recursive CTE, bounded by depth.
//! - Apply the label allow-list, weight threshold and compiled filter to
//!   every expansion step.
//!
//! # Invariants
//! - The depth bound is the only cycle guard; diamonds and revisits are
//!   reported, so dense graphs may repeat work up to the bound.
//! - Soft-deleted targets are never followed, whatever the filter says.
//! - Unknown or deleted start ids contribute nothing.

use crate::cancel::{CancelToken, InterruptGuard};
use crate::config::EngineConfig;
use crate::db::{data_version, ensure_store_ready, DbError};
use crate::error::{CoreError, CoreResult, ValidationError};
use crate::filter::compiler::CompiledFilter;
use crate::filter::predicate::SqlFragment;
use crate::model::edge::{LABEL_PARENT, LABEL_PRECEDES, LABEL_RELATED};
use crate::model::item::ItemId;
use log::debug;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::time::Instant;

/// How edge weights accumulate along a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightMode {
    /// Product of weights, starting at 1.0 (similarity strength).
    #[default]
    Multiplicative,
    /// Sum of weights, starting at 0.0 (path cost).
    Additive,
}

impl WeightMode {
    fn seed(self) -> f64 {
        match self {
            Self::Multiplicative => 1.0,
            Self::Additive => 0.0,
        }
    }

    fn operator(self) -> &'static str {
        match self {
            Self::Multiplicative => "*",
            Self::Additive => "+",
        }
    }

    /// Ordering where `Less` means `left` is the better weight.
    fn prefer(self, left: f64, right: f64) -> Ordering {
        match self {
            Self::Multiplicative => right.total_cmp(&left),
            Self::Additive => left.total_cmp(&right),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraversalRequest {
    pub start_ids: Vec<ItemId>,
    /// Edge labels to follow; `None` follows every label.
    pub labels: Option<Vec<String>>,
    /// Defaults to, and may not exceed, the configured ceiling.
    pub max_depth: Option<u32>,
    /// Only edges with `weight >= min_edge_weight` are followed.
    pub min_edge_weight: Option<f64>,
    #[serde(default)]
    pub weight_mode: WeightMode,
    /// Report every path instead of the best minimum-depth one per item.
    #[serde(default)]
    pub all_paths: bool,
}

impl TraversalRequest {
    pub fn new<I, S>(start_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<ItemId>,
    {
        Self {
            start_ids: start_ids.into_iter().map(Into::into).collect(),
            labels: None,
            max_depth: None,
            min_edge_weight: None,
            weight_mode: WeightMode::default(),
            all_paths: false,
        }
    }

    /// Descendants along `parent` edges.
    pub fn hierarchy<I, S>(start_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<ItemId>,
    {
        Self::new(start_ids).with_labels([LABEL_PARENT])
    }

    /// Similar items along `related` edges at or above `threshold`, every path.
    pub fn affinity<I, S>(start_ids: I, threshold: f64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<ItemId>,
    {
        Self::new(start_ids)
            .with_labels([LABEL_RELATED])
            .with_min_edge_weight(threshold)
            .with_all_paths(true)
    }

    /// Successors along `precedes` edges with cumulative cost.
    pub fn sequence<I, S>(start_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<ItemId>,
    {
        Self::new(start_ids)
            .with_labels([LABEL_PRECEDES])
            .with_weight_mode(WeightMode::Additive)
    }

    pub fn with_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels = Some(labels.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_max_depth(mut self, depth: u32) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn with_min_edge_weight(mut self, weight: f64) -> Self {
        self.min_edge_weight = Some(weight);
        self
    }

    pub fn with_weight_mode(mut self, mode: WeightMode) -> Self {
        self.weight_mode = mode;
        self
    }

    pub fn with_all_paths(mut self, all_paths: bool) -> Self {
        self.all_paths = all_paths;
        self
    }
}

/// One reached item. Start items appear at depth 0 with an empty path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraversalHit {
    pub id: ItemId,
    /// Item the last edge came from.
    pub parent_id: Option<ItemId>,
    pub depth: u32,
    /// Edge labels from the start item, in order.
    pub path: Vec<String>,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TraversalResult {
    pub hits: Vec<TraversalHit>,
    pub max_depth: u32,
    pub data_version: i64,
}

impl TraversalResult {
    pub fn ids(&self) -> Vec<&str> {
        self.hits.iter().map(|hit| hit.id.as_str()).collect()
    }

    pub fn get(&self, id: &str) -> Option<&TraversalHit> {
        self.hits.iter().find(|hit| hit.id == id)
    }
}

pub struct TraversalEngine<'conn> {
    conn: &'conn Connection,
    config: EngineConfig,
}

impl<'conn> TraversalEngine<'conn> {
    /// Creates an engine after verifying store readiness.
    pub fn try_new(conn: &'conn Connection, config: EngineConfig) -> CoreResult<Self> {
        ensure_store_ready(conn).map_err(CoreError::Initialization)?;
        Ok(Self { conn, config })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Expands `request` and returns reached items ordered by depth, then id.
    ///
    /// `filter` is applied to every target; its `include_deleted` flag is
    /// ignored.
    ///
    /// # Errors
    /// - `ValidationError` for depth above the ceiling, an empty label
    ///   allow-list or a non-finite weight threshold.
    /// - `Cancelled` when `cancel` fires mid-query.
    pub fn traverse(
        &self,
        request: &TraversalRequest,
        filter: Option<&CompiledFilter>,
        cancel: Option<&CancelToken>,
    ) -> CoreResult<TraversalResult> {
        let max_depth = self.validate(request)?;
        let started_at = Instant::now();
        if let Some(token) = cancel {
            token.check()?;
        }
        let _guard = InterruptGuard::arm(self.conn, cancel);

        let data_version = data_version(self.conn).map_err(|err| match err {
            DbError::Sqlite(source) => CoreError::store("SELECT value FROM store_meta", source),
            other => CoreError::Initialization(other),
        })?;

        if request.start_ids.is_empty() {
            return Ok(TraversalResult {
                hits: Vec::new(),
                max_depth,
                data_version,
            });
        }

        let fragment = build_walk_query(request, max_depth, filter);
        let sql = fragment.sql;
        let mut stmt = self
            .conn
            .prepare(&sql)
            .map_err(|err| CoreError::store(&sql, err))?;
        let mut rows = stmt
            .query(params_from_iter(fragment.params.iter()))
            .map_err(|err| CoreError::store(&sql, err))?;

        let mut hits = Vec::new();
        while let Some(row) = rows.next().map_err(|err| CoreError::store(&sql, err))? {
            let path_json: String = row.get("path").map_err(|err| CoreError::store(&sql, err))?;
            let path: Vec<String> = serde_json::from_str(&path_json).map_err(|err| {
                CoreError::InvalidData(format!("invalid traversal path `{path_json}`: {err}"))
            })?;
            hits.push(TraversalHit {
                id: row.get("id").map_err(|err| CoreError::store(&sql, err))?,
                parent_id: row
                    .get("parent_id")
                    .map_err(|err| CoreError::store(&sql, err))?,
                depth: row.get("depth").map_err(|err| CoreError::store(&sql, err))?,
                path,
                weight: row.get("weight").map_err(|err| CoreError::store(&sql, err))?,
            });
        }

        let walked = hits.len();
        if !request.all_paths {
            hits = keep_best_per_item(hits, request.weight_mode);
        }

        debug!(
            "event=traverse module=graph status=ok starts={} max_depth={} walked={} hits={} duration_ms={}",
            request.start_ids.len(),
            max_depth,
            walked,
            hits.len(),
            started_at.elapsed().as_millis()
        );

        Ok(TraversalResult {
            hits,
            max_depth,
            data_version,
        })
    }

    fn validate(&self, request: &TraversalRequest) -> Result<u32, ValidationError> {
        let ceiling = self.config.max_traversal_depth;
        let max_depth = request.max_depth.unwrap_or(ceiling);
        if max_depth > ceiling {
            return Err(ValidationError::DepthOutOfRange {
                requested: max_depth,
                max: ceiling,
            });
        }
        if request.labels.as_ref().is_some_and(Vec::is_empty) {
            return Err(ValidationError::EmptyLabelAllowList);
        }
        if let Some(weight) = request.min_edge_weight {
            if !weight.is_finite() {
                return Err(ValidationError::InvalidWeightThreshold(weight));
            }
        }
        Ok(max_depth)
    }
}

fn build_walk_query(
    request: &TraversalRequest,
    max_depth: u32,
    filter: Option<&CompiledFilter>,
) -> SqlFragment {
    let mode = request.weight_mode;
    let mut out = SqlFragment::new();
    out.push_sql(&format!(
        "WITH RECURSIVE walk(id, parent_id, depth, path, weight) AS (
            SELECT s.id, NULL, 0, json_array(), {:?}
            FROM items s
            WHERE s.deleted_at IS NULL AND s.id IN (",
        mode.seed()
    ));
    for (index, id) in request.start_ids.iter().enumerate() {
        if index > 0 {
            out.push_sql(", ");
        }
        out.push_param(Value::Text(id.clone()));
    }
    out.push_sql(&format!(
        ")
            UNION ALL
            SELECT c.target_id, walk.id, walk.depth + 1,
                   json_insert(walk.path, '$[#]', c.label),
                   walk.weight {} c.weight
            FROM walk
            JOIN connections c ON c.source_id = walk.id
            JOIN items t ON t.id = c.target_id
            WHERE walk.depth < ",
        mode.operator()
    ));
    out.push_param(Value::Integer(i64::from(max_depth)));

    if let Some(labels) = &request.labels {
        out.push_sql(" AND c.label IN (");
        for (index, label) in labels.iter().enumerate() {
            if index > 0 {
                out.push_sql(", ");
            }
            out.push_param(Value::Text(label.trim().to_lowercase()));
        }
        out.push_sql(")");
    }
    if let Some(weight) = request.min_edge_weight {
        out.push_sql(" AND c.weight >= ");
        out.push_param(Value::Real(weight));
    }

    let target_filter = filter
        .cloned()
        .unwrap_or_default()
        .with_deleted(false)
        .render("t");
    out.push_sql(" AND ");
    out.append(&target_filter);
    out.push_sql(
        "
        )
        SELECT id, parent_id, depth, path, weight
        FROM walk
        ORDER BY depth ASC, id ASC, path ASC, parent_id ASC;",
    );
    out
}

/// Minimum depth wins, then the better weight, the smaller path and parent.
fn keep_best_per_item(hits: Vec<TraversalHit>, mode: WeightMode) -> Vec<TraversalHit> {
    let mut best: HashMap<ItemId, TraversalHit> = HashMap::new();
    for hit in hits {
        match best.get(&hit.id) {
            Some(current) if compare_hits(current, &hit, mode) != Ordering::Greater => {}
            _ => {
                best.insert(hit.id.clone(), hit);
            }
        }
    }
    let mut out: Vec<TraversalHit> = best.into_values().collect();
    out.sort_by(|left, right| {
        left.depth
            .cmp(&right.depth)
            .then_with(|| left.id.cmp(&right.id))
    });
    out
}

fn compare_hits(left: &TraversalHit, right: &TraversalHit, mode: WeightMode) -> Ordering {
    left.depth
        .cmp(&right.depth)
        .then_with(|| mode.prefer(left.weight, right.weight))
        .then_with(|| left.path.cmp(&right.path))
        .then_with(|| left.parent_id.cmp(&right.parent_id))
}

#[cfg(test)]
mod tests {
    use super::{keep_best_per_item, TraversalHit, WeightMode};

    fn hit(id: &str, depth: u32, path: &[&str], weight: f64) -> TraversalHit {
        TraversalHit {
            id: id.to_string(),
            parent_id: None,
            depth,
            path: path.iter().map(|label| label.to_string()).collect(),
            weight,
        }
    }

    #[test]
    fn shallowest_then_strongest_wins() {
        let hits = vec![
            hit("d", 2, &["link", "link"], 0.2),
            hit("d", 2, &["related", "related"], 0.8),
            hit("d", 3, &["link", "link", "link"], 0.9),
        ];
        let best = keep_best_per_item(hits, WeightMode::Multiplicative);
        assert_eq!(best.len(), 1);
        assert_eq!(best[0].weight, 0.8);
    }

    #[test]
    fn additive_prefers_lower_cost() {
        let hits = vec![
            hit("c", 2, &["precedes", "precedes"], 7.0),
            hit("c", 2, &["precedes", "precedes"], 4.0),
        ];
        let best = keep_best_per_item(hits, WeightMode::Additive);
        assert_eq!(best[0].weight, 4.0);
    }

    #[test]
    fn path_breaks_exact_ties() {
        let hits = vec![hit("x", 1, &["parent"], 1.0), hit("x", 1, &["link"], 1.0)];
        let best = keep_best_per_item(hits, WeightMode::Multiplicative);
        assert_eq!(best[0].path, vec!["link".to_string()]);
    }
}
