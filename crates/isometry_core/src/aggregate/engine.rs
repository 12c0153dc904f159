//! Aggregation planning and execution against the item store.
//!
//! # Responsibility
//! - Validate grid axes and density before any store round-trip.
//! - Resolve per-axis bucketing (issuing the time-span probe for auto).
//! - Run grouped or leaf queries, materialize sparse extents, report metrics.
//!
//! # Invariants
//! - The filter predicate is embedded verbatim; values stay bound.
//! - Grouped rows carry every contributing id in `source_ids`.

use crate::aggregate::density::{AxisDensity, DensityState, ExtentDensity, ValueDensity};
use crate::aggregate::granularity::{day_span, select_time_granularity, Bucketing, TimeGranularity};
use crate::cancel::{CancelToken, InterruptGuard};
use crate::config::EngineConfig;
use crate::db::{data_version, ensure_store_ready, DbError};
use crate::error::{CoreError, CoreResult, ValidationError};
use crate::filter::compiler::CompiledFilter;
use crate::filter::predicate::SqlFragment;
use crate::model::facet::{lookup_facet, FacetColumn, FacetKind, LatchAxis};
use crate::model::item::{Item, ItemId};
use crate::repo::item_repo::{parse_item_row, RepoError, ITEM_SELECT_SQL};
use log::{debug, warn};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, Row};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// One grid dimension: a catalog column on its LATCH axis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridAxis {
    pub axis: LatchAxis,
    pub facet: String,
}

impl GridAxis {
    pub fn new(axis: LatchAxis, facet: impl Into<String>) -> Self {
        Self {
            axis,
            facet: facet.into(),
        }
    }
}

/// Grid axes plus the density levers for one aggregation call.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AggregationRequest {
    pub axes: Vec<GridAxis>,
    #[serde(default)]
    pub density: DensityState,
}

impl AggregationRequest {
    pub fn new(density: DensityState) -> Self {
        Self {
            axes: Vec::new(),
            density,
        }
    }

    /// Appends a grid axis; the first becomes `x`, the second `y`.
    pub fn axis(mut self, axis: LatchAxis, facet: impl Into<String>) -> Self {
        self.axes.push(GridAxis::new(axis, facet));
        self
    }
}

/// A grid axis with its levers and bucketing resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedAxis {
    pub axis: LatchAxis,
    pub column: FacetColumn,
    pub density: AxisDensity,
    pub bucketing: Bucketing,
}

impl PlannedAxis {
    fn qualified_column(&self) -> String {
        format!("i.{}", self.column.name)
    }

    fn key_sql(&self) -> String {
        self.bucketing.key_sql(&self.qualified_column())
    }

    fn orders_numerically(&self) -> bool {
        self.bucketing.is_numeric()
            || (self.bucketing == Bucketing::Exact && self.column.kind.is_numeric())
    }
}

/// Resolved, executable aggregation.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregationPlan {
    pub axes: Vec<PlannedAxis>,
    /// True when any axis is collapsed.
    pub grouped: bool,
    /// True when any axis asks for sparse extent.
    pub sparse: bool,
    pub view_mode: String,
    filter: CompiledFilter,
}

impl AggregationPlan {
    pub fn filter(&self) -> &CompiledFilter {
        &self.filter
    }
}

/// One grid cell (grouped) or one item (leaf).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatedRow {
    pub x: String,
    pub y: Option<String>,
    /// Bucket key per grid axis, in request order.
    pub keys: Vec<String>,
    pub label: String,
    pub source_count: u64,
    pub is_leaf: bool,
    /// Contributing item ids, sorted.
    pub source_ids: Vec<ItemId>,
}

impl AggregatedRow {
    fn new(keys: Vec<String>, label: String, source_ids: Vec<ItemId>, is_leaf: bool) -> Self {
        Self {
            x: keys.first().cloned().unwrap_or_default(),
            y: keys.get(1).cloned(),
            label,
            source_count: source_ids.len() as u64,
            is_leaf,
            source_ids,
            keys,
        }
    }

    fn empty_cell(keys: Vec<String>) -> Self {
        let label = keys.join(" / ");
        Self::new(keys, label, Vec::new(), false)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregationMetrics {
    pub aggregation_time: Duration,
    pub source_row_count: u64,
    pub aggregated_row_count: u64,
    /// `aggregated_row_count / source_row_count`; 0 for an empty source.
    pub compression_ratio: f64,
    pub within_performance_target: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregationResult {
    pub rows: Vec<AggregatedRow>,
    pub plan: AggregationPlan,
    pub view_mode: String,
    /// Store mutation counter observed when the result was read.
    pub data_version: i64,
    pub metrics: AggregationMetrics,
    /// Leaf rows were cut at the configured limit.
    pub truncated: bool,
}

impl AggregationResult {
    /// Whether the row counts add up to every matching item.
    pub fn is_lossless(&self) -> bool {
        !self.truncated
            && self.rows.iter().map(|row| row.source_count).sum::<u64>()
                == self.metrics.source_row_count
    }
}

/// Aggregation engine bound to one ready connection.
pub struct AggregationEngine<'conn> {
    conn: &'conn Connection,
    config: EngineConfig,
}

impl<'conn> AggregationEngine<'conn> {
    /// Creates an engine after verifying store readiness.
    ///
    /// # Errors
    /// `CoreError::Initialization` when the store is not migrated or lacks
    /// JSON or recursive CTE support.
    pub fn try_new(conn: &'conn Connection, config: EngineConfig) -> CoreResult<Self> {
        ensure_store_ready(conn).map_err(CoreError::Initialization)?;
        Ok(Self { conn, config })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Plans and executes in one call.
    pub fn aggregate(
        &self,
        filter: &CompiledFilter,
        request: &AggregationRequest,
        cancel: Option<&CancelToken>,
    ) -> CoreResult<AggregationResult> {
        let plan = self.plan(filter, request, cancel)?;
        self.execute(&plan, cancel)
    }

    /// Validates `request` and resolves bucketing for every grid axis.
    ///
    /// # Errors
    /// - `ValidationError` for bad axes, levels or overrides (no store access).
    /// - `Cancelled` / `Store` from the auto time-span probe.
    pub fn plan(
        &self,
        filter: &CompiledFilter,
        request: &AggregationRequest,
        cancel: Option<&CancelToken>,
    ) -> CoreResult<AggregationPlan> {
        let columns = validate_request(request, &self.config)?;
        let _guard = InterruptGuard::arm(self.conn, cancel);

        let mut axes = Vec::with_capacity(columns.len());
        for (grid, column) in request.axes.iter().zip(columns) {
            check_cancel(cancel)?;
            let density = request.density.resolve(grid.axis, column.name);
            let bucketing = match density.value_mode {
                ValueDensity::Leaf => Bucketing::finest(column),
                ValueDensity::Collapsed => {
                    let auto_time = if column.kind == FacetKind::Timestamp && density.level == 0 {
                        Some(self.probe_time_granularity(column, filter)?)
                    } else {
                        None
                    };
                    Bucketing::resolve(column, density.level, auto_time)
                }
            };
            axes.push(PlannedAxis {
                axis: grid.axis,
                column: *column,
                density,
                bucketing,
            });
        }

        let plan = AggregationPlan {
            grouped: axes
                .iter()
                .any(|axis| axis.density.value_mode == ValueDensity::Collapsed),
            sparse: axes
                .iter()
                .any(|axis| axis.density.extent_mode == ExtentDensity::Sparse),
            axes,
            view_mode: request.density.view_mode.clone(),
            filter: filter.clone(),
        };
        debug!(
            "event=aggregate_plan module=aggregate status=ok axes={} grouped={} sparse={}",
            plan.axes.len(),
            plan.grouped,
            plan.sparse
        );
        Ok(plan)
    }

    /// Runs a plan and reports timing and compression metrics.
    pub fn execute(
        &self,
        plan: &AggregationPlan,
        cancel: Option<&CancelToken>,
    ) -> CoreResult<AggregationResult> {
        let started_at = Instant::now();
        check_cancel(cancel)?;
        let _guard = InterruptGuard::arm(self.conn, cancel);

        let data_version = data_version(self.conn).map_err(db_to_core)?;
        let (mut rows, source_row_count, truncated) = if plan.grouped {
            let rows = self.query_grouped(plan)?;
            let total = rows.iter().map(|row| row.source_count).sum();
            (rows, total, false)
        } else {
            self.query_leaf(plan)?
        };

        if plan.sparse {
            check_cancel(cancel)?;
            self.fill_sparse_cells(plan, &mut rows)?;
        }

        let aggregation_time = started_at.elapsed();
        let aggregated_row_count = rows.len() as u64;
        let metrics = AggregationMetrics {
            aggregation_time,
            source_row_count,
            aggregated_row_count,
            compression_ratio: if source_row_count == 0 {
                0.0
            } else {
                aggregated_row_count as f64 / source_row_count as f64
            },
            within_performance_target: aggregation_time <= self.config.performance_target(),
        };

        if metrics.within_performance_target {
            debug!(
                "event=aggregate_execute module=aggregate status=ok duration_ms={} source_rows={} rows={} truncated={}",
                aggregation_time.as_millis(),
                source_row_count,
                aggregated_row_count,
                truncated
            );
        } else {
            warn!(
                "event=aggregate_execute module=aggregate status=slow duration_ms={} target_ms={} source_rows={} rows={}",
                aggregation_time.as_millis(),
                self.config.performance_target_ms,
                source_row_count,
                aggregated_row_count
            );
        }

        Ok(AggregationResult {
            rows,
            plan: plan.clone(),
            view_mode: plan.view_mode.clone(),
            data_version,
            metrics,
            truncated,
        })
    }

    /// Re-queries the items behind one cell at leaf density.
    ///
    /// `keys` are the cell's bucket keys in plan axis order.
    pub fn drill_down(
        &self,
        plan: &AggregationPlan,
        keys: &[String],
        cancel: Option<&CancelToken>,
    ) -> CoreResult<Vec<Item>> {
        if keys.len() != plan.axes.len() {
            return Err(ValidationError::CellKeyMismatch {
                expected: plan.axes.len(),
                actual: keys.len(),
            }
            .into());
        }
        check_cancel(cancel)?;
        let _guard = InterruptGuard::arm(self.conn, cancel);

        let mut fragment = SqlFragment::new();
        fragment.push_sql(ITEM_SELECT_SQL);
        fragment.push_sql(" i WHERE ");
        fragment.append(&plan.filter.render("i"));
        for (axis, key) in plan.axes.iter().zip(keys) {
            fragment.push_sql(&format!(" AND {} = ", axis.key_sql()));
            fragment.push_param(Value::Text(key.clone()));
        }
        fragment.push_sql(" ORDER BY i.id;");

        let sql = fragment.sql;
        let mut stmt = self
            .conn
            .prepare(&sql)
            .map_err(|err| CoreError::store(&sql, err))?;
        let mut rows = stmt
            .query(params_from_iter(fragment.params.iter()))
            .map_err(|err| CoreError::store(&sql, err))?;

        let mut items = Vec::new();
        while let Some(row) = rows.next().map_err(|err| CoreError::store(&sql, err))? {
            items.push(parse_item_row(row).map_err(|err| repo_to_core(&sql, err))?);
        }
        Ok(items)
    }

    fn probe_time_granularity(
        &self,
        column: &FacetColumn,
        filter: &CompiledFilter,
    ) -> CoreResult<TimeGranularity> {
        let predicate = filter.render("i");
        let sql = format!(
            "SELECT MIN(i.{column}), MAX(i.{column}) FROM items i WHERE {};",
            predicate.sql,
            column = column.name
        );
        let (min, max): (Option<i64>, Option<i64>) = self
            .conn
            .query_row(&sql, params_from_iter(predicate.params.iter()), |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .map_err(|err| CoreError::store(&sql, err))?;

        let span = match (min, max) {
            (Some(min), Some(max)) => day_span(min, max),
            _ => 0.0,
        };
        let granularity = select_time_granularity(span);
        debug!(
            "event=aggregate_auto_time module=aggregate status=ok column={} day_span={:.1} granularity={}",
            column.name,
            span,
            granularity.as_str()
        );
        Ok(granularity)
    }

    fn query_grouped(&self, plan: &AggregationPlan) -> CoreResult<Vec<AggregatedRow>> {
        let predicate = plan.filter.render("i");
        let mut select = Vec::with_capacity(plan.axes.len());
        let mut group = Vec::with_capacity(plan.axes.len());
        let mut order = Vec::with_capacity(plan.axes.len());
        for (index, axis) in plan.axes.iter().enumerate() {
            select.push(format!("{} AS k{index}", axis.key_sql()));
            group.push(format!("k{index}"));
            order.push(if axis.orders_numerically() {
                format!("MIN({})", axis.qualified_column())
            } else {
                format!("k{index}")
            });
        }
        let sql = format!(
            "SELECT {}, json_group_array(i.id) AS source_ids
             FROM items i
             WHERE {}
             GROUP BY {}
             ORDER BY {};",
            select.join(", "),
            predicate.sql,
            group.join(", "),
            order.join(", ")
        );

        let mut stmt = self
            .conn
            .prepare(&sql)
            .map_err(|err| CoreError::store(&sql, err))?;
        let mut rows = stmt
            .query(params_from_iter(predicate.params.iter()))
            .map_err(|err| CoreError::store(&sql, err))?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(|err| CoreError::store(&sql, err))? {
            let keys = read_keys(row, plan.axes.len()).map_err(|err| CoreError::store(&sql, err))?;
            let ids_json: String = row
                .get("source_ids")
                .map_err(|err| CoreError::store(&sql, err))?;
            let mut source_ids: Vec<ItemId> = serde_json::from_str(&ids_json).map_err(|err| {
                CoreError::InvalidData(format!("invalid source id list `{ids_json}`: {err}"))
            })?;
            source_ids.sort();
            let label = keys.join(" / ");
            out.push(AggregatedRow::new(keys, label, source_ids, false));
        }
        Ok(out)
    }

    fn query_leaf(&self, plan: &AggregationPlan) -> CoreResult<(Vec<AggregatedRow>, u64, bool)> {
        let predicate = plan.filter.render("i");
        let limit = self.config.leaf_row_limit as usize;
        let mut select = Vec::with_capacity(plan.axes.len());
        let mut order = Vec::with_capacity(plan.axes.len() + 1);
        for (index, axis) in plan.axes.iter().enumerate() {
            select.push(format!("{} AS k{index}", axis.key_sql()));
            order.push(if axis.orders_numerically() {
                axis.qualified_column()
            } else {
                format!("k{index}")
            });
        }
        order.push("i.id".to_string());

        let mut fragment = SqlFragment::new();
        fragment.push_sql(&format!(
            "SELECT i.id AS id, i.name AS name, {} FROM items i WHERE ",
            select.join(", ")
        ));
        fragment.append(&predicate);
        fragment.push_sql(&format!(" ORDER BY {} LIMIT ", order.join(", ")));
        fragment.push_param(Value::Integer(limit as i64 + 1));
        fragment.push_sql(";");

        let sql = fragment.sql;
        let mut stmt = self
            .conn
            .prepare(&sql)
            .map_err(|err| CoreError::store(&sql, err))?;
        let mut rows = stmt
            .query(params_from_iter(fragment.params.iter()))
            .map_err(|err| CoreError::store(&sql, err))?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(|err| CoreError::store(&sql, err))? {
            let keys = read_keys(row, plan.axes.len()).map_err(|err| CoreError::store(&sql, err))?;
            let id: ItemId = row.get("id").map_err(|err| CoreError::store(&sql, err))?;
            let name: String = row.get("name").map_err(|err| CoreError::store(&sql, err))?;
            out.push(AggregatedRow::new(keys, name, vec![id], true));
        }

        let truncated = out.len() > limit;
        if !truncated {
            let total = out.len() as u64;
            return Ok((out, total, false));
        }
        out.truncate(limit);
        let total = self.count_matching(&plan.filter)?;
        Ok((out, total, true))
    }

    fn count_matching(&self, filter: &CompiledFilter) -> CoreResult<u64> {
        let predicate = filter.render("i");
        let sql = format!("SELECT COUNT(*) FROM items i WHERE {};", predicate.sql);
        let count: i64 = self
            .conn
            .query_row(&sql, params_from_iter(predicate.params.iter()), |row| {
                row.get(0)
            })
            .map_err(|err| CoreError::store(&sql, err))?;
        Ok(count.max(0) as u64)
    }

    /// Adds zero-count cells for missing domain combinations and orders all
    /// rows by their cell's position in the cross product.
    fn fill_sparse_cells(
        &self,
        plan: &AggregationPlan,
        rows: &mut Vec<AggregatedRow>,
    ) -> CoreResult<()> {
        let unfiltered = CompiledFilter::empty().with_deleted(plan.filter.includes_deleted());
        let mut domains = Vec::with_capacity(plan.axes.len());
        for axis in &plan.axes {
            let scope = match axis.density.extent_mode {
                ExtentDensity::Sparse => &unfiltered,
                ExtentDensity::PopulatedOnly => &plan.filter,
            };
            domains.push(self.query_domain(axis, scope)?);
        }

        let cells = domains
            .iter()
            .try_fold(1_usize, |acc, domain| acc.checked_mul(domain.len()))
            .unwrap_or(usize::MAX);
        if cells > self.config.max_sparse_cells {
            return Err(ValidationError::SparseGridTooLarge {
                cells,
                limit: self.config.max_sparse_cells,
            }
            .into());
        }

        let combos = cross_product(&domains);
        let position: HashMap<Vec<String>, usize> = combos
            .iter()
            .enumerate()
            .map(|(index, keys)| (keys.clone(), index))
            .collect();

        let mut populated = vec![false; combos.len()];
        let mut positioned: Vec<(usize, AggregatedRow)> = rows
            .drain(..)
            .map(|row| {
                let index = position.get(&row.keys).copied().unwrap_or(usize::MAX);
                if let Some(flag) = populated.get_mut(index) {
                    *flag = true;
                }
                (index, row)
            })
            .collect();
        for (index, keys) in combos.into_iter().enumerate() {
            if !populated[index] {
                positioned.push((index, AggregatedRow::empty_cell(keys)));
            }
        }
        positioned.sort_by_key(|(index, _)| *index);
        rows.extend(positioned.into_iter().map(|(_, row)| row));
        Ok(())
    }

    fn query_domain(&self, axis: &PlannedAxis, scope: &CompiledFilter) -> CoreResult<Vec<String>> {
        let predicate = scope.render("i");
        let order = if axis.orders_numerically() {
            format!("MIN({})", axis.qualified_column())
        } else {
            "k".to_string()
        };
        let sql = format!(
            "SELECT {} AS k FROM items i WHERE {} GROUP BY k ORDER BY {};",
            axis.key_sql(),
            predicate.sql,
            order
        );
        let mut stmt = self
            .conn
            .prepare(&sql)
            .map_err(|err| CoreError::store(&sql, err))?;
        let values = stmt
            .query_map(params_from_iter(predicate.params.iter()), |row| row.get(0))
            .map_err(|err| CoreError::store(&sql, err))?
            .collect::<Result<Vec<String>, _>>()
            .map_err(|err| CoreError::store(&sql, err))?;
        Ok(values)
    }
}

fn validate_request(
    request: &AggregationRequest,
    config: &EngineConfig,
) -> Result<Vec<&'static FacetColumn>, ValidationError> {
    if request.axes.is_empty() {
        return Err(ValidationError::MissingGridAxes);
    }
    let mut columns = Vec::with_capacity(request.axes.len());
    for grid in &request.axes {
        let column = lookup_facet(&grid.facet)
            .ok_or_else(|| ValidationError::UnknownFacet(grid.facet.clone()))?;
        if column.axis != grid.axis {
            return Err(ValidationError::FacetAxisMismatch {
                facet: grid.facet.clone(),
                expected: grid.axis,
                actual: column.axis,
            });
        }
        if column.kind == FacetKind::JsonList {
            return Err(ValidationError::MultiValuedGridAxis {
                facet: grid.facet.clone(),
            });
        }
        columns.push(column);
    }
    request.density.validate(config.max_granularity_level)?;
    Ok(columns)
}

fn read_keys(row: &Row<'_>, count: usize) -> rusqlite::Result<Vec<String>> {
    (0..count)
        .map(|index| row.get::<_, String>(format!("k{index}").as_str()))
        .collect()
}

fn cross_product(domains: &[Vec<String>]) -> Vec<Vec<String>> {
    domains.iter().fold(vec![Vec::new()], |acc, domain| {
        acc.iter()
            .flat_map(|prefix| {
                domain.iter().map(move |value| {
                    let mut keys = prefix.clone();
                    keys.push(value.clone());
                    keys
                })
            })
            .collect()
    })
}

fn check_cancel(cancel: Option<&CancelToken>) -> CoreResult<()> {
    cancel.map_or(Ok(()), CancelToken::check)
}

fn db_to_core(err: DbError) -> CoreError {
    match err {
        DbError::Sqlite(source) => CoreError::store("SELECT value FROM store_meta", source),
        other => CoreError::Initialization(other),
    }
}

fn repo_to_core(sql: &str, err: RepoError) -> CoreError {
    match err {
        RepoError::Db(DbError::Sqlite(source)) => CoreError::store(sql, source),
        other => CoreError::InvalidData(other.to_string()),
    }
}
