//! Distinct-value discovery over single- and multi-valued columns.

use crate::db::ensure_store_ready;
use crate::error::{CoreError, CoreResult, ValidationError};
use crate::model::facet::{lookup_facet, Facet, FacetKind};
use log::debug;
use rusqlite::{params, Connection};
use std::time::Instant;

/// Discovery options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct FacetQueryOptions {
    /// Treat the column as a JSON array and count each element. JSON list
    /// columns are always exploded.
    pub is_multi_select: bool,
}

impl FacetQueryOptions {
    /// Options matching the column's catalog kind.
    pub fn for_column(column: &str) -> Self {
        Self {
            is_multi_select: lookup_facet(column)
                .is_some_and(|facet| facet.kind == FacetKind::JsonList),
        }
    }

    /// Whether discovery over `column` counts JSON array elements.
    pub(crate) fn explodes(&self, column: &str) -> bool {
        self.is_multi_select || Self::for_column(column).is_multi_select
    }
}

/// Lists distinct values of `column` ordered by count desc, then value asc.
///
/// Null and blank values are skipped. For multi-select columns the count is
/// the number of items carrying the value.
///
/// # Errors
/// - `ValidationError::UnknownFacet` when `column` is not in the catalog.
/// - Store failures other than an uninitialized schema.
pub fn discover_facets(
    conn: &Connection,
    column: &str,
    options: &FacetQueryOptions,
) -> CoreResult<Vec<Facet>> {
    Ok(try_discover_facets(conn, column, options)?.unwrap_or_default())
}

/// Like [`discover_facets`] but `None` when the store is not ready, so cache
/// callers can avoid remembering a transient empty result.
pub(crate) fn try_discover_facets(
    conn: &Connection,
    column: &str,
    options: &FacetQueryOptions,
) -> CoreResult<Option<Vec<Facet>>> {
    let facet = lookup_facet(column)
        .ok_or_else(|| CoreError::from(ValidationError::UnknownFacet(column.to_string())))?;

    if let Err(err) = ensure_store_ready(conn) {
        debug!(
            "event=facet_discover module=facets status=skipped column={} reason={}",
            facet.name, err
        );
        return Ok(None);
    }

    let started_at = Instant::now();
    let multi_select = options.explodes(facet.name);
    let sql = if multi_select {
        multi_value_sql(facet.name)
    } else {
        single_value_sql(facet.name)
    };

    let mut stmt = conn
        .prepare(&sql)
        .map_err(|err| CoreError::store(&sql, err))?;
    let mut rows = stmt
        .query(params![facet.name])
        .map_err(|err| CoreError::store(&sql, err))?;

    let mut facets = Vec::new();
    while let Some(row) = rows.next().map_err(|err| CoreError::store(&sql, err))? {
        let count: i64 = row.get("count").map_err(|err| CoreError::store(&sql, err))?;
        facets.push(Facet {
            value: row.get("value").map_err(|err| CoreError::store(&sql, err))?,
            count: u64::try_from(count).map_err(|_| {
                CoreError::InvalidData(format!("negative facet count {count} for `{column}`"))
            })?,
            color: row.get("color").map_err(|err| CoreError::store(&sql, err))?,
        });
    }

    debug!(
        "event=facet_discover module=facets status=ok column={} multi_select={} values={} duration_ms={}",
        facet.name,
        multi_select,
        facets.len(),
        started_at.elapsed().as_millis()
    );

    Ok(Some(facets))
}

fn single_value_sql(column: &'static str) -> String {
    format!(
        "SELECT f.value AS value, f.count AS count, fc.color AS color
         FROM (
            SELECT CAST({column} AS TEXT) AS value, COUNT(*) AS count
            FROM items
            WHERE deleted_at IS NULL
              AND {column} IS NOT NULL
              AND TRIM(CAST({column} AS TEXT)) <> ''
            GROUP BY CAST({column} AS TEXT)
         ) f
         LEFT JOIN facet_colors fc ON fc.column_name = ?1 AND fc.value = f.value
         ORDER BY f.count DESC, f.value ASC;"
    )
}

fn multi_value_sql(column: &'static str) -> String {
    format!(
        "SELECT f.value AS value, f.count AS count, fc.color AS color
         FROM (
            SELECT CAST(je.value AS TEXT) AS value, COUNT(DISTINCT i.id) AS count
            FROM items i,
                 json_each(
                    CASE WHEN json_valid(i.{column})
                         THEN CASE WHEN json_type(i.{column}) = 'array' THEN i.{column} ELSE '[]' END
                         ELSE '[]'
                    END
                 ) je
            WHERE i.deleted_at IS NULL
              AND je.type IN ('text', 'integer', 'real')
              AND TRIM(CAST(je.value AS TEXT)) <> ''
            GROUP BY CAST(je.value AS TEXT)
         ) f
         LEFT JOIN facet_colors fc ON fc.column_name = ?1 AND fc.value = f.value
         ORDER BY f.count DESC, f.value ASC;"
    )
}
