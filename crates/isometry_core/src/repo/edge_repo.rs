//! Connection repository contracts and SQLite implementation.
//!
//! # Invariants
//! - Labels are normalized before persistence.
//! - The `(source_id, target_id, via_id)` triple is unique; duplicates are
//!   reported as `RepoError::DuplicateEdge`.

use crate::db::ensure_store_ready;
use crate::model::edge::{normalize_label, Edge, EdgeId};
use crate::repo::item_repo::{RepoError, RepoResult};
use rusqlite::{params, Connection, ErrorCode, Row};

const EDGE_SELECT_SQL: &str = "SELECT
    id,
    source_id,
    target_id,
    via_id,
    label,
    weight,
    created_at
FROM connections";

/// Repository interface for connection persistence.
pub trait EdgeRepository {
    fn create_edge(&self, edge: &Edge) -> RepoResult<EdgeId>;
    /// Lists outgoing edges of `source_id`, optionally for one label.
    fn list_outgoing(&self, source_id: &str, label: Option<&str>) -> RepoResult<Vec<Edge>>;
    fn delete_edge(&self, id: &str) -> RepoResult<()>;
}

/// SQLite-backed connection repository.
pub struct SqliteEdgeRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteEdgeRepository<'conn> {
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_store_ready(conn)?;
        Ok(Self { conn })
    }
}

impl EdgeRepository for SqliteEdgeRepository<'_> {
    fn create_edge(&self, edge: &Edge) -> RepoResult<EdgeId> {
        let mut edge = edge.clone();
        edge.label = normalize_label(&edge.label);
        edge.validate()?;

        let inserted = self.conn.execute(
            "INSERT INTO connections (id, source_id, target_id, via_id, label, weight, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
            params![
                edge.id.as_str(),
                edge.source_id.as_str(),
                edge.target_id.as_str(),
                edge.via_id.as_deref(),
                edge.label.as_str(),
                edge.weight,
                edge.created_at,
            ],
        );

        match inserted {
            Ok(_) => Ok(edge.id),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == ErrorCode::ConstraintViolation
                    && err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
            {
                Err(RepoError::DuplicateEdge {
                    source_id: edge.source_id,
                    target_id: edge.target_id,
                })
            }
            Err(err) => Err(err.into()),
        }
    }

    fn list_outgoing(&self, source_id: &str, label: Option<&str>) -> RepoResult<Vec<Edge>> {
        let mut stmt = self.conn.prepare(&format!(
            "{EDGE_SELECT_SQL}
             WHERE source_id = ?1
               AND (?2 IS NULL OR label = ?2)
             ORDER BY label ASC, target_id ASC, id ASC;"
        ))?;
        let label = label.map(normalize_label);
        let mut rows = stmt.query(params![source_id, label])?;
        let mut edges = Vec::new();
        while let Some(row) = rows.next()? {
            edges.push(parse_edge_row(row)?);
        }
        Ok(edges)
    }

    fn delete_edge(&self, id: &str) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM connections WHERE id = ?1;", [id])?;
        if changed == 0 {
            return Err(RepoError::NotFound(id.to_string()));
        }
        Ok(())
    }
}

fn parse_edge_row(row: &Row<'_>) -> RepoResult<Edge> {
    Ok(Edge {
        id: row.get("id")?,
        source_id: row.get("source_id")?,
        target_id: row.get("target_id")?,
        via_id: row.get("via_id")?,
        label: row.get("label")?,
        weight: row.get("weight")?,
        created_at: row.get("created_at")?,
    })
}
