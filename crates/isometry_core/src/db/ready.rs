//! Connection readiness probes used by the query engines.
//!
//! # Invariants
//! - A ready connection is fully migrated and exposes every core table.
//! - JSON1 and recursive CTE support are verified, not assumed.

use super::migrations::{current_user_version, latest_version};
use super::{DbError, DbResult};
use rusqlite::Connection;

const REQUIRED_TABLES: &[&str] = &[
    "items",
    "connections",
    "items_fts",
    "facet_colors",
    "store_meta",
];

/// Verifies that `conn` is migrated and supports the features engines rely on.
///
/// # Errors
/// - `UninitializedConnection` when the schema version differs from the latest.
/// - `MissingRequiredTable` when a core table is absent.
/// - `MissingCapability` when JSON1 or recursive CTEs are unavailable.
pub fn ensure_store_ready(conn: &Connection) -> DbResult<()> {
    let expected_version = latest_version();
    let actual_version = current_user_version(conn)?;
    if actual_version != expected_version {
        return Err(DbError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    for table in REQUIRED_TABLES {
        if !table_exists(conn, table)? {
            return Err(DbError::MissingRequiredTable(table));
        }
    }

    conn.query_row("SELECT json_array_length('[1, 2]');", [], |row| {
        row.get::<_, i64>(0)
    })
    .map_err(|_| DbError::MissingCapability("json functions"))?;

    conn.query_row(
        "WITH RECURSIVE probe(n) AS (SELECT 1 UNION ALL SELECT n + 1 FROM probe WHERE n < 2)
         SELECT COUNT(*) FROM probe;",
        [],
        |row| row.get::<_, i64>(0),
    )
    .map_err(|_| DbError::MissingCapability("recursive common table expressions"))?;

    Ok(())
}

/// Returns the store mutation counter.
///
/// The counter is bumped by triggers on every item or connection write, so a
/// cached result is only trustworthy while this value is unchanged.
pub fn data_version(conn: &Connection) -> DbResult<i64> {
    let version = conn.query_row(
        "SELECT value FROM store_meta WHERE key = 'data_version';",
        [],
        |row| row.get(0),
    )?;
    Ok(version)
}

fn table_exists(conn: &Connection, table: &str) -> DbResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}
