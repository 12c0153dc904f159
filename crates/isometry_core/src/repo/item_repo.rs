//! Item repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide the write/read APIs the editing surface and tests use to populate
//!   `items`; the query engines never write.
//!
//! # Invariants
//! - Write paths call `Item::validate()` before SQL mutations.
//! - Updates increment `version` and refresh `modified_at`.
//! - Items are soft-deleted only; there is no hard-delete API.

use crate::db::{ensure_store_ready, DbError};
use crate::model::edge::EdgeValidationError;
use crate::model::item::{normalize_tags, Item, ItemId, ItemType, ItemValidationError};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub(crate) const ITEM_SELECT_SQL: &str = "SELECT
    id,
    item_type,
    name,
    content,
    summary,
    latitude,
    longitude,
    location_name,
    created_at,
    modified_at,
    due_at,
    completed_at,
    event_start,
    event_end,
    folder,
    tags,
    status,
    priority,
    sort_order,
    version,
    deleted_at
FROM items";

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for item and connection persistence.
#[derive(Debug)]
pub enum RepoError {
    Validation(ItemValidationError),
    EdgeValidation(EdgeValidationError),
    Db(DbError),
    NotFound(ItemId),
    /// Connection with the same `(source, target, via)` already exists.
    DuplicateEdge {
        source_id: ItemId,
        target_id: ItemId,
    },
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::EdgeValidation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "item not found: {id}"),
            Self::DuplicateEdge {
                source_id,
                target_id,
            } => write!(f, "connection already exists: {source_id} -> {target_id}"),
            Self::InvalidData(message) => write!(f, "invalid persisted item data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::EdgeValidation(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::NotFound(_) => None,
            Self::DuplicateEdge { .. } => None,
            Self::InvalidData(_) => None,
        }
    }
}

impl From<ItemValidationError> for RepoError {
    fn from(value: ItemValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<EdgeValidationError> for RepoError {
    fn from(value: EdgeValidationError) -> Self {
        Self::EdgeValidation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Query options for listing items.
#[derive(Debug, Clone, Default)]
pub struct ItemListQuery {
    pub item_type: Option<ItemType>,
    pub include_deleted: bool,
    pub limit: Option<u32>,
    pub offset: u32,
}

/// Repository interface for item persistence.
pub trait ItemRepository {
    fn create_item(&self, item: &Item) -> RepoResult<ItemId>;
    fn update_item(&self, item: &Item) -> RepoResult<()>;
    fn get_item(&self, id: &str, include_deleted: bool) -> RepoResult<Option<Item>>;
    fn list_items(&self, query: &ItemListQuery) -> RepoResult<Vec<Item>>;
    /// Loads active items by id, ordered by id; unknown ids are skipped.
    fn fetch_items(&self, ids: &[ItemId]) -> RepoResult<Vec<Item>>;
    fn soft_delete_item(&self, id: &str, deleted_at: i64) -> RepoResult<()>;
}

/// SQLite-backed item repository.
pub struct SqliteItemRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteItemRepository<'conn> {
    /// Creates a repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_store_ready(conn)?;
        Ok(Self { conn })
    }
}

impl ItemRepository for SqliteItemRepository<'_> {
    fn create_item(&self, item: &Item) -> RepoResult<ItemId> {
        item.validate()?;

        self.conn.execute(
            "INSERT INTO items (
                id, item_type, name, content, summary,
                latitude, longitude, location_name,
                created_at, modified_at, due_at, completed_at, event_start, event_end,
                folder, tags, status,
                priority, sort_order,
                version, deleted_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5,
                ?6, ?7, ?8,
                ?9, ?10, ?11, ?12, ?13, ?14,
                ?15, ?16, ?17,
                ?18, ?19,
                ?20, ?21
            );",
            params![
                item.id.as_str(),
                item.item_type.as_str(),
                item.name.as_str(),
                item.content.as_str(),
                item.summary.as_deref(),
                item.latitude,
                item.longitude,
                item.location_name.as_deref(),
                item.created_at,
                item.modified_at,
                item.due_at,
                item.completed_at,
                item.event_start,
                item.event_end,
                item.folder.as_deref(),
                encode_tags(&item.tags)?,
                item.status.as_deref(),
                item.priority,
                item.sort_order,
                item.version,
                item.deleted_at,
            ],
        )?;

        Ok(item.id.clone())
    }

    fn update_item(&self, item: &Item) -> RepoResult<()> {
        item.validate()?;

        let changed = self.conn.execute(
            "UPDATE items
             SET
                item_type = ?2,
                name = ?3,
                content = ?4,
                summary = ?5,
                latitude = ?6,
                longitude = ?7,
                location_name = ?8,
                due_at = ?9,
                completed_at = ?10,
                event_start = ?11,
                event_end = ?12,
                folder = ?13,
                tags = ?14,
                status = ?15,
                priority = ?16,
                sort_order = ?17,
                deleted_at = ?18,
                version = version + 1,
                modified_at = MAX(modified_at, (strftime('%s', 'now') * 1000))
             WHERE id = ?1;",
            params![
                item.id.as_str(),
                item.item_type.as_str(),
                item.name.as_str(),
                item.content.as_str(),
                item.summary.as_deref(),
                item.latitude,
                item.longitude,
                item.location_name.as_deref(),
                item.due_at,
                item.completed_at,
                item.event_start,
                item.event_end,
                item.folder.as_deref(),
                encode_tags(&item.tags)?,
                item.status.as_deref(),
                item.priority,
                item.sort_order,
                item.deleted_at,
            ],
        )?;

        if changed == 0 {
            return Err(RepoError::NotFound(item.id.clone()));
        }

        Ok(())
    }

    fn get_item(&self, id: &str, include_deleted: bool) -> RepoResult<Option<Item>> {
        let mut stmt = self.conn.prepare(&format!(
            "{ITEM_SELECT_SQL}
             WHERE id = ?1
               AND (?2 = 1 OR deleted_at IS NULL);"
        ))?;

        let mut rows = stmt.query(params![id, i64::from(include_deleted)])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_item_row(row)?));
        }

        Ok(None)
    }

    fn list_items(&self, query: &ItemListQuery) -> RepoResult<Vec<Item>> {
        let mut sql = format!("{ITEM_SELECT_SQL} WHERE 1 = 1");
        let mut bind_values: Vec<Value> = Vec::new();

        if !query.include_deleted {
            sql.push_str(" AND deleted_at IS NULL");
        }

        if let Some(item_type) = query.item_type {
            sql.push_str(" AND item_type = ?");
            bind_values.push(Value::Text(item_type.as_str().to_string()));
        }

        sql.push_str(" ORDER BY modified_at DESC, id ASC");

        if let Some(limit) = query.limit {
            sql.push_str(" LIMIT ?");
            bind_values.push(Value::Integer(i64::from(limit)));
            if query.offset > 0 {
                sql.push_str(" OFFSET ?");
                bind_values.push(Value::Integer(i64::from(query.offset)));
            }
        } else if query.offset > 0 {
            sql.push_str(" LIMIT -1 OFFSET ?");
            bind_values.push(Value::Integer(i64::from(query.offset)));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut items = Vec::new();

        while let Some(row) = rows.next()? {
            items.push(parse_item_row(row)?);
        }

        Ok(items)
    }

    fn fetch_items(&self, ids: &[ItemId]) -> RepoResult<Vec<Item>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; ids.len()].join(", ");
        let mut stmt = self.conn.prepare(&format!(
            "{ITEM_SELECT_SQL}
             WHERE id IN ({placeholders})
               AND deleted_at IS NULL
             ORDER BY id ASC;"
        ))?;
        let mut rows = stmt.query(params_from_iter(ids.iter()))?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(parse_item_row(row)?);
        }
        Ok(items)
    }

    fn soft_delete_item(&self, id: &str, deleted_at: i64) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE items
             SET
                deleted_at = ?2,
                version = version + 1
             WHERE id = ?1
               AND deleted_at IS NULL;",
            params![id, deleted_at],
        )?;

        if changed == 0 {
            return Err(RepoError::NotFound(id.to_string()));
        }

        Ok(())
    }
}

pub(crate) fn parse_item_row(row: &Row<'_>) -> RepoResult<Item> {
    let type_text: String = row.get("item_type")?;
    let item_type = ItemType::parse(&type_text).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid item type `{type_text}` in items.item_type"))
    })?;

    let tags_text: String = row.get("tags")?;
    let tags: Vec<String> = serde_json::from_str(&tags_text).map_err(|err| {
        RepoError::InvalidData(format!("invalid tags `{tags_text}` in items.tags: {err}"))
    })?;

    Ok(Item {
        id: row.get("id")?,
        item_type,
        name: row.get("name")?,
        content: row.get("content")?,
        summary: row.get("summary")?,
        latitude: row.get("latitude")?,
        longitude: row.get("longitude")?,
        location_name: row.get("location_name")?,
        created_at: row.get("created_at")?,
        modified_at: row.get("modified_at")?,
        due_at: row.get("due_at")?,
        completed_at: row.get("completed_at")?,
        event_start: row.get("event_start")?,
        event_end: row.get("event_end")?,
        folder: row.get("folder")?,
        tags,
        status: row.get("status")?,
        priority: row.get("priority")?,
        sort_order: row.get("sort_order")?,
        version: row.get("version")?,
        deleted_at: row.get("deleted_at")?,
    })
}

fn encode_tags(tags: &[String]) -> RepoResult<String> {
    serde_json::to_string(&normalize_tags(tags))
        .map_err(|err| RepoError::InvalidData(format!("cannot encode tags: {err}")))
}
