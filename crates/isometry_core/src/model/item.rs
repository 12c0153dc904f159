//! Item domain model.
//!
//! # Responsibility
//! - Define the node record projected by grid, network and hierarchy views.
//! - Provide validation and tag normalization used by repository writes.
//!
//! # Invariants
//! - `id` is stable and never reused for another item.
//! - `deleted_at` is the source of truth for tombstone state.
//! - Location fields are set or cleared as a group.
//! - `event_end` is not earlier than `event_start` when both are set.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable opaque identifier of an item.
pub type ItemId = String;

/// Closed set of item kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    Note,
    Task,
    Event,
    Person,
    Project,
    Resource,
}

impl ItemType {
    /// Storage representation written to `items.item_type`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Note => "note",
            Self::Task => "task",
            Self::Event => "event",
            Self::Person => "person",
            Self::Project => "project",
            Self::Resource => "resource",
        }
    }

    /// Parses the storage representation.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "note" => Some(Self::Note),
            "task" => Some(Self::Task),
            "event" => Some(Self::Event),
            "person" => Some(Self::Person),
            "project" => Some(Self::Project),
            "resource" => Some(Self::Resource),
            _ => None,
        }
    }
}

/// Canonical node record.
///
/// Timestamps are Unix epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub item_type: ItemType,
    pub name: String,
    pub content: String,
    pub summary: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub location_name: Option<String>,
    pub created_at: i64,
    pub modified_at: i64,
    pub due_at: Option<i64>,
    pub completed_at: Option<i64>,
    pub event_start: Option<i64>,
    pub event_end: Option<i64>,
    pub folder: Option<String>,
    /// Lower-cased, deduplicated. Persisted as a JSON array.
    pub tags: Vec<String>,
    pub status: Option<String>,
    pub priority: i64,
    pub sort_order: i64,
    /// Incremented by the repository on every update.
    pub version: i64,
    pub deleted_at: Option<i64>,
}

impl Item {
    /// Creates a new item with a generated stable ID.
    pub fn new(item_type: ItemType, name: impl Into<String>, created_at: i64) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), item_type, name, created_at)
    }

    /// Creates a new item with a caller-provided stable ID.
    ///
    /// Used by import paths where identity already exists externally.
    pub fn with_id(
        id: impl Into<ItemId>,
        item_type: ItemType,
        name: impl Into<String>,
        created_at: i64,
    ) -> Self {
        Self {
            id: id.into(),
            item_type,
            name: name.into(),
            content: String::new(),
            summary: None,
            latitude: None,
            longitude: None,
            location_name: None,
            created_at,
            modified_at: created_at,
            due_at: None,
            completed_at: None,
            event_start: None,
            event_end: None,
            folder: None,
            tags: Vec::new(),
            status: None,
            priority: 0,
            sort_order: 0,
            version: 1,
            deleted_at: None,
        }
    }

    /// Replaces tags with their normalized form.
    pub fn set_tags<I, S>(&mut self, tags: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.tags = normalize_tags(tags);
    }

    /// Marks this item as softly deleted at `at` (epoch ms).
    pub fn soft_delete(&mut self, at: i64) {
        self.deleted_at = Some(at);
    }

    /// Returns whether this item is visible to queries by default.
    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none()
    }

    /// Validates record-level invariants before persistence.
    pub fn validate(&self) -> Result<(), ItemValidationError> {
        if self.id.trim().is_empty() {
            return Err(ItemValidationError::EmptyId);
        }
        if self.name.trim().is_empty() {
            return Err(ItemValidationError::EmptyName);
        }

        match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) => {
                if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
                    return Err(ItemValidationError::CoordinatesOutOfRange {
                        latitude,
                        longitude,
                    });
                }
            }
            (None, None) => {}
            _ => return Err(ItemValidationError::PartialCoordinates),
        }

        if let (Some(start), Some(end)) = (self.event_start, self.event_end) {
            if end < start {
                return Err(ItemValidationError::EventEndsBeforeStart { start, end });
            }
        }

        Ok(())
    }
}

/// Record-level validation failures.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemValidationError {
    EmptyId,
    EmptyName,
    PartialCoordinates,
    CoordinatesOutOfRange { latitude: f64, longitude: f64 },
    EventEndsBeforeStart { start: i64, end: i64 },
}

impl Display for ItemValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyId => write!(f, "item id must not be blank"),
            Self::EmptyName => write!(f, "item name must not be blank"),
            Self::PartialCoordinates => {
                write!(f, "latitude and longitude must be set together")
            }
            Self::CoordinatesOutOfRange {
                latitude,
                longitude,
            } => write!(f, "coordinates out of range: ({latitude}, {longitude})"),
            Self::EventEndsBeforeStart { start, end } => {
                write!(f, "event_end {end} is earlier than event_start {start}")
            }
        }
    }
}

impl Error for ItemValidationError {}

/// Normalizes one tag value: trimmed and lower-cased, `None` when blank.
pub fn normalize_tag(tag: &str) -> Option<String> {
    let trimmed = tag.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_lowercase())
    }
}

/// Normalizes and deduplicates tag values in sorted order.
pub fn normalize_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut unique = BTreeSet::new();
    for tag in tags {
        if let Some(value) = normalize_tag(tag.as_ref()) {
            unique.insert(value);
        }
    }
    unique.into_iter().collect()
}
