//! LATCH axes and the facet column catalog.
//!
//! The catalog is the only source of column names interpolated into SQL;
//! every other value reaches the store as a bound parameter.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// The five filter axes: Location, Alphabet, Time, Category, Hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LatchAxis {
    #[serde(rename = "L")]
    Location,
    #[serde(rename = "A")]
    Alphabet,
    #[serde(rename = "T")]
    Time,
    #[serde(rename = "C")]
    Category,
    #[serde(rename = "H")]
    Hierarchy,
}

impl LatchAxis {
    pub const ALL: [LatchAxis; 5] = [
        Self::Location,
        Self::Alphabet,
        Self::Time,
        Self::Category,
        Self::Hierarchy,
    ];

    /// Single-letter code used in UI state and logs.
    pub fn code(self) -> char {
        match self {
            Self::Location => 'L',
            Self::Alphabet => 'A',
            Self::Time => 'T',
            Self::Category => 'C',
            Self::Hierarchy => 'H',
        }
    }
}

impl Display for LatchAxis {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Storage shape of a facet column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FacetKind {
    Text,
    Integer,
    Real,
    /// Epoch milliseconds stored as INTEGER.
    Timestamp,
    /// JSON array of strings (multi-select).
    JsonList,
}

impl FacetKind {
    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Integer | Self::Real | Self::Timestamp)
    }
}

/// One filterable column of `items`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FacetColumn {
    pub name: &'static str,
    pub axis: LatchAxis,
    pub kind: FacetKind,
}

#[rustfmt::skip]
const FACET_COLUMNS: &[FacetColumn] = &[
    FacetColumn { name: "latitude", axis: LatchAxis::Location, kind: FacetKind::Real },
    FacetColumn { name: "longitude", axis: LatchAxis::Location, kind: FacetKind::Real },
    FacetColumn { name: "location_name", axis: LatchAxis::Location, kind: FacetKind::Text },
    FacetColumn { name: "name", axis: LatchAxis::Alphabet, kind: FacetKind::Text },
    FacetColumn { name: "created_at", axis: LatchAxis::Time, kind: FacetKind::Timestamp },
    FacetColumn { name: "modified_at", axis: LatchAxis::Time, kind: FacetKind::Timestamp },
    FacetColumn { name: "due_at", axis: LatchAxis::Time, kind: FacetKind::Timestamp },
    FacetColumn { name: "completed_at", axis: LatchAxis::Time, kind: FacetKind::Timestamp },
    FacetColumn { name: "event_start", axis: LatchAxis::Time, kind: FacetKind::Timestamp },
    FacetColumn { name: "event_end", axis: LatchAxis::Time, kind: FacetKind::Timestamp },
    FacetColumn { name: "item_type", axis: LatchAxis::Category, kind: FacetKind::Text },
    FacetColumn { name: "folder", axis: LatchAxis::Category, kind: FacetKind::Text },
    FacetColumn { name: "status", axis: LatchAxis::Category, kind: FacetKind::Text },
    FacetColumn { name: "tags", axis: LatchAxis::Category, kind: FacetKind::JsonList },
    FacetColumn { name: "priority", axis: LatchAxis::Hierarchy, kind: FacetKind::Integer },
    FacetColumn { name: "sort_order", axis: LatchAxis::Hierarchy, kind: FacetKind::Integer },
];

/// Returns every catalog column.
pub fn facet_columns() -> &'static [FacetColumn] {
    FACET_COLUMNS
}

/// Looks up a catalog column by exact name.
pub fn lookup_facet(name: &str) -> Option<&'static FacetColumn> {
    FACET_COLUMNS.iter().find(|column| column.name == name)
}

/// Allow-listed targets for text matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextProperty {
    Name,
    Content,
    Summary,
    /// Full-text index over name, content and summary.
    All,
}

impl TextProperty {
    /// Column name for direct matches; `None` for the full-text index.
    pub fn column(self) -> Option<&'static str> {
        match self {
            Self::Name => Some("name"),
            Self::Content => Some("content"),
            Self::Summary => Some("summary"),
            Self::All => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Content => "content",
            Self::Summary => "summary",
            Self::All => "all",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "name" => Some(Self::Name),
            "content" => Some(Self::Content),
            "summary" => Some(Self::Summary),
            "all" => Some(Self::All),
            _ => None,
        }
    }
}

/// Distinct value of a column with its usage count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Facet {
    pub value: String,
    pub count: u64,
    pub color: Option<String>,
}
