//! Granularity levels and the bucket expressions they render to.
//!
//! Every bucket expression yields TEXT and maps NULL to [`NONE_BUCKET`], so
//! grouping never drops a row.

use crate::model::facet::{FacetColumn, FacetKind, LatchAxis};
use serde::{Deserialize, Serialize};

/// Bucket key for rows whose column value is missing.
pub const NONE_BUCKET: &str = "(none)";

const MS_PER_DAY: f64 = 86_400_000.0;

/// Calendar bucket width for the Time axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeGranularity {
    Day,
    Week,
    Month,
    Quarter,
    Year,
}

impl TimeGranularity {
    /// Maps explicit levels `1..` to widths; `0` means auto and yields `None`.
    /// Levels above 5 saturate at `Year`.
    pub fn from_level(level: u8) -> Option<Self> {
        match level {
            0 => None,
            1 => Some(Self::Day),
            2 => Some(Self::Week),
            3 => Some(Self::Month),
            4 => Some(Self::Quarter),
            _ => Some(Self::Year),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
            Self::Quarter => "quarter",
            Self::Year => "year",
        }
    }

    fn bucket_sql(self, column: &str) -> String {
        let seconds = format!("{column} / 1000, 'unixepoch'");
        match self {
            Self::Day => format!("strftime('%Y-%m-%d', {seconds})"),
            // Labeled by the week's Monday so a week spanning New Year stays whole.
            Self::Week => format!("date({seconds}, '-6 days', 'weekday 1')"),
            Self::Month => format!("strftime('%Y-%m', {seconds})"),
            Self::Quarter => format!(
                "strftime('%Y', {seconds}) || '-Q' || ((CAST(strftime('%m', {seconds}) AS INTEGER) + 2) / 3)"
            ),
            Self::Year => format!("strftime('%Y', {seconds})"),
        }
    }
}

/// Picks a bucket width keeping roughly 8–16 buckets for `day_span`.
pub fn select_time_granularity(day_span: f64) -> TimeGranularity {
    if day_span > 730.0 {
        TimeGranularity::Year
    } else if day_span > 180.0 {
        TimeGranularity::Quarter
    } else if day_span > 60.0 {
        TimeGranularity::Month
    } else if day_span > 14.0 {
        TimeGranularity::Week
    } else {
        TimeGranularity::Day
    }
}

/// Day span between two epoch-millisecond timestamps.
pub fn day_span(min_ms: i64, max_ms: i64) -> f64 {
    (max_ms - min_ms) as f64 / MS_PER_DAY
}

/// How one grid column is turned into bucket keys.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Bucketing {
    /// Raw value as text.
    Exact,
    /// Calendar bucket of an epoch-millisecond column.
    Time(TimeGranularity),
    /// Upper-cased first character.
    FirstLetter,
    /// Integer bands of `width`, labeled `lo..hi`.
    Band { width: i64 },
    /// Coordinate cells of `size` degrees, labeled by their lower edge.
    GeoCell { size: f64, decimals: usize },
}

impl Bucketing {
    /// Resolves the bucketing of `column` at `level`.
    ///
    /// `auto_time` supplies the data-driven width when a Time column is at
    /// level 0.
    pub fn resolve(column: &FacetColumn, level: u8, auto_time: Option<TimeGranularity>) -> Self {
        match (column.axis, column.kind) {
            (LatchAxis::Time, FacetKind::Timestamp) => Self::Time(
                TimeGranularity::from_level(level)
                    .or(auto_time)
                    .unwrap_or(TimeGranularity::Day),
            ),
            (LatchAxis::Alphabet, FacetKind::Text) if level > 0 => Self::FirstLetter,
            (LatchAxis::Hierarchy, FacetKind::Integer) if level > 0 => Self::Band {
                width: 1_i64 << level.min(62),
            },
            (LatchAxis::Location, FacetKind::Real) => {
                let exponent = i32::from(level);
                Self::GeoCell {
                    size: 0.01 * 10_f64.powi(exponent),
                    decimals: 2_usize.saturating_sub(usize::from(level)),
                }
            }
            _ => Self::Exact,
        }
    }

    /// Finest bucketing for `column`, used for axes in leaf mode.
    pub fn finest(column: &FacetColumn) -> Self {
        Self::resolve(column, 0, Some(TimeGranularity::Day))
    }

    /// Whether bucket keys order numerically rather than as text.
    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Band { .. } | Self::GeoCell { .. })
    }

    /// TEXT key expression over the qualified `column` (e.g. `i.priority`).
    pub fn key_sql(self, column: &str) -> String {
        let raw = match self {
            Self::Exact => format!("NULLIF(CAST({column} AS TEXT), '')"),
            Self::Time(granularity) => granularity.bucket_sql(column),
            Self::FirstLetter => format!("NULLIF(UPPER(SUBSTR(TRIM({column}), 1, 1)), '')"),
            Self::Band { width } => {
                let lower = format!("({column} - ((({column} % {width}) + {width}) % {width}))");
                format!("CAST({lower} AS TEXT) || '..' || CAST({lower} + {} AS TEXT)", width - 1)
            }
            Self::GeoCell { size, decimals } => {
                // Snapped so 0.29 / 0.01 floors to 29, not 28.
                let scaled = format!("ROUND({column} / {size:?}, 9)");
                let floor = format!(
                    "(CAST({scaled} AS INTEGER) - ({scaled} < CAST({scaled} AS INTEGER)))"
                );
                format!("printf('%.{decimals}f', {floor} * {size:?})")
            }
        };
        format!("COALESCE({raw}, '{NONE_BUCKET}')")
    }
}
