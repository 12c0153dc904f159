//! Filter clause model held in UI state.

use crate::model::facet::{LatchAxis, TextProperty};
use rusqlite::types::Value;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt::{Display, Formatter};

/// Scalar bound or list member of a clause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Integer(i64),
    Real(f64),
    Text(String),
}

impl FilterValue {
    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Integer(_) | Self::Real(_))
    }

    /// Orders two values of compatible type; `None` for number vs text.
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Integer(left), Self::Integer(right)) => Some(left.cmp(right)),
            (Self::Text(left), Self::Text(right)) => Some(left.cmp(right)),
            (left, right) if left.is_numeric() && right.is_numeric() => {
                left.as_f64()?.partial_cmp(&right.as_f64()?)
            }
            _ => None,
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(value) => Some(*value as f64),
            Self::Real(value) => Some(*value),
            Self::Text(_) => None,
        }
    }

    pub(crate) fn to_sql_value(&self) -> Value {
        match self {
            Self::Integer(value) => Value::Integer(*value),
            Self::Real(value) => Value::Real(*value),
            Self::Text(value) => Value::Text(value.clone()),
        }
    }
}

impl Display for FilterValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Integer(value) => write!(f, "{value}"),
            Self::Real(value) => write!(f, "{value}"),
            Self::Text(value) => write!(f, "`{value}`"),
        }
    }
}

impl From<i64> for FilterValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for FilterValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<f64> for FilterValue {
    fn from(value: f64) -> Self {
        Self::Real(value)
    }
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// One user-chosen filter condition.
///
/// `label` is display text only and never influences compilation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operator", rename_all = "snake_case")]
pub enum FilterClause {
    /// Inclusive `[min, max]` bounds on one column.
    Range {
        axis: LatchAxis,
        facet: String,
        min: FilterValue,
        max: FilterValue,
        #[serde(default)]
        label: Option<String>,
    },
    /// Column equals any listed value (multi-select chips).
    InList {
        axis: LatchAxis,
        facet: String,
        values: Vec<FilterValue>,
        #[serde(default)]
        label: Option<String>,
    },
    /// Substring (or full-text for `all`) match on an allow-listed property.
    TextMatch {
        axis: LatchAxis,
        property: TextProperty,
        query: String,
        #[serde(default)]
        label: Option<String>,
    },
}

impl FilterClause {
    pub fn range(
        axis: LatchAxis,
        facet: impl Into<String>,
        min: impl Into<FilterValue>,
        max: impl Into<FilterValue>,
    ) -> Self {
        Self::Range {
            axis,
            facet: facet.into(),
            min: min.into(),
            max: max.into(),
            label: None,
        }
    }

    pub fn in_list<I, V>(axis: LatchAxis, facet: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<FilterValue>,
    {
        Self::InList {
            axis,
            facet: facet.into(),
            values: values.into_iter().map(Into::into).collect(),
            label: None,
        }
    }

    pub fn text_match(axis: LatchAxis, property: TextProperty, query: impl Into<String>) -> Self {
        Self::TextMatch {
            axis,
            property,
            query: query.into(),
            label: None,
        }
    }

    /// Attaches a display label.
    pub fn labeled(mut self, text: impl Into<String>) -> Self {
        let text = Some(text.into());
        match &mut self {
            Self::Range { label, .. } | Self::InList { label, .. } | Self::TextMatch { label, .. } => {
                *label = text;
            }
        }
        self
    }

    pub fn axis(&self) -> LatchAxis {
        match self {
            Self::Range { axis, .. } | Self::InList { axis, .. } | Self::TextMatch { axis, .. } => {
                *axis
            }
        }
    }

    /// Column (or text property) the clause targets; grouping key for composition.
    pub fn facet_key(&self) -> &str {
        match self {
            Self::Range { facet, .. } | Self::InList { facet, .. } => facet.as_str(),
            Self::TextMatch { property, .. } => property.as_str(),
        }
    }

    pub fn operator(&self) -> &'static str {
        match self {
            Self::Range { .. } => "range",
            Self::InList { .. } => "in_list",
            Self::TextMatch { .. } => "text_match",
        }
    }

    pub fn label(&self) -> Option<&str> {
        match self {
            Self::Range { label, .. } | Self::InList { label, .. } | Self::TextMatch { label, .. } => {
                label.as_deref()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{FilterClause, FilterValue};
    use crate::model::facet::LatchAxis;
    use std::cmp::Ordering;

    #[test]
    fn clause_deserializes_from_ui_json() {
        let clause: FilterClause = serde_json::from_str(
            r#"{"operator":"in_list","axis":"C","facet":"folder","values":["work","personal"],"label":"Folders"}"#,
        )
        .unwrap();
        assert_eq!(clause.axis(), LatchAxis::Category);
        assert_eq!(clause.facet_key(), "folder");
        assert_eq!(clause.label(), Some("Folders"));
    }

    #[test]
    fn numeric_values_compare_across_integer_and_real() {
        let low = FilterValue::Integer(1);
        let high = FilterValue::Real(1.5);
        assert_eq!(low.compare(&high), Some(Ordering::Less));
        assert_eq!(low.compare(&FilterValue::from("1")), None);
    }
}
