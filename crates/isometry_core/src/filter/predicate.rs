//! Intermediate predicate tree and its SQL rendering.
//!
//! # Invariants
//! - Rendering emits `?` placeholders in the same order as `params`.
//! - Column names come from the facet catalog (`&'static str`), never from input.

use crate::filter::clause::FilterValue;
use rusqlite::types::Value;

/// SQL text plus positional parameters, appended in lock-step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqlFragment {
    pub sql: String,
    pub params: Vec<Value>,
}

impl SqlFragment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_sql(&mut self, sql: &str) -> &mut Self {
        self.sql.push_str(sql);
        self
    }

    pub fn push_param(&mut self, value: Value) -> &mut Self {
        self.sql.push('?');
        self.params.push(value);
        self
    }

    /// Appends another fragment, keeping placeholder order intact.
    pub fn append(&mut self, other: &SqlFragment) -> &mut Self {
        self.sql.push_str(&other.sql);
        self.params.extend(other.params.iter().cloned());
        self
    }

    fn push_param_list(&mut self, values: &[FilterValue]) {
        for (index, value) in values.iter().enumerate() {
            if index > 0 {
                self.sql.push_str(", ");
            }
            self.push_param(value.to_sql_value());
        }
    }
}

/// Composable boolean condition over one `items` row.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    /// `column BETWEEN min AND max` (inclusive).
    Between {
        column: &'static str,
        min: FilterValue,
        max: FilterValue,
    },
    /// `column IN (values)`.
    InList {
        column: &'static str,
        values: Vec<FilterValue>,
    },
    /// JSON array column contains any of `values`.
    JsonContainsAny {
        column: &'static str,
        values: Vec<FilterValue>,
    },
    /// Case-insensitive substring match; `pattern` is already LIKE-escaped.
    Like {
        column: &'static str,
        pattern: String,
    },
    /// Full-text `MATCH` against the item index.
    FullText { expression: String },
}

impl Predicate {
    /// Builds an AND node, flattening nested ANDs and unwrapping singletons.
    pub fn all(parts: Vec<Predicate>) -> Option<Predicate> {
        let mut flat = Vec::new();
        for part in parts {
            match part {
                Predicate::And(children) => flat.extend(children),
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => None,
            1 => flat.pop(),
            _ => Some(Predicate::And(flat)),
        }
    }

    /// Builds an OR node, flattening nested ORs and unwrapping singletons.
    pub fn any(parts: Vec<Predicate>) -> Option<Predicate> {
        let mut flat = Vec::new();
        for part in parts {
            match part {
                Predicate::Or(children) => flat.extend(children),
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => None,
            1 => flat.pop(),
            _ => Some(Predicate::Or(flat)),
        }
    }

    /// Renders this predicate for rows of `items` aliased as `alias`.
    pub fn render(&self, alias: &str) -> SqlFragment {
        let mut out = SqlFragment::new();
        self.render_into(alias, &mut out);
        out
    }

    fn render_into(&self, alias: &str, out: &mut SqlFragment) {
        match self {
            Self::And(children) => render_joined(children, " AND ", alias, out),
            Self::Or(children) => render_joined(children, " OR ", alias, out),
            Self::Between { column, min, max } => {
                out.push_sql(&format!("{alias}.{column} BETWEEN "));
                out.push_param(min.to_sql_value());
                out.push_sql(" AND ");
                out.push_param(max.to_sql_value());
            }
            Self::InList { column, values } => {
                out.push_sql(&format!("{alias}.{column} IN ("));
                out.push_param_list(values);
                out.push_sql(")");
            }
            Self::JsonContainsAny { column, values } => {
                out.push_sql(&format!(
                    "EXISTS (SELECT 1 FROM json_each({alias}.{column}) AS je WHERE je.value IN ("
                ));
                out.push_param_list(values);
                out.push_sql("))");
            }
            Self::Like { column, pattern } => {
                out.push_sql(&format!("{alias}.{column} LIKE "));
                out.push_param(Value::Text(pattern.clone()));
                out.push_sql(" ESCAPE '\\'");
            }
            Self::FullText { expression } => {
                out.push_sql(&format!(
                    "{alias}.rowid IN (SELECT rowid FROM items_fts WHERE items_fts MATCH "
                ));
                out.push_param(Value::Text(expression.clone()));
                out.push_sql(")");
            }
        }
    }
}

fn render_joined(children: &[Predicate], separator: &str, alias: &str, out: &mut SqlFragment) {
    out.push_sql("(");
    for (index, child) in children.iter().enumerate() {
        if index > 0 {
            out.push_sql(separator);
        }
        child.render_into(alias, out);
    }
    out.push_sql(")");
}

/// Escapes `%`, `_` and `\` and wraps the text for a contains-match.
pub fn like_contains_pattern(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len() + 2);
    escaped.push('%');
    for ch in raw.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}

/// Quotes every whitespace-separated term and AND-joins them for FTS5.
///
/// Returns `None` when the text has no terms.
pub fn fts_match_expression(text: &str) -> Option<String> {
    let terms = text
        .split_whitespace()
        .map(escape_fts_term)
        .collect::<Vec<_>>();
    if terms.is_empty() {
        return None;
    }
    Some(terms.join(" AND "))
}

fn escape_fts_term(raw: &str) -> String {
    let escaped = raw.replace('"', "\"\"");
    format!("\"{escaped}\"")
}

#[cfg(test)]
mod tests {
    use super::{fts_match_expression, like_contains_pattern, Predicate};
    use crate::filter::clause::FilterValue;
    use rusqlite::types::Value;

    #[test]
    fn render_keeps_placeholder_order() {
        let predicate = Predicate::all(vec![
            Predicate::Between {
                column: "priority",
                min: FilterValue::Integer(1),
                max: FilterValue::Integer(3),
            },
            Predicate::InList {
                column: "folder",
                values: vec![FilterValue::from("work"), FilterValue::from("home")],
            },
        ])
        .unwrap();

        let fragment = predicate.render("i");
        assert_eq!(
            fragment.sql,
            "(i.priority BETWEEN ? AND ? AND i.folder IN (?, ?))"
        );
        assert_eq!(
            fragment.params,
            vec![
                Value::Integer(1),
                Value::Integer(3),
                Value::Text("work".to_string()),
                Value::Text("home".to_string()),
            ]
        );
    }

    #[test]
    fn singleton_groups_unwrap() {
        let only = Predicate::Like {
            column: "name",
            pattern: "%a%".to_string(),
        };
        assert_eq!(Predicate::any(vec![only.clone()]), Some(only));
        assert_eq!(Predicate::all(Vec::new()), None);
    }

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_contains_pattern("50%_off"), "%50\\%\\_off%");
    }

    #[test]
    fn fts_expression_quotes_terms() {
        assert_eq!(
            fts_match_expression(" a:b  \"x ").as_deref(),
            Some("\"a:b\" AND \"\"\"x\"")
        );
        assert_eq!(fts_match_expression("   "), None);
    }
}
