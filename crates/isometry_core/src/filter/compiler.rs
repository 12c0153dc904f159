//! Clause → predicate compiler.
//!
//! Composition rules:
//! - different axes combine with AND;
//! - same axis, different facets combine with AND;
//! - `in_list` clauses on the same axis and facet combine with OR;
//! - any other clauses on the same facet combine with AND;
//! - an axis without clauses contributes nothing.

use crate::error::ValidationError;
use crate::filter::clause::{FilterClause, FilterValue};
use crate::filter::predicate::{fts_match_expression, like_contains_pattern, Predicate, SqlFragment};
use crate::model::facet::{lookup_facet, FacetColumn, FacetKind, LatchAxis};
use crate::model::item::normalize_tag;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Output of compilation, shared verbatim by aggregation and traversal.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompiledFilter {
    predicate: Option<Predicate>,
    include_deleted: bool,
}

impl CompiledFilter {
    /// Filter matching every active item.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_predicate(predicate: Option<Predicate>) -> Self {
        Self {
            predicate,
            include_deleted: false,
        }
    }

    /// Opts into soft-deleted rows. Traversal ignores this flag.
    pub fn with_deleted(mut self, include_deleted: bool) -> Self {
        self.include_deleted = include_deleted;
        self
    }

    pub fn predicate(&self) -> Option<&Predicate> {
        self.predicate.as_ref()
    }

    pub fn includes_deleted(&self) -> bool {
        self.include_deleted
    }

    /// Full row condition for `items` aliased as `alias`, including the
    /// soft-delete guard. Never empty: renders `1 = 1` for an open filter.
    pub fn render(&self, alias: &str) -> SqlFragment {
        let mut out = SqlFragment::new();
        let mut has_condition = false;
        if !self.include_deleted {
            out.push_sql(&format!("{alias}.deleted_at IS NULL"));
            has_condition = true;
        }
        if let Some(predicate) = &self.predicate {
            if has_condition {
                out.push_sql(" AND ");
            }
            out.append(&predicate.render(alias));
            has_condition = true;
        }
        if !has_condition {
            out.push_sql("1 = 1");
        }
        out
    }
}

/// Compiles an axis → clauses mapping.
///
/// # Errors
/// Returns the first `ValidationError` found; nothing is partially compiled.
pub fn compile_filters(
    clauses: &BTreeMap<LatchAxis, Vec<FilterClause>>,
) -> Result<CompiledFilter, ValidationError> {
    let mut axis_predicates = Vec::new();
    for axis in LatchAxis::ALL {
        let Some(axis_clauses) = clauses.get(&axis) else {
            continue;
        };
        for clause in axis_clauses {
            if clause.axis() != axis {
                return Err(ValidationError::FacetAxisMismatch {
                    facet: clause.facet_key().to_string(),
                    expected: axis,
                    actual: clause.axis(),
                });
            }
        }
        if let Some(predicate) = compile_axis(axis_clauses)? {
            axis_predicates.push(predicate);
        }
    }
    Ok(CompiledFilter::from_predicate(Predicate::all(axis_predicates)))
}

/// Compiles a flat clause list, grouping by each clause's own axis.
pub fn compile_clauses(clauses: &[FilterClause]) -> Result<CompiledFilter, ValidationError> {
    let mut by_axis: BTreeMap<LatchAxis, Vec<FilterClause>> = BTreeMap::new();
    for clause in clauses {
        by_axis.entry(clause.axis()).or_default().push(clause.clone());
    }
    compile_filters(&by_axis)
}

fn compile_axis(clauses: &[FilterClause]) -> Result<Option<Predicate>, ValidationError> {
    // First-seen facet order keeps rendered SQL stable for identical state.
    let mut facet_groups: Vec<(&str, Vec<&FilterClause>)> = Vec::new();
    for clause in clauses {
        let key = clause.facet_key();
        match facet_groups.iter_mut().find(|(facet, _)| *facet == key) {
            Some((_, group)) => group.push(clause),
            None => facet_groups.push((key, vec![clause])),
        }
    }

    let mut facet_predicates = Vec::new();
    for (_, group) in facet_groups {
        let mut unions = Vec::new();
        let mut intersections = Vec::new();
        for clause in group {
            let predicate = compile_clause(clause)?;
            match clause {
                FilterClause::InList { .. } => unions.push(predicate),
                _ => intersections.push(predicate),
            }
        }
        if let Some(union) = Predicate::any(unions) {
            intersections.push(union);
        }
        if let Some(predicate) = Predicate::all(intersections) {
            facet_predicates.push(predicate);
        }
    }

    Ok(Predicate::all(facet_predicates))
}

/// Validates and compiles a single clause.
pub fn compile_clause(clause: &FilterClause) -> Result<Predicate, ValidationError> {
    match clause {
        FilterClause::Range {
            axis,
            facet,
            min,
            max,
            ..
        } => {
            let column = resolve_column(*axis, facet)?;
            if column.kind == FacetKind::JsonList {
                return Err(ValidationError::UnsupportedOperator {
                    facet: facet.clone(),
                    operator: clause.operator(),
                });
            }
            ensure_value_fits(column, min)?;
            ensure_value_fits(column, max)?;
            match min.compare(max) {
                Some(Ordering::Greater) => Err(ValidationError::InvalidRange {
                    facet: facet.clone(),
                    min: min.to_string(),
                    max: max.to_string(),
                }),
                Some(_) => Ok(Predicate::Between {
                    column: column.name,
                    min: min.clone(),
                    max: max.clone(),
                }),
                None => Err(ValidationError::IncompatibleValueType {
                    facet: facet.clone(),
                }),
            }
        }
        FilterClause::InList {
            axis,
            facet,
            values,
            ..
        } => {
            let column = resolve_column(*axis, facet)?;
            if values.is_empty() {
                return Err(ValidationError::EmptyInList {
                    facet: facet.clone(),
                });
            }
            for value in values {
                ensure_value_fits(column, value)?;
            }
            if column.kind == FacetKind::JsonList {
                return Ok(Predicate::JsonContainsAny {
                    column: column.name,
                    values: normalize_list_values(facet, values)?,
                });
            }
            Ok(Predicate::InList {
                column: column.name,
                values: values.clone(),
            })
        }
        FilterClause::TextMatch {
            property, query, ..
        } => {
            let trimmed = query.trim();
            if trimmed.is_empty() {
                return Err(ValidationError::BlankTextQuery {
                    property: property.as_str(),
                });
            }
            match property.column() {
                Some(column) => Ok(Predicate::Like {
                    column,
                    pattern: like_contains_pattern(trimmed),
                }),
                None => fts_match_expression(trimmed)
                    .map(|expression| Predicate::FullText { expression })
                    .ok_or(ValidationError::BlankTextQuery {
                        property: property.as_str(),
                    }),
            }
        }
    }
}

fn resolve_column(axis: LatchAxis, facet: &str) -> Result<&'static FacetColumn, ValidationError> {
    let column =
        lookup_facet(facet).ok_or_else(|| ValidationError::UnknownFacet(facet.to_string()))?;
    if column.axis != axis {
        return Err(ValidationError::FacetAxisMismatch {
            facet: facet.to_string(),
            expected: axis,
            actual: column.axis,
        });
    }
    Ok(column)
}

fn ensure_value_fits(column: &FacetColumn, value: &FilterValue) -> Result<(), ValidationError> {
    let fits = match column.kind {
        FacetKind::Text | FacetKind::JsonList => matches!(value, FilterValue::Text(_)),
        FacetKind::Integer | FacetKind::Timestamp => matches!(value, FilterValue::Integer(_)),
        FacetKind::Real => value.is_numeric(),
    };
    if fits {
        Ok(())
    } else {
        Err(ValidationError::IncompatibleValueType {
            facet: column.name.to_string(),
        })
    }
}

fn normalize_list_values(
    facet: &str,
    values: &[FilterValue],
) -> Result<Vec<FilterValue>, ValidationError> {
    let mut normalized: Vec<FilterValue> = Vec::new();
    for value in values {
        if let FilterValue::Text(text) = value {
            if let Some(tag) = normalize_tag(text) {
                let candidate = FilterValue::Text(tag);
                if !normalized.contains(&candidate) {
                    normalized.push(candidate);
                }
            }
        }
    }
    if normalized.is_empty() {
        return Err(ValidationError::EmptyInList {
            facet: facet.to_string(),
        });
    }
    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::{compile_clause, compile_clauses, CompiledFilter};
    use crate::error::ValidationError;
    use crate::filter::clause::{FilterClause, FilterValue};
    use crate::filter::predicate::Predicate;
    use crate::model::facet::{LatchAxis, TextProperty};

    #[test]
    fn same_facet_in_lists_union() {
        let compiled = compile_clauses(&[
            FilterClause::in_list(LatchAxis::Category, "folder", ["work"]),
            FilterClause::in_list(LatchAxis::Category, "folder", ["personal"]),
        ])
        .unwrap();
        assert!(matches!(compiled.predicate(), Some(Predicate::Or(parts)) if parts.len() == 2));
    }

    #[test]
    fn different_axes_intersect() {
        let compiled = compile_clauses(&[
            FilterClause::in_list(LatchAxis::Category, "folder", ["work"]),
            FilterClause::range(LatchAxis::Hierarchy, "priority", 1, 3),
        ])
        .unwrap();
        let fragment = compiled.render("i");
        assert_eq!(
            fragment.sql,
            "i.deleted_at IS NULL AND (i.folder IN (?) AND i.priority BETWEEN ? AND ?)"
        );
    }

    #[test]
    fn reversed_range_is_rejected_not_swapped() {
        let err = compile_clause(&FilterClause::range(LatchAxis::Hierarchy, "priority", 5, 1))
            .unwrap_err();
        assert!(matches!(err, ValidationError::InvalidRange { .. }));
    }

    #[test]
    fn facet_on_wrong_axis_is_rejected() {
        let err = compile_clause(&FilterClause::in_list(LatchAxis::Time, "folder", ["work"]))
            .unwrap_err();
        assert_eq!(
            err,
            ValidationError::FacetAxisMismatch {
                facet: "folder".to_string(),
                expected: LatchAxis::Time,
                actual: LatchAxis::Category,
            }
        );
    }

    #[test]
    fn tag_values_are_normalized() {
        let predicate = compile_clause(&FilterClause::in_list(
            LatchAxis::Category,
            "tags",
            ["Urgent", "urgent "],
        ))
        .unwrap();
        assert_eq!(
            predicate,
            Predicate::JsonContainsAny {
                column: "tags",
                values: vec![FilterValue::from("urgent")],
            }
        );
    }

    #[test]
    fn text_match_uses_allow_listed_column() {
        let predicate =
            compile_clause(&FilterClause::text_match(LatchAxis::Alphabet, TextProperty::Summary, "q"))
                .unwrap();
        assert_eq!(predicate.render("t").sql, "t.summary LIKE ? ESCAPE '\\'");
    }

    #[test]
    fn open_filter_still_guards_soft_deletes() {
        assert_eq!(CompiledFilter::empty().render("i").sql, "i.deleted_at IS NULL");
        assert_eq!(
            CompiledFilter::empty().with_deleted(true).render("i").sql,
            "1 = 1"
        );
    }
}
