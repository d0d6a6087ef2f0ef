//! Filter lowering
//!
//! Turns a protocol filter tree into a boolean expression over projected
//! columns and reports which dimensions it touched, so the planner can
//! include them in the projection.

use super::plan::{CompareOp, Expr};
use super::planner::PlanError;
use crate::model::FilterTree;

/// A lowered filter together with the dimensions it references
#[derive(Debug, Clone, PartialEq)]
pub struct FilterPredicate {
    pub predicate: Expr,
    /// First-occurrence order, no duplicates
    pub dimensions: Vec<String>,
}

/// Lower a filter tree. Unsupported variants fail instead of being dropped.
pub fn lower_filter(filter: &FilterTree) -> Result<FilterPredicate, PlanError> {
    let mut dimensions = Vec::new();
    let predicate = lower(filter, &mut dimensions)?;
    Ok(FilterPredicate {
        predicate,
        dimensions,
    })
}

fn lower(filter: &FilterTree, dimensions: &mut Vec<String>) -> Result<Expr, PlanError> {
    match filter {
        FilterTree::Selector { dimension, value } => {
            reference(dimensions, dimension);
            Ok(match value {
                Some(value) => Expr::compare(
                    CompareOp::Eq,
                    Expr::column(dimension),
                    Expr::string(value),
                ),
                None => Expr::IsNull(Box::new(Expr::column(dimension))),
            })
        }
        FilterTree::And { fields } => Ok(Expr::and(lower_all(filter, fields, dimensions)?)),
        FilterTree::Or { fields } => Ok(Expr::or(lower_all(filter, fields, dimensions)?)),
        FilterTree::Not { field } => Ok(Expr::negate(lower(field, dimensions)?)),
        FilterTree::In { dimension, values } => {
            if values.is_empty() {
                return Err(PlanError::EmptyFilter(filter.kind()));
            }
            reference(dimensions, dimension);
            Ok(Expr::or(
                values
                    .iter()
                    .map(|value| {
                        Expr::compare(CompareOp::Eq, Expr::column(dimension), Expr::string(value))
                    })
                    .collect(),
            ))
        }
        FilterTree::Regex { .. } | FilterTree::Unknown => {
            Err(PlanError::UnsupportedFilter(filter.kind()))
        }
    }
}

fn lower_all(
    parent: &FilterTree,
    fields: &[FilterTree],
    dimensions: &mut Vec<String>,
) -> Result<Vec<Expr>, PlanError> {
    if fields.is_empty() {
        return Err(PlanError::EmptyFilter(parent.kind()));
    }
    fields.iter().map(|field| lower(field, dimensions)).collect()
}

fn reference(dimensions: &mut Vec<String>, dimension: &str) {
    if !dimensions.iter().any(|d| d == dimension) {
        dimensions.push(dimension.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eq(column: &str, value: &str) -> Expr {
        Expr::compare(CompareOp::Eq, Expr::column(column), Expr::string(value))
    }

    #[test]
    fn test_selector() {
        let lowered = lower_filter(&FilterTree::selector("country", "US")).unwrap();
        assert_eq!(lowered.predicate, eq("country", "US"));
        assert_eq!(lowered.dimensions, vec!["country"]);
    }

    #[test]
    fn test_null_selector() {
        let filter = FilterTree::Selector {
            dimension: "page".into(),
            value: None,
        };
        let lowered = lower_filter(&filter).unwrap();
        assert_eq!(
            lowered.predicate,
            Expr::IsNull(Box::new(Expr::column("page")))
        );
    }

    #[test]
    fn test_nested_tree_and_referenced_dimensions() {
        let filter = FilterTree::and(vec![
            FilterTree::selector("d1", "v1"),
            FilterTree::or(vec![
                FilterTree::selector("d2", "v2"),
                FilterTree::not(FilterTree::selector("d1", "v3")),
            ]),
        ]);
        let lowered = lower_filter(&filter).unwrap();

        assert_eq!(
            lowered.predicate,
            Expr::And(vec![
                eq("d1", "v1"),
                Expr::Or(vec![eq("d2", "v2"), Expr::negate(eq("d1", "v3"))]),
            ])
        );
        assert_eq!(lowered.dimensions, vec!["d1", "d2"]);
    }

    #[test]
    fn test_in_filter_becomes_disjunction() {
        let filter = FilterTree::In {
            dimension: "country".into(),
            values: vec!["US".into(), "FR".into()],
        };
        let lowered = lower_filter(&filter).unwrap();
        assert_eq!(
            lowered.predicate,
            Expr::Or(vec![eq("country", "US"), eq("country", "FR")])
        );
    }

    #[test]
    fn test_unsupported_filters_fail() {
        let regex = FilterTree::Regex {
            dimension: "page".into(),
            pattern: "^a".into(),
        };
        assert!(matches!(
            lower_filter(&regex),
            Err(PlanError::UnsupportedFilter("regex"))
        ));

        let nested = FilterTree::and(vec![FilterTree::selector("a", "b"), FilterTree::Unknown]);
        assert!(matches!(
            lower_filter(&nested),
            Err(PlanError::UnsupportedFilter("unknown"))
        ));
    }

    #[test]
    fn test_empty_compound_fails() {
        assert!(matches!(
            lower_filter(&FilterTree::or(vec![])),
            Err(PlanError::EmptyFilter("or"))
        ));
    }
}
