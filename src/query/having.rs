use super::alias::AliasMaker;
use super::plan::{CompareOp, Expr, Literal};
use super::planner::PlanError;
use crate::model::{AggregationQuery, HavingOp, HavingTree};

/// Lower a having tree to a predicate over aliased aggregate columns.
/// No tree means no predicate.
pub fn lower_having(
    having: Option<&HavingTree>,
    query: &AggregationQuery,
    aliases: &AliasMaker,
) -> Result<Option<Expr>, PlanError> {
    having.map(|tree| lower(tree, query, aliases)).transpose()
}

fn lower(
    tree: &HavingTree,
    query: &AggregationQuery,
    aliases: &AliasMaker,
) -> Result<Expr, PlanError> {
    match tree {
        HavingTree::Numeric {
            aggregation,
            op,
            value,
        } => {
            if query.aggregation(aggregation).is_none() {
                return Err(PlanError::UnknownAggregation(aggregation.clone()));
            }
            let op = match op {
                HavingOp::EqualTo => CompareOp::Eq,
                HavingOp::LessThan => CompareOp::Lt,
                HavingOp::GreaterThan => CompareOp::Gt,
            };
            Ok(Expr::compare(
                op,
                Expr::column(aliases.apply(aggregation)),
                Expr::Literal(Literal::Float(*value)),
            ))
        }
        HavingTree::And(children) => {
            Ok(Expr::and(lower_children(children, "and", query, aliases)?))
        }
        HavingTree::Or(children) => {
            Ok(Expr::or(lower_children(children, "or", query, aliases)?))
        }
        HavingTree::Not(child) => Ok(Expr::negate(lower(child, query, aliases)?)),
    }
}

fn lower_children(
    children: &[HavingTree],
    kind: &'static str,
    query: &AggregationQuery,
    aliases: &AliasMaker,
) -> Result<Vec<Expr>, PlanError> {
    if children.is_empty() {
        return Err(PlanError::EmptyHaving(kind));
    }
    children.iter().map(|child| lower(child, query, aliases)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Aggregation, Grain, Granularity};

    fn query() -> AggregationQuery {
        AggregationQuery::group_by("t", Granularity::utc(Grain::Day))
            .with_aggregation(Aggregation::new("longSum", "m", "m"))
            .with_aggregation(Aggregation::new("doubleSum", "n", "n"))
    }

    fn gt(column: &str, value: f64) -> Expr {
        Expr::compare(
            CompareOp::Gt,
            Expr::column(column),
            Expr::Literal(Literal::Float(value)),
        )
    }

    #[test]
    fn test_no_having() {
        assert_eq!(lower_having(None, &query(), &AliasMaker::default()).unwrap(), None);
    }

    #[test]
    fn test_numeric_uses_alias() {
        let having = HavingTree::greater_than("m", 5.0);
        let expr = lower_having(Some(&having), &query(), &AliasMaker::default()).unwrap();
        assert_eq!(expr, Some(gt("__m", 5.0)));
    }

    #[test]
    fn test_compound_having() {
        let having = HavingTree::And(vec![
            HavingTree::greater_than("m", 5.0),
            HavingTree::Not(Box::new(HavingTree::Or(vec![
                HavingTree::equal_to("n", 1.0),
                HavingTree::less_than("n", 0.0),
            ]))),
        ]);
        let expr = lower_having(Some(&having), &query(), &AliasMaker::default())
            .unwrap()
            .unwrap();

        let Expr::And(parts) = expr else {
            panic!("expected conjunction");
        };
        assert_eq!(parts[0], gt("__m", 5.0));
        let Expr::Not(inner) = &parts[1] else {
            panic!("expected negation");
        };
        assert!(matches!(inner.as_ref(), Expr::Or(o) if o.len() == 2));
    }

    #[test]
    fn test_unknown_aggregation_fails() {
        let having = HavingTree::greater_than("missing", 1.0);
        assert!(matches!(
            lower_having(Some(&having), &query(), &AliasMaker::default()),
            Err(PlanError::UnknownAggregation(name)) if name == "missing"
        ));
    }
}
