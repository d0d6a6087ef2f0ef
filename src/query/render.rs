//! SQL text for relational plans

use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;
use std::collections::HashMap;

use super::plan::{output_layout, AggCall, Expr, Literal, OutputColumn, RelationalPlan, Stage};
use super::planner::PlanError;

const TIMESTAMP_LITERAL_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Render one slice plan as a single SELECT statement
pub fn render_plan(plan: &RelationalPlan) -> Result<String, PlanError> {
    let mut from = None;
    let mut select = Vec::new();
    let mut where_clauses = Vec::new();
    let mut group_by = Vec::new();
    let mut having_clauses = Vec::new();
    let mut order_by = Vec::new();
    let mut limit = None;
    let mut calls: HashMap<&str, String> = HashMap::new();
    let mut aggregated = false;

    for stage in &plan.stages {
        match stage {
            Stage::Scan { schema, table } => {
                from = Some(format!("{}.{}", quote_ident(schema), quote_ident(table)));
            }
            Stage::Project { columns } => {
                select = columns.iter().map(|c| quote_ident(c)).collect();
            }
            Stage::Filter { predicate } if aggregated => {
                having_clauses.push(render_expr(predicate, &calls));
            }
            Stage::Filter { predicate } => {
                where_clauses.push(render_expr(predicate, &calls));
            }
            Stage::Aggregate {
                group_keys,
                calls: agg_calls,
            } => {
                aggregated = true;
                for call in agg_calls {
                    calls.insert(call.name.as_str(), render_call(call));
                }
                select = output_layout(group_keys, agg_calls)
                    .into_iter()
                    .map(|column| match column {
                        OutputColumn::Key(key) => match &key.expr {
                            Expr::Column(name) if *name == key.name => quote_ident(name),
                            expr => format!(
                                "{} AS {}",
                                render_expr(expr, &HashMap::new()),
                                quote_ident(&key.name)
                            ),
                        },
                        OutputColumn::Call(call) => {
                            format!("{} AS {}", render_call(call), quote_ident(&call.name))
                        }
                    })
                    .collect();
                group_by = group_keys
                    .iter()
                    .map(|key| render_expr(&key.expr, &HashMap::new()))
                    .collect();
            }
            Stage::Sort { keys } => {
                order_by = keys
                    .iter()
                    .map(|key| {
                        format!(
                            "{} {}{}",
                            quote_ident(&key.column),
                            if key.descending { "DESC" } else { "ASC" },
                            if key.nulls_first { " NULLS FIRST" } else { " NULLS LAST" }
                        )
                    })
                    .collect();
            }
            Stage::Limit { count } => limit = Some(*count),
        }
    }

    let from = from.ok_or_else(|| PlanError::InvalidStatement("plan has no scan".into()))?;
    if select.is_empty() {
        return Err(PlanError::InvalidStatement("plan selects no columns".into()));
    }

    let mut sql = format!("SELECT {}\nFROM {}", select.join(", "), from);
    if !where_clauses.is_empty() {
        sql.push_str(&format!("\nWHERE {}", where_clauses.join(" AND ")));
    }
    if !group_by.is_empty() {
        sql.push_str(&format!("\nGROUP BY {}", group_by.join(", ")));
    }
    if !having_clauses.is_empty() {
        sql.push_str(&format!("\nHAVING {}", having_clauses.join(" AND ")));
    }
    if !order_by.is_empty() {
        sql.push_str(&format!("\nORDER BY {}", order_by.join(", ")));
    }
    if let Some(limit) = limit {
        sql.push_str(&format!("\nLIMIT {}", limit));
    }
    Ok(sql)
}

/// Combine per-slice statements with UNION ALL
pub fn union_all(statements: &[String]) -> String {
    statements
        .iter()
        .map(|statement| format!("({})", statement))
        .collect::<Vec<_>>()
        .join("\nUNION ALL\n")
}

/// Check that the statement parses as exactly one SQL statement
pub fn validate_statement(sql: &str) -> Result<(), PlanError> {
    let statements = Parser::parse_sql(&GenericDialect {}, sql)
        .map_err(|e| PlanError::InvalidStatement(e.to_string()))?;
    if statements.len() != 1 {
        return Err(PlanError::InvalidStatement(format!(
            "expected one statement, got {}",
            statements.len()
        )));
    }
    Ok(())
}

pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn quote_string(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn render_call(call: &AggCall) -> String {
    format!("{}({})", call.function.name(), quote_ident(&call.column))
}

/// Columns found in `substitutions` render as the mapped text instead
fn render_expr(expr: &Expr, substitutions: &HashMap<&str, String>) -> String {
    match expr {
        Expr::Column(name) => substitutions
            .get(name.as_str())
            .cloned()
            .unwrap_or_else(|| quote_ident(name)),
        Expr::Literal(literal) => render_literal(literal),
        Expr::Extract { unit, zone, expr } => {
            let inner = render_expr(expr, substitutions);
            if *zone == chrono_tz::Tz::UTC {
                format!("EXTRACT({} FROM {})", unit.sql_name(), inner)
            } else {
                format!(
                    "EXTRACT({} FROM {} AT TIME ZONE {})",
                    unit.sql_name(),
                    inner,
                    quote_string(zone.name())
                )
            }
        }
        Expr::Compare { op, left, right } => format!(
            "({} {} {})",
            render_expr(left, substitutions),
            op.symbol(),
            render_expr(right, substitutions)
        ),
        Expr::IsNull(inner) => format!("({} IS NULL)", render_expr(inner, substitutions)),
        Expr::And(operands) => join_operands(operands, " AND ", "TRUE", substitutions),
        Expr::Or(operands) => join_operands(operands, " OR ", "FALSE", substitutions),
        Expr::Not(inner) => format!("(NOT {})", render_expr(inner, substitutions)),
    }
}

fn join_operands(
    operands: &[Expr],
    separator: &str,
    empty: &str,
    substitutions: &HashMap<&str, String>,
) -> String {
    if operands.is_empty() {
        return empty.to_string();
    }
    let parts: Vec<String> = operands
        .iter()
        .map(|operand| render_expr(operand, substitutions))
        .collect();
    format!("({})", parts.join(separator))
}

fn render_literal(literal: &Literal) -> String {
    match literal {
        Literal::String(s) => quote_string(s),
        Literal::Int(i) => i.to_string(),
        Literal::Float(f) => f.to_string(),
        Literal::Timestamp(ts) => {
            format!("TIMESTAMP '{}'", ts.format(TIMESTAMP_LITERAL_FORMAT))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::plan::{
        AggFunction, CompareOp, GroupKey, GroupKeyKind, SortKey, TimeUnit,
    };
    use chrono_tz::Tz;

    fn sample_plan(zone: Tz) -> RelationalPlan {
        let ts = "2020-01-01T00:00:00Z".parse::<chrono::DateTime<chrono::Utc>>().unwrap();
        RelationalPlan::new()
            .then(Stage::Scan {
                schema: "PUBLIC".into(),
                table: "wiki".into(),
            })
            .then(Stage::Project {
                columns: vec!["ts".into(), "clicks".into(), "country".into()],
            })
            .then(Stage::Filter {
                predicate: Expr::and(vec![
                    Expr::compare(
                        CompareOp::GtEq,
                        Expr::column("ts"),
                        Expr::Literal(Literal::Timestamp(ts)),
                    ),
                    Expr::compare(CompareOp::Eq, Expr::column("country"), Expr::string("O'Neil")),
                ]),
            })
            .then(Stage::Aggregate {
                group_keys: vec![
                    GroupKey {
                        expr: Expr::Extract {
                            unit: TimeUnit::Year,
                            zone,
                            expr: Box::new(Expr::column("ts")),
                        },
                        name: "__$year".into(),
                        kind: GroupKeyKind::Bucket(TimeUnit::Year),
                    },
                    GroupKey {
                        expr: Expr::column("country"),
                        name: "country".into(),
                        kind: GroupKeyKind::Dimension,
                    },
                ],
                calls: vec![AggCall {
                    function: AggFunction::Sum,
                    column: "clicks".into(),
                    name: "__clicks".into(),
                }],
            })
            .then(Stage::Filter {
                predicate: Expr::compare(
                    CompareOp::Gt,
                    Expr::column("__clicks"),
                    Expr::Literal(Literal::Float(5.0)),
                ),
            })
            .then(Stage::Sort {
                keys: vec![SortKey::descending("__clicks"), SortKey::ascending("country")],
            })
            .then(Stage::Limit { count: 5 })
    }

    #[test]
    fn test_render_full_plan() {
        let sql = render_plan(&sample_plan(Tz::UTC)).unwrap();
        assert_eq!(
            sql,
            "SELECT \"country\", EXTRACT(YEAR FROM \"ts\") AS \"__$year\", SUM(\"clicks\") AS \"__clicks\"\n\
             FROM \"PUBLIC\".\"wiki\"\n\
             WHERE ((\"ts\" >= TIMESTAMP '2020-01-01 00:00:00') AND (\"country\" = 'O''Neil'))\n\
             GROUP BY EXTRACT(YEAR FROM \"ts\"), \"country\"\n\
             HAVING (SUM(\"clicks\") > 5)\n\
             ORDER BY \"__clicks\" DESC NULLS FIRST, \"country\" ASC NULLS FIRST\n\
             LIMIT 5"
        );
        validate_statement(&sql).unwrap();
    }

    #[test]
    fn test_render_zoned_extract() {
        let sql = render_plan(&sample_plan(chrono_tz::Asia::Tokyo)).unwrap();
        assert!(sql.contains("EXTRACT(YEAR FROM \"ts\" AT TIME ZONE 'Asia/Tokyo')"));
        validate_statement(&sql).unwrap();
    }

    #[test]
    fn test_union_all_validates() {
        let one = render_plan(&sample_plan(Tz::UTC)).unwrap();
        let sql = union_all(&[one.clone(), one]);
        assert_eq!(sql.matches("\nUNION ALL\n").count(), 1);
        assert!(sql.starts_with("(SELECT"));
        validate_statement(&sql).unwrap();
    }

    #[test]
    fn test_invalid_statement_rejected() {
        assert!(matches!(
            validate_statement("SELECT FROM WHERE"),
            Err(PlanError::InvalidStatement(_))
        ));
    }

    #[test]
    fn test_plan_without_scan_rejected() {
        let plan = RelationalPlan::new().then(Stage::Limit { count: 1 });
        assert!(matches!(render_plan(&plan), Err(PlanError::InvalidStatement(_))));
    }
}
