//! Evaluates relational plans against a [`MemoryStore`]

use chrono::{Datelike, Timelike};
use std::cmp::Ordering;
use std::collections::HashMap;

use crate::data::{parse_timestamp, Value};
use crate::query::executor::ExecuteError;
use crate::query::plan::{
    output_layout, AggCall, CompareOp, Expr, GroupKey, Literal, OutputColumn, RelationalPlan,
    SortKey, Stage, TimeUnit,
};

use super::aggregates::{create_accumulator, Accumulator};
use super::engine::MemoryStore;

/// Intermediate relation between stages
#[derive(Debug, Default)]
struct Relation {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Relation {
    fn index(&self) -> HashMap<&str, usize> {
        self.columns
            .iter()
            .enumerate()
            .map(|(i, c)| (c.as_str(), i))
            .collect()
    }
}

/// Run every stage of `plan` in order, returning output column names and rows
pub fn execute_plan(
    store: &MemoryStore,
    plan: &RelationalPlan,
) -> Result<(Vec<String>, Vec<Vec<Value>>), ExecuteError> {
    let mut relation = Relation::default();

    for stage in &plan.stages {
        relation = match stage {
            Stage::Scan { table, .. } => scan(store, table)?,
            Stage::Project { columns } => project(relation, columns)?,
            Stage::Filter { predicate } => filter(relation, predicate)?,
            Stage::Aggregate { group_keys, calls } => aggregate(relation, group_keys, calls)?,
            Stage::Sort { keys } => sort(relation, keys)?,
            Stage::Limit { count } => {
                relation.rows.truncate(*count);
                relation
            }
        };
    }

    Ok((relation.columns, relation.rows))
}

fn scan(store: &MemoryStore, table: &str) -> Result<Relation, ExecuteError> {
    let table = store
        .get_table(table)
        .ok_or_else(|| ExecuteError::TableNotFound(table.to_string()))?;
    Ok(table.with_rows(|columns, rows| Relation {
        columns: columns.iter().map(|c| c.name.clone()).collect(),
        rows: rows.to_vec(),
    }))
}

fn project(relation: Relation, columns: &[String]) -> Result<Relation, ExecuteError> {
    let index = relation.index();
    let positions = columns
        .iter()
        .map(|c| {
            index
                .get(c.as_str())
                .copied()
                .ok_or_else(|| ExecuteError::ColumnNotFound(c.clone()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let rows = relation
        .rows
        .iter()
        .map(|row| positions.iter().map(|&i| row[i].clone()).collect())
        .collect();

    Ok(Relation {
        columns: columns.to_vec(),
        rows,
    })
}

/// Keeps rows whose predicate is true; false and unknown both drop the row
fn filter(relation: Relation, predicate: &Expr) -> Result<Relation, ExecuteError> {
    let Relation { columns, rows } = relation;
    let index: HashMap<&str, usize> = columns
        .iter()
        .enumerate()
        .map(|(i, c)| (c.as_str(), i))
        .collect();

    let mut kept = Vec::with_capacity(rows.len());
    for row in rows {
        if evaluate(predicate, &row, &index)? == Value::Bool(true) {
            kept.push(row);
        }
    }

    Ok(Relation {
        columns,
        rows: kept,
    })
}

fn aggregate(
    relation: Relation,
    group_keys: &[GroupKey],
    calls: &[AggCall],
) -> Result<Relation, ExecuteError> {
    let index = relation.index();
    let call_positions = calls
        .iter()
        .map(|call| {
            index
                .get(call.column.as_str())
                .copied()
                .ok_or_else(|| ExecuteError::ColumnNotFound(call.column.clone()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    // Group key -> accumulators for each call
    let mut groups: HashMap<Vec<Value>, Vec<Box<dyn Accumulator>>> = HashMap::new();

    for row in &relation.rows {
        let group_key = group_keys
            .iter()
            .map(|key| evaluate(&key.expr, row, &index))
            .collect::<Result<Vec<_>, _>>()?;

        let accumulators = groups.entry(group_key).or_insert_with(|| {
            calls
                .iter()
                .map(|call| create_accumulator(call.function))
                .collect()
        });

        for (acc, &position) in accumulators.iter_mut().zip(&call_positions) {
            acc.accumulate(&row[position]);
        }
    }

    // A global aggregate yields one row even over no input
    if group_keys.is_empty() && groups.is_empty() {
        groups.insert(
            Vec::new(),
            calls
                .iter()
                .map(|call| create_accumulator(call.function))
                .collect(),
        );
    }

    let layout = output_layout(group_keys, calls);
    let columns = layout
        .iter()
        .map(|column| match column {
            OutputColumn::Key(key) => key.name.clone(),
            OutputColumn::Call(call) => call.name.clone(),
        })
        .collect();

    let rows = groups
        .into_iter()
        .map(|(group_values, accumulators)| {
            layout
                .iter()
                .map(|column| match column {
                    OutputColumn::Key(key) => group_keys
                        .iter()
                        .position(|k| std::ptr::eq(k, *key))
                        .map(|i| group_values[i].clone())
                        .unwrap_or(Value::Null),
                    OutputColumn::Call(call) => calls
                        .iter()
                        .position(|c| std::ptr::eq(c, *call))
                        .map(|i| accumulators[i].result())
                        .unwrap_or(Value::Null),
                })
                .collect()
        })
        .collect();

    Ok(Relation { columns, rows })
}

fn sort(mut relation: Relation, keys: &[SortKey]) -> Result<Relation, ExecuteError> {
    let positions = {
        let index = relation.index();
        keys.iter()
            .map(|key| {
                index
                    .get(key.column.as_str())
                    .map(|&i| (i, key))
                    .ok_or_else(|| ExecuteError::ColumnNotFound(key.column.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?
    };

    relation.rows.sort_by(|a, b| {
        for &(idx, key) in &positions {
            let cmp = compare_for_sort(&a[idx], &b[idx], key);
            if cmp != Ordering::Equal {
                return cmp;
            }
        }
        Ordering::Equal
    });

    Ok(relation)
}

/// Null placement is independent of the sort direction
fn compare_for_sort(a: &Value, b: &Value, key: &SortKey) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) if key.nulls_first => Ordering::Less,
        (true, false) => Ordering::Greater,
        (false, true) if key.nulls_first => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) if key.descending => a.cmp(b).reverse(),
        (false, false) => a.cmp(b),
    }
}

/// Evaluate an expression over one row. Boolean results follow SQL three-valued
/// logic, with `Value::Null` standing for unknown.
fn evaluate(
    expr: &Expr,
    row: &[Value],
    index: &HashMap<&str, usize>,
) -> Result<Value, ExecuteError> {
    Ok(match expr {
        Expr::Column(name) => index
            .get(name.as_str())
            .map(|&i| row[i].clone())
            .ok_or_else(|| ExecuteError::ColumnNotFound(name.clone()))?,
        Expr::Literal(literal) => literal_value(literal),
        Expr::Extract { unit, zone, expr } => match evaluate(expr, row, index)?.as_datetime() {
            Some(instant) => {
                let local = instant.with_timezone(zone);
                let field = match unit {
                    TimeUnit::Year => local.year() as i64,
                    TimeUnit::Month => local.month() as i64,
                    TimeUnit::Week => local.iso_week().week() as i64,
                    TimeUnit::DayOfYear => local.ordinal() as i64,
                    TimeUnit::Hour => local.hour() as i64,
                    TimeUnit::Minute => local.minute() as i64,
                };
                Value::Int64(field)
            }
            None => Value::Null,
        },
        Expr::Compare { op, left, right } => {
            let left = evaluate(left, row, index)?;
            let right = evaluate(right, row, index)?;
            match compare_values(&left, &right) {
                Some(ordering) => Value::Bool(match op {
                    CompareOp::Eq => ordering == Ordering::Equal,
                    CompareOp::NotEq => ordering != Ordering::Equal,
                    CompareOp::Lt => ordering == Ordering::Less,
                    CompareOp::LtEq => ordering != Ordering::Greater,
                    CompareOp::Gt => ordering == Ordering::Greater,
                    CompareOp::GtEq => ordering != Ordering::Less,
                }),
                None => Value::Null,
            }
        }
        Expr::IsNull(inner) => Value::Bool(evaluate(inner, row, index)?.is_null()),
        Expr::And(operands) => {
            let mut unknown = false;
            for operand in operands {
                match evaluate(operand, row, index)?.as_bool() {
                    Some(false) => return Ok(Value::Bool(false)),
                    Some(true) => {}
                    None => unknown = true,
                }
            }
            if unknown {
                Value::Null
            } else {
                Value::Bool(true)
            }
        }
        Expr::Or(operands) => {
            let mut unknown = false;
            for operand in operands {
                match evaluate(operand, row, index)?.as_bool() {
                    Some(true) => return Ok(Value::Bool(true)),
                    Some(false) => {}
                    None => unknown = true,
                }
            }
            if unknown {
                Value::Null
            } else {
                Value::Bool(false)
            }
        }
        Expr::Not(inner) => match evaluate(inner, row, index)?.as_bool() {
            Some(b) => Value::Bool(!b),
            None => Value::Null,
        },
    })
}

fn literal_value(literal: &Literal) -> Value {
    match literal {
        Literal::String(s) => Value::String(s.clone()),
        Literal::Int(i) => Value::Int64(*i),
        Literal::Float(f) => Value::Float64(*f),
        Literal::Timestamp(instant) => Value::timestamp(*instant),
    }
}

/// Order two values, coercing a string operand to the other side's type.
/// `None` when either side is null.
fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Null, _) | (_, Value::Null) => None,
        (Value::String(s), other) if !matches!(other, Value::String(_)) => {
            Some(compare_text(s, other))
        }
        (other, Value::String(s)) if !matches!(other, Value::String(_)) => {
            Some(compare_text(s, other).reverse())
        }
        _ => Some(left.cmp(right)),
    }
}

fn compare_text(text: &str, other: &Value) -> Ordering {
    let coerced = match other {
        Value::Int64(_) | Value::Float64(_) => text.trim().parse::<f64>().ok().map(Value::Float64),
        Value::Bool(_) => text.parse::<bool>().ok().map(Value::Bool),
        Value::Timestamp(_) => parse_timestamp(text).map(Value::timestamp),
        _ => None,
    };
    match coerced {
        Some(value) => value.cmp(other),
        None => text.cmp(other.to_string().as_str()),
    }
}
