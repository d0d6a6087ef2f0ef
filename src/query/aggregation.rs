use super::plan::AggFunction;
use super::planner::PlanError;
use crate::model::Aggregation;

/// How an aggregation's result cell is typed in the response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coercion {
    Integer,
    Float,
    /// Emitted verbatim as a string
    PassThrough,
}

/// SQL aggregate selected by the aggregation's declared type
pub fn agg_function(aggregation: &Aggregation) -> Result<AggFunction, PlanError> {
    let kind = aggregation.kind.to_ascii_lowercase();
    if kind.contains("sum") {
        Ok(AggFunction::Sum)
    } else if kind.contains("min") {
        Ok(AggFunction::Min)
    } else if kind.contains("max") {
        Ok(AggFunction::Max)
    } else {
        Err(PlanError::UnsupportedAggregation {
            name: aggregation.name.clone(),
            kind: aggregation.kind.clone(),
        })
    }
}

pub fn coercion(kind: &str) -> Coercion {
    let kind = kind.to_ascii_lowercase();
    if kind.contains("long") {
        Coercion::Integer
    } else if kind.contains("double") {
        Coercion::Float
    } else {
        Coercion::PassThrough
    }
}
