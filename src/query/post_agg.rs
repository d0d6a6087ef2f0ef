use crate::model::{ArithmeticFn, PostAggregation};

#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    #[error("Unsupported post-aggregation type: {0}")]
    Unsupported(&'static str),

    #[error("{function:?} takes exactly 2 operands, got {found}")]
    Arity {
        function: ArithmeticFn,
        found: usize,
    },

    #[error("No value for field '{0}'")]
    MissingField(String),

    #[error("Field '{field}' is not numeric: {value}")]
    NotNumeric { field: String, value: String },
}

/// Evaluate a post-aggregation against one row. `lookup` maps an
/// aggregation name to the row's value for it.
pub fn evaluate<'a, F>(post_agg: &PostAggregation, lookup: &F) -> Result<f64, EvalError>
where
    F: Fn(&str) -> Option<&'a str>,
{
    match post_agg {
        PostAggregation::Constant { value, .. } => Ok(*value),
        PostAggregation::FieldAccess { field_name, .. } => {
            let raw = lookup(field_name).ok_or_else(|| EvalError::MissingField(field_name.clone()))?;
            raw.trim().parse::<f64>().map_err(|_| EvalError::NotNumeric {
                field: field_name.clone(),
                value: raw.to_string(),
            })
        }
        PostAggregation::Arithmetic {
            function, fields, ..
        } => {
            let operands = fields
                .iter()
                .map(|field| evaluate(field, lookup))
                .collect::<Result<Vec<_>, _>>()?;
            arithmetic(*function, &operands)
        }
        PostAggregation::ThetaSketchEstimate { .. }
        | PostAggregation::ThetaSketchSetOp { .. }
        | PostAggregation::SketchEstimate { .. }
        | PostAggregation::SketchSetOper { .. }
        | PostAggregation::Unknown => Err(EvalError::Unsupported(post_agg.kind())),
    }
}

fn arithmetic(function: ArithmeticFn, operands: &[f64]) -> Result<f64, EvalError> {
    match function {
        ArithmeticFn::Plus => Ok(operands.iter().fold(0.0, |acc, v| acc + v)),
        ArithmeticFn::Multiply => Ok(operands.iter().fold(1.0, |acc, v| acc * v)),
        ArithmeticFn::Minus | ArithmeticFn::Divide => {
            let [left, right] = operands else {
                return Err(EvalError::Arity {
                    function,
                    found: operands.len(),
                });
            };
            Ok(match function {
                ArithmeticFn::Minus => left - right,
                // Division by zero is defined as 0
                _ if *right == 0.0 => 0.0,
                _ => left / right,
            })
        }
    }
}

/// First unsupported post-aggregation kind anywhere in the tree
pub fn find_unsupported(post_agg: &PostAggregation) -> Option<&'static str> {
    match post_agg {
        PostAggregation::Constant { .. } | PostAggregation::FieldAccess { .. } => None,
        PostAggregation::Arithmetic { fields, .. } => fields.iter().find_map(find_unsupported),
        other => Some(other.kind()),
    }
}
