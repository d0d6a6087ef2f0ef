use serde::{Deserialize, Serialize};

/// Comparison used by a numeric having clause
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HavingOp {
    EqualTo,
    LessThan,
    GreaterThan,
}

/// Predicate over aggregated values, evaluated after grouping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "HavingRepr", into = "HavingRepr")]
pub enum HavingTree {
    Numeric {
        aggregation: String,
        op: HavingOp,
        value: f64,
    },
    And(Vec<HavingTree>),
    Or(Vec<HavingTree>),
    Not(Box<HavingTree>),
}

impl HavingTree {
    pub fn numeric(aggregation: impl Into<String>, op: HavingOp, value: f64) -> Self {
        HavingTree::Numeric {
            aggregation: aggregation.into(),
            op,
            value,
        }
    }

    pub fn greater_than(aggregation: impl Into<String>, value: f64) -> Self {
        Self::numeric(aggregation, HavingOp::GreaterThan, value)
    }

    pub fn less_than(aggregation: impl Into<String>, value: f64) -> Self {
        Self::numeric(aggregation, HavingOp::LessThan, value)
    }

    pub fn equal_to(aggregation: impl Into<String>, value: f64) -> Self {
        Self::numeric(aggregation, HavingOp::EqualTo, value)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum HavingRepr {
    EqualTo {
        aggregation: String,
        value: f64,
    },
    LessThan {
        aggregation: String,
        value: f64,
    },
    GreaterThan {
        aggregation: String,
        value: f64,
    },
    And {
        #[serde(rename = "havingSpecs")]
        having_specs: Vec<HavingTree>,
    },
    Or {
        #[serde(rename = "havingSpecs")]
        having_specs: Vec<HavingTree>,
    },
    Not {
        #[serde(rename = "havingSpec")]
        having_spec: Box<HavingTree>,
    },
}

impl From<HavingRepr> for HavingTree {
    fn from(repr: HavingRepr) -> Self {
        match repr {
            HavingRepr::EqualTo { aggregation, value } => {
                HavingTree::numeric(aggregation, HavingOp::EqualTo, value)
            }
            HavingRepr::LessThan { aggregation, value } => {
                HavingTree::numeric(aggregation, HavingOp::LessThan, value)
            }
            HavingRepr::GreaterThan { aggregation, value } => {
                HavingTree::numeric(aggregation, HavingOp::GreaterThan, value)
            }
            HavingRepr::And { having_specs } => HavingTree::And(having_specs),
            HavingRepr::Or { having_specs } => HavingTree::Or(having_specs),
            HavingRepr::Not { having_spec } => HavingTree::Not(having_spec),
        }
    }
}

impl From<HavingTree> for HavingRepr {
    fn from(tree: HavingTree) -> Self {
        match tree {
            HavingTree::Numeric {
                aggregation,
                op,
                value,
            } => match op {
                HavingOp::EqualTo => HavingRepr::EqualTo { aggregation, value },
                HavingOp::LessThan => HavingRepr::LessThan { aggregation, value },
                HavingOp::GreaterThan => HavingRepr::GreaterThan { aggregation, value },
            },
            HavingTree::And(having_specs) => HavingRepr::And { having_specs },
            HavingTree::Or(having_specs) => HavingRepr::Or { having_specs },
            HavingTree::Not(having_spec) => HavingRepr::Not { having_spec },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_having() {
        let json = r#"{
            "type": "or",
            "havingSpecs": [
                { "type": "greaterThan", "aggregation": "clicks", "value": 5 },
                { "type": "not", "havingSpec": { "type": "equalTo", "aggregation": "added", "value": 1.5 } }
            ]
        }"#;
        let having: HavingTree = serde_json::from_str(json).unwrap();
        assert_eq!(
            having,
            HavingTree::Or(vec![
                HavingTree::greater_than("clicks", 5.0),
                HavingTree::Not(Box::new(HavingTree::equal_to("added", 1.5))),
            ])
        );
    }

    #[test]
    fn test_encode_having() {
        let json = serde_json::to_value(HavingTree::less_than("clicks", 3.0)).unwrap();
        assert_eq!(json["type"], "lessThan");
        assert_eq!(json["aggregation"], "clicks");
    }
}
