use serde::{Deserialize, Serialize};

/// Arithmetic function of an arithmetic post-aggregation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArithmeticFn {
    #[serde(rename = "+")]
    Plus,
    #[serde(rename = "-")]
    Minus,
    #[serde(rename = "*")]
    Multiply,
    #[serde(rename = "/")]
    Divide,
}

/// Numeric expression computed from a row's aggregated values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PostAggregation {
    Constant {
        name: String,
        value: f64,
    },
    FieldAccess {
        #[serde(default)]
        name: String,
        #[serde(rename = "fieldName")]
        field_name: String,
    },
    Arithmetic {
        name: String,
        #[serde(rename = "fn")]
        function: ArithmeticFn,
        fields: Vec<PostAggregation>,
    },
    ThetaSketchEstimate {
        name: String,
    },
    ThetaSketchSetOp {
        name: String,
    },
    SketchEstimate {
        name: String,
    },
    SketchSetOper {
        name: String,
    },
    #[serde(other)]
    Unknown,
}

impl PostAggregation {
    pub fn constant(name: impl Into<String>, value: f64) -> Self {
        PostAggregation::Constant {
            name: name.into(),
            value,
        }
    }

    pub fn field_access(field_name: impl Into<String>) -> Self {
        let field_name = field_name.into();
        PostAggregation::FieldAccess {
            name: field_name.clone(),
            field_name,
        }
    }

    pub fn arithmetic(
        name: impl Into<String>,
        function: ArithmeticFn,
        fields: Vec<PostAggregation>,
    ) -> Self {
        PostAggregation::Arithmetic {
            name: name.into(),
            function,
            fields,
        }
    }

    /// Output name of this post-aggregation
    pub fn name(&self) -> &str {
        match self {
            PostAggregation::Constant { name, .. }
            | PostAggregation::FieldAccess { name, .. }
            | PostAggregation::Arithmetic { name, .. }
            | PostAggregation::ThetaSketchEstimate { name }
            | PostAggregation::ThetaSketchSetOp { name }
            | PostAggregation::SketchEstimate { name }
            | PostAggregation::SketchSetOper { name } => name,
            PostAggregation::Unknown => "",
        }
    }

    /// Protocol name of this post-aggregation type
    pub fn kind(&self) -> &'static str {
        match self {
            PostAggregation::Constant { .. } => "constant",
            PostAggregation::FieldAccess { .. } => "fieldAccess",
            PostAggregation::Arithmetic { .. } => "arithmetic",
            PostAggregation::ThetaSketchEstimate { .. } => "thetaSketchEstimate",
            PostAggregation::ThetaSketchSetOp { .. } => "thetaSketchSetOp",
            PostAggregation::SketchEstimate { .. } => "sketchEstimate",
            PostAggregation::SketchSetOper { .. } => "sketchSetOper",
            PostAggregation::Unknown => "unknown",
        }
    }
}
