use serde::{Deserialize, Serialize};

/// Row filter applied before aggregation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum FilterTree {
    /// `dimension = value`; a null value matches missing values
    Selector {
        dimension: String,
        value: Option<String>,
    },
    And {
        fields: Vec<FilterTree>,
    },
    Or {
        fields: Vec<FilterTree>,
    },
    Not {
        field: Box<FilterTree>,
    },
    /// Any of the listed values
    In {
        dimension: String,
        values: Vec<String>,
    },
    /// Decoded so it can be rejected explicitly
    Regex {
        dimension: String,
        pattern: String,
    },
    /// Any other protocol filter type
    #[serde(other)]
    Unknown,
}

impl FilterTree {
    pub fn selector(dimension: impl Into<String>, value: impl Into<String>) -> Self {
        FilterTree::Selector {
            dimension: dimension.into(),
            value: Some(value.into()),
        }
    }

    pub fn and(fields: Vec<FilterTree>) -> Self {
        FilterTree::And { fields }
    }

    pub fn or(fields: Vec<FilterTree>) -> Self {
        FilterTree::Or { fields }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(field: FilterTree) -> Self {
        FilterTree::Not {
            field: Box::new(field),
        }
    }

    /// Protocol name of this filter type
    pub fn kind(&self) -> &'static str {
        match self {
            FilterTree::Selector { .. } => "selector",
            FilterTree::And { .. } => "and",
            FilterTree::Or { .. } => "or",
            FilterTree::Not { .. } => "not",
            FilterTree::In { .. } => "in",
            FilterTree::Regex { .. } => "regex",
            FilterTree::Unknown => "unknown",
        }
    }
}
