//! Immutable value types describing an aggregation query in the analytics protocol.

pub mod filter;
pub mod granularity;
pub mod having;
pub mod interval;
pub mod post_agg;
pub mod query;

pub use filter::FilterTree;
pub use granularity::{Grain, Granularity};
pub use having::{HavingOp, HavingTree};
pub use interval::Interval;
pub use post_agg::{ArithmeticFn, PostAggregation};
pub use query::{
    AggregationQuery, Aggregation, LimitSpec, OrderByColumn, QueryKind, SortDirection,
};

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("Malformed query JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported query type: {0}")]
    UnsupportedQueryType(String),

    #[error("Missing field: {0}")]
    MissingField(&'static str),

    #[error("Invalid interval: {0}")]
    InvalidInterval(String),

    #[error("Invalid granularity: {0}")]
    InvalidGranularity(String),

    #[error("Unknown time zone: {0}")]
    InvalidTimeZone(String),

    #[error("Duplicate aggregation name: {0}")]
    DuplicateAggregation(String),
}
