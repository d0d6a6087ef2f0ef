//! Translation of aggregation queries into relational plans and SQL, statement
//! execution, and reassembly of result rows into response records.

pub mod aggregation;
pub mod alias;
pub mod executor;
pub mod having;
pub mod plan;
pub mod planner;
pub mod post_agg;
pub mod predicate;
pub mod render;
pub mod result;
pub mod time;

pub use alias::AliasMaker;
pub use executor::{
    execute_statement, resolve_table, CatalogMetadata, ColumnIndex, Connection, DataSource,
    ExecuteError, MetadataAccessor, RawResultSet, ScopedConnection, StaticMetadata, TableSchema,
};
pub use plan::{AggCall, Expr, RelationalPlan, Stage};
pub use planner::{plan_query, PlanError, Statement};
pub use post_agg::EvalError;
pub use result::{ProcessError, ResponseRecord, ResponseRecords, ResponseValue, ResultSetProcessor};
pub use time::TimeError;

use crate::model::ModelError;

/// Failure category reported to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Query kind, granularity, filter, aggregation or post-aggregation the
    /// translator does not handle
    UnsupportedQuery,
    /// Plan construction failed, including table metadata lookups
    TranslationFailure,
    /// The store rejected or failed the statement
    ExecutionFailure,
    /// Result rows could not be turned into records
    ProcessingFailure,
    /// The request could not be decoded
    InvalidRequest,
}

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("Invalid request: {0}")]
    Request(#[from] ModelError),

    #[error("Metadata lookup failed: {0}")]
    Metadata(#[source] ExecuteError),

    #[error("Plan error: {0}")]
    Plan(#[from] PlanError),

    #[error("Execute error: {0}")]
    Execute(#[from] ExecuteError),

    #[error("Result processing error: {0}")]
    Process(#[from] ProcessError),

    #[error("Query worker failed: {0}")]
    Worker(String),
}

impl QueryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            QueryError::Request(ModelError::UnsupportedQueryType(_)) => ErrorKind::UnsupportedQuery,
            QueryError::Request(_) => ErrorKind::InvalidRequest,
            QueryError::Metadata(_) => ErrorKind::TranslationFailure,
            QueryError::Plan(e) if e.is_unsupported() => ErrorKind::UnsupportedQuery,
            QueryError::Plan(_) => ErrorKind::TranslationFailure,
            QueryError::Execute(_) | QueryError::Worker(_) => ErrorKind::ExecutionFailure,
            QueryError::Process(_) => ErrorKind::ProcessingFailure,
        }
    }
}
