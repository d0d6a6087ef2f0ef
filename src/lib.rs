//! Quarry: aggregation queries over a relational store
//!
//! Quarry accepts time-series, group-by and top-N aggregation queries in the
//! analytics protocol's JSON form, translates each into relational plans and
//! SQL text, runs them against a backing store, and reshapes the rows into
//! `{timestamp, event}` records.
//!
//! # Features
//!
//! - **Granularity buckets**: minute through year, aligned in any IANA time zone
//! - **Top-N slicing**: one statement per time bucket, combined with UNION ALL
//! - **Filters and having clauses**: selector, in, and, or, not
//! - **Post-aggregations**: constants, field access and arithmetic
//! - **Typed results**: `long`/`double` aggregations come back as integers/floats
//! - **Reference backend**: an in-memory store that executes the plans directly
//!
//! # Example
//!
//! ```no_run
//! use quarry::{AggregationQuery, ConverterConfig, MemoryStore, SqlBackedClient};
//! use std::sync::Arc;
//!
//! let store = MemoryStore::new();
//! store
//!     .load_json(r#"{"table": "wiki", "rows": [{"ts": "2020-01-01T00:00:00Z", "clicks": 3}]}"#)
//!     .unwrap();
//!
//! let query = AggregationQuery::from_json(
//!     r#"{"queryType": "timeseries", "dataSource": "wiki", "granularity": "day",
//!         "aggregations": [{"type": "longSum", "name": "clicks", "fieldName": "clicks"}],
//!         "intervals": ["2020-01-01T00:00:00Z/2020-01-02T00:00:00Z"]}"#,
//! )
//! .unwrap();
//!
//! let client = SqlBackedClient::with_catalog(Arc::new(store), ConverterConfig::default());
//! let records = client.run(&query).unwrap();
//! println!("{}", records.to_json());
//! ```

pub mod client;
pub mod config;
pub mod data;
pub mod model;
pub mod query;
pub mod storage;

// Re-export commonly used types
pub use client::SqlBackedClient;
pub use config::ConverterConfig;
pub use data::{DataType, Table, TableConfig, Value};
pub use model::{AggregationQuery, ModelError};
pub use query::{ErrorKind, QueryError, ResponseRecord, ResponseRecords, ResponseValue};
pub use storage::{MemoryStore, StorageError};
