//! Reference relational backend
//!
//! [`MemoryStore`] holds row-oriented tables and implements
//! [`DataSource`](crate::query::DataSource) by interpreting the relational
//! plans carried by a statement, so queries can run without an external
//! database.

pub mod aggregates;
pub mod engine;
pub mod interpreter;

pub use aggregates::{create_accumulator, Accumulator};
pub use engine::{MemoryConnection, MemoryStore, StorageError};
pub use interpreter::execute_plan;
