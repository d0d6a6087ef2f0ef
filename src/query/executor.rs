//! Statement execution against a data source
//!
//! Connections are acquired per logical need (a metadata lookup, a statement
//! run) through [`ScopedConnection`], which closes them on every exit path.

use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use tracing::debug;

use super::planner::Statement;
use crate::data::{ColumnMeta, DataType};

/// An open session with a backing store
pub trait Connection: Send {
    /// Columns of a table in catalog order
    fn table_columns(&mut self, schema: &str, table: &str)
        -> Result<Vec<ColumnMeta>, ExecuteError>;

    /// Run every slice of a statement and return the combined rows
    fn execute(&mut self, statement: &Statement) -> Result<RawResultSet, ExecuteError>;

    fn close(&mut self) {}
}

/// Hands out connections to a backing store
pub trait DataSource: Send + Sync {
    fn connect(&self) -> Result<Box<dyn Connection>, ExecuteError>;
}

/// A connection that is closed when dropped
pub struct ScopedConnection {
    conn: Box<dyn Connection>,
}

impl ScopedConnection {
    pub fn open(source: &dyn DataSource) -> Result<Self, ExecuteError> {
        Ok(Self {
            conn: source.connect()?,
        })
    }
}

impl Deref for ScopedConnection {
    type Target = dyn Connection;

    fn deref(&self) -> &Self::Target {
        self.conn.as_ref()
    }
}

impl DerefMut for ScopedConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn.as_mut()
    }
}

impl Drop for ScopedConnection {
    fn drop(&mut self) {
        self.conn.close();
    }
}

/// Bijection between result column positions and names
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnIndex {
    names: Vec<String>,
    positions: HashMap<String, usize>,
}

impl ColumnIndex {
    pub fn new(names: Vec<String>) -> Result<Self, ExecuteError> {
        let mut positions = HashMap::with_capacity(names.len());
        for (idx, name) in names.iter().enumerate() {
            if positions.insert(name.clone(), idx).is_some() {
                return Err(ExecuteError::DuplicateColumn(name.clone()));
            }
        }
        Ok(Self { names, positions })
    }

    pub fn name(&self, position: usize) -> Option<&str> {
        self.names.get(position).map(|s| s.as_str())
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.positions.get(name).copied()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Rows as the store reported them: every cell a string, NULL absent
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawResultSet {
    pub columns: ColumnIndex,
    pub rows: Vec<Vec<Option<String>>>,
}

impl RawResultSet {
    pub fn new(columns: ColumnIndex, rows: Vec<Vec<Option<String>>>) -> Self {
        Self { columns, rows }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// Physical location and layout of a queried table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub schema: String,
    pub physical_name: String,
    pub timestamp_column: String,
    pub columns: Vec<ColumnMeta>,
}

impl TableSchema {
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }
}

/// Resolves a logical table name to its physical table and timestamp column
pub trait MetadataAccessor: Send + Sync {
    fn resolve(&self, conn: &mut dyn Connection, table: &str)
        -> Result<TableSchema, ExecuteError>;
}

/// Reads everything from the store's catalog: the physical name is the
/// logical name and the timestamp column is the first TIMESTAMP column
#[derive(Debug, Clone)]
pub struct CatalogMetadata {
    schema: String,
}

impl CatalogMetadata {
    pub fn new(schema: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
        }
    }
}

impl MetadataAccessor for CatalogMetadata {
    fn resolve(
        &self,
        conn: &mut dyn Connection,
        table: &str,
    ) -> Result<TableSchema, ExecuteError> {
        let columns = conn.table_columns(&self.schema, table)?;
        let timestamp_column = columns
            .iter()
            .find(|c| c.data_type == DataType::Timestamp)
            .map(|c| c.name.clone())
            .ok_or_else(|| ExecuteError::NoTimestampColumn(table.to_string()))?;

        Ok(TableSchema {
            schema: self.schema.clone(),
            physical_name: table.to_string(),
            timestamp_column,
            columns,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableMapping {
    pub physical_name: String,
    pub timestamp_column: String,
}

/// Explicit logical-to-physical table mappings; columns still come from the catalog
#[derive(Debug, Clone)]
pub struct StaticMetadata {
    schema: String,
    tables: HashMap<String, TableMapping>,
}

impl StaticMetadata {
    pub fn new(schema: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            tables: HashMap::new(),
        }
    }

    pub fn with_table(
        mut self,
        logical: impl Into<String>,
        physical: impl Into<String>,
        timestamp_column: impl Into<String>,
    ) -> Self {
        self.tables.insert(
            logical.into(),
            TableMapping {
                physical_name: physical.into(),
                timestamp_column: timestamp_column.into(),
            },
        );
        self
    }
}

impl MetadataAccessor for StaticMetadata {
    fn resolve(
        &self,
        conn: &mut dyn Connection,
        table: &str,
    ) -> Result<TableSchema, ExecuteError> {
        let mapping = self
            .tables
            .get(table)
            .ok_or_else(|| ExecuteError::TableNotFound(table.to_string()))?;
        let columns = conn.table_columns(&self.schema, &mapping.physical_name)?;
        if !columns.iter().any(|c| c.name == mapping.timestamp_column) {
            return Err(ExecuteError::NoTimestampColumn(mapping.physical_name.clone()));
        }

        Ok(TableSchema {
            schema: self.schema.clone(),
            physical_name: mapping.physical_name.clone(),
            timestamp_column: mapping.timestamp_column.clone(),
            columns,
        })
    }
}

/// Look up a table's schema on a connection of its own
pub fn resolve_table(
    source: &dyn DataSource,
    metadata: &dyn MetadataAccessor,
    table: &str,
) -> Result<TableSchema, ExecuteError> {
    let mut conn = ScopedConnection::open(source)?;
    metadata.resolve(&mut *conn, table)
}

/// Run a translated statement on a connection of its own
pub fn execute_statement(
    source: &dyn DataSource,
    statement: &Statement,
) -> Result<RawResultSet, ExecuteError> {
    if statement.is_empty() {
        return Ok(RawResultSet::default());
    }

    let start = std::time::Instant::now();
    let mut conn = ScopedConnection::open(source)?;
    let result = conn.execute(statement)?;

    debug!(
        rows = result.row_count(),
        slices = statement.plans.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Statement executed"
    );
    Ok(result)
}

#[derive(Debug, thiserror::Error)]
pub enum ExecuteError {
    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Connection is closed")]
    Closed,

    #[error("Table '{0}' not found")]
    TableNotFound(String),

    #[error("Table '{0}' has no timestamp column")]
    NoTimestampColumn(String),

    #[error("Column '{0}' not found")]
    ColumnNotFound(String),

    #[error("Duplicate result column: {0}")]
    DuplicateColumn(String),

    #[error("Statement rejected: {0}")]
    Rejected(String),
}
