use crate::data::{ColumnMeta, Table, TableConfig, TableError, Value};
use crate::query::executor::{
    ColumnIndex, Connection, DataSource, ExecuteError, RawResultSet,
};
use crate::query::Statement;
use dashmap::DashMap;
use rayon::prelude::*;
use serde::Deserialize;
use std::sync::Arc;

use super::interpreter::execute_plan;

/// In-memory relational store; cheap to clone, clones share tables
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    /// Tables indexed by name
    tables: Arc<DashMap<String, Arc<Table>>>,
}

/// `{"table": "...", "columns": [...], "rows": [{...}, ...]}`; declared columns
/// fix the catalog order, undeclared ones are appended as they are seen
#[derive(Debug, Deserialize)]
struct TableDocument {
    table: String,
    #[serde(default)]
    columns: Vec<ColumnMeta>,
    #[serde(default)]
    rows: Vec<serde_json::Value>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a table, creating it from `config` if it does not exist. An existing
    /// table keeps its schema.
    fn get_or_create_with(&self, config: TableConfig) -> Arc<Table> {
        let entry = self
            .tables
            .entry(config.name.clone())
            .or_insert_with(|| Arc::new(Table::new(config)));
        Arc::clone(entry.value())
    }

    pub fn get_table(&self, name: &str) -> Option<Arc<Table>> {
        self.tables.get(name).map(|t| Arc::clone(&t))
    }

    /// Insert JSON objects as rows. Rows that do not fit the schema are skipped;
    /// returns the number inserted.
    pub fn insert_json_rows(&self, table_name: &str, rows: &[serde_json::Value]) -> usize {
        let table = self.get_or_create_with(TableConfig::new(table_name));
        insert_into(&table, rows)
    }

    /// Load a `{"table", "columns", "rows"}` document; returns the table name and rows inserted
    pub fn load_json(&self, json: &str) -> Result<(String, usize), StorageError> {
        let document: TableDocument = serde_json::from_str(json)?;
        let config = document
            .columns
            .into_iter()
            .fold(TableConfig::new(&document.table), |config, column| {
                config.with_column(column.name, column.data_type)
            });
        let table = self.get_or_create_with(config);
        let inserted = insert_into(&table, &document.rows);
        tracing::info!(
            table = %document.table,
            rows = inserted,
            total = table.row_count(),
            "Loaded table"
        );
        Ok((document.table, inserted))
    }
}

/// Insert JSON objects as rows, skipping rows that do not fit the schema
fn insert_into(table: &Table, rows: &[serde_json::Value]) -> usize {
    let mut inserted = 0;

    for row in rows {
        let result = match row.as_object() {
            Some(object) => table.insert_json_row(object),
            None => Err(TableError::NotAnObject),
        };
        match result {
            Ok(()) => inserted += 1,
            Err(e) => {
                tracing::warn!("Failed to insert row into '{}': {}", table.config.name, e);
            }
        }
    }
    inserted
}

impl DataSource for MemoryStore {
    fn connect(&self) -> Result<Box<dyn Connection>, ExecuteError> {
        Ok(Box::new(MemoryConnection {
            store: self.clone(),
            open: true,
        }))
    }
}

/// Connection to a [`MemoryStore`]. The store has a single namespace, so
/// schema names are accepted but not used.
pub struct MemoryConnection {
    store: MemoryStore,
    open: bool,
}

impl MemoryConnection {
    fn ensure_open(&self) -> Result<(), ExecuteError> {
        if self.open {
            Ok(())
        } else {
            Err(ExecuteError::Closed)
        }
    }
}

impl Connection for MemoryConnection {
    fn table_columns(
        &mut self,
        _schema: &str,
        table: &str,
    ) -> Result<Vec<ColumnMeta>, ExecuteError> {
        self.ensure_open()?;
        self.store
            .get_table(table)
            .map(|t| t.columns())
            .ok_or_else(|| ExecuteError::TableNotFound(table.to_string()))
    }

    fn execute(&mut self, statement: &Statement) -> Result<RawResultSet, ExecuteError> {
        self.ensure_open()?;

        // Slices are independent; union order follows slice order
        let results = statement
            .plans
            .par_iter()
            .map(|plan| execute_plan(&self.store, plan))
            .collect::<Result<Vec<_>, _>>()?;

        let mut columns = None;
        let mut rows = Vec::new();
        for (names, slice_rows) in results {
            if columns.is_none() {
                columns = Some(names);
            }
            rows.extend(
                slice_rows
                    .into_iter()
                    .map(|row| row.iter().map(Value::to_cell).collect::<Vec<_>>()),
            );
        }

        Ok(RawResultSet::new(
            ColumnIndex::new(columns.unwrap_or_default())?,
            rows,
        ))
    }

    fn close(&mut self) {
        if self.open {
            tracing::trace!("Closing memory store connection");
        }
        self.open = false;
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Malformed table document: {0}")]
    Json(#[from] serde_json::Error),
}
