use super::value::{DataType, Value};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Name and type of one column, as reported by a catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMeta {
    pub name: String,
    pub data_type: DataType,
}

impl ColumnMeta {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

/// Configuration for a table
#[derive(Debug, Clone, Default)]
pub struct TableConfig {
    /// Table name
    pub name: String,
    /// Columns declared up front, in catalog order
    pub columns: Vec<ColumnMeta>,
}

impl TableConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_column(mut self, name: impl Into<String>, data_type: DataType) -> Self {
        self.columns.push(ColumnMeta::new(name, data_type));
        self
    }
}

/// A row-oriented table. Columns keep the order in which they were declared or first seen.
#[derive(Debug)]
pub struct Table {
    /// Table configuration
    pub config: TableConfig,
    /// Ordered schema
    columns: RwLock<Vec<ColumnMeta>>,
    /// Rows, positionally aligned with `columns`
    rows: RwLock<Vec<Vec<Value>>>,
}

impl Table {
    pub fn new(config: TableConfig) -> Self {
        let columns = config.columns.clone();
        Self {
            config,
            columns: RwLock::new(columns),
            rows: RwLock::new(Vec::new()),
        }
    }

    /// Insert a row. Unknown columns are appended to the schema (sorted by name for a stable
    /// layout) and backfilled with nulls; missing columns are stored as null.
    pub fn insert_row(&self, row: HashMap<String, Value>) -> Result<(), TableError> {
        let mut columns = self.columns.write();
        let mut rows = self.rows.write();

        for column in columns.iter() {
            let Some(value) = row.get(&column.name) else {
                continue;
            };
            let found = DataType::from_value(value);
            if !compatible(column.data_type, found) {
                return Err(TableError::TypeMismatch {
                    column: column.name.clone(),
                    expected: column.data_type,
                    found,
                });
            }
        }

        let mut new_names: Vec<&String> = row
            .keys()
            .filter(|name| !columns.iter().any(|c| &c.name == *name))
            .collect();
        new_names.sort();
        for name in new_names {
            let data_type = DataType::from_value(&row[name]);
            columns.push(ColumnMeta::new(name.clone(), data_type));
            for existing in rows.iter_mut() {
                existing.push(Value::Null);
            }
        }

        let mut values = Vec::with_capacity(columns.len());
        for column in columns.iter_mut() {
            let value = row.get(&column.name).cloned().unwrap_or(Value::Null);
            column.data_type = column.data_type.merge(&DataType::from_value(&value));
            values.push(value);
        }

        rows.push(values);
        Ok(())
    }

    /// Insert a JSON object as a row
    pub fn insert_json_row(
        &self,
        row: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<(), TableError> {
        let row = row
            .iter()
            .map(|(name, value)| (name.clone(), Value::from_json(value)))
            .collect();
        self.insert_row(row)
    }

    /// Ordered schema
    pub fn columns(&self) -> Vec<ColumnMeta> {
        self.columns.read().clone()
    }

    /// Run a closure over the schema and rows under a single read lock
    pub fn with_rows<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&[ColumnMeta], &[Vec<Value>]) -> R,
    {
        let columns = self.columns.read();
        let rows = self.rows.read();
        f(&columns, &rows)
    }

    /// Total row count
    pub fn row_count(&self) -> usize {
        self.rows.read().len()
    }
}

fn compatible(column: DataType, value: DataType) -> bool {
    matches!(
        (column, value),
        (DataType::Null, _)
            | (_, DataType::Null)
            | (DataType::Int64 | DataType::Float64, DataType::Int64 | DataType::Float64)
    ) || column == value
}

#[derive(Debug, thiserror::Error)]
pub enum TableError {
    #[error("Column '{column}' holds {expected} values, got {found}")]
    TypeMismatch {
        column: String,
        expected: DataType,
        found: DataType,
    },

    #[error("Row is not a JSON object")]
    NotAnObject,
}
