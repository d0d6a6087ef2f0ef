pub mod table;
pub mod value;

pub use table::{ColumnMeta, Table, TableConfig, TableError};
pub use value::{format_timestamp, parse_timestamp, DataType, Value};
