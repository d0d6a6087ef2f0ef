use chrono::{DateTime, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

/// Cell format used when a timestamp is reported as a string cell
const TIMESTAMP_CELL_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Core value types held by the reference store
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int64(i64),
    Float64(f64),
    String(String),
    /// Epoch milliseconds, UTC
    Timestamp(i64),
}

impl Value {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float64(v) => Some(*v),
            Value::Int64(v) => Some(*v as f64),
            Value::Timestamp(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Build a timestamp value from a UTC instant
    pub fn timestamp(instant: DateTime<Utc>) -> Self {
        Value::Timestamp(instant.timestamp_millis())
    }

    /// The UTC instant of a timestamp value
    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Timestamp(ms) => Utc.timestamp_millis_opt(*ms).single(),
            _ => None,
        }
    }

    /// Render the value the way a result set reports it: every cell is a string,
    /// SQL NULL is absent.
    pub fn to_cell(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Timestamp(_) => self
                .as_datetime()
                .map(|dt| dt.format(TIMESTAMP_CELL_FORMAT).to_string()),
            other => Some(other.to_string()),
        }
    }

    /// Infer a value from a JSON scalar. RFC 3339 strings become timestamps.
    pub fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int64(i)
                } else if let Some(f) = n.as_f64() {
                    Value::Float64(f)
                } else {
                    Value::Null
                }
            }
            serde_json::Value::String(s) => match parse_timestamp(s) {
                Some(instant) => Value::timestamp(instant),
                None => Value::String(s.clone()),
            },
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => Value::Null,
        }
    }
}

/// Parse an RFC 3339 timestamp, or a zone-less ISO timestamp read as UTC
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Format a UTC instant as `2020-01-01T00:00:00.000Z`
pub fn format_timestamp(instant: &DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int64(a), Value::Int64(b)) => a == b,
            (Value::Float64(a), Value::Float64(b)) => a.to_bits() == b.to_bits(),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Timestamp(a), Value::Timestamp(b)) => a == b,
            // Cross-type numeric comparisons
            (Value::Int64(a), Value::Float64(b)) => (*a as f64).to_bits() == b.to_bits(),
            (Value::Float64(a), Value::Int64(b)) => a.to_bits() == (*b as f64).to_bits(),
            (Value::Int64(a), Value::Timestamp(b)) => a == b,
            (Value::Timestamp(a), Value::Int64(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    /// Numbers that compare equal across `Int64`, `Float64` and `Timestamp` must
    /// hash alike, so every numeric is hashed through its `f64` bits.
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Value::Null => 0u8.hash(state),
            Value::Bool(b) => {
                1u8.hash(state);
                b.hash(state);
            }
            Value::Int64(i) | Value::Timestamp(i) => {
                2u8.hash(state);
                (*i as f64).to_bits().hash(state);
            }
            Value::Float64(f) => {
                2u8.hash(state);
                f.to_bits().hash(state);
            }
            Value::String(s) => {
                3u8.hash(state);
                s.hash(state);
            }
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    /// Null sorts before everything else
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Null, _) => Ordering::Less,
            (_, Value::Null) => Ordering::Greater,
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Int64(a), Value::Int64(b)) => a.cmp(b),
            (Value::Float64(a), Value::Float64(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Timestamp(a), Value::Timestamp(b)) => a.cmp(b),
            (Value::Int64(a), Value::Float64(b)) => {
                (*a as f64).partial_cmp(b).unwrap_or(Ordering::Equal)
            }
            (Value::Float64(a), Value::Int64(b)) => {
                a.partial_cmp(&(*b as f64)).unwrap_or(Ordering::Equal)
            }
            (Value::Int64(a), Value::Timestamp(b)) => a.cmp(b),
            (Value::Timestamp(a), Value::Int64(b)) => a.cmp(b),
            // Different types: order by type discriminant
            _ => self.type_order().cmp(&other.type_order()),
        }
    }
}

impl Value {
    /// Get a numeric order for type comparison
    fn type_order(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Int64(_) => 2,
            Value::Float64(_) => 3,
            Value::String(_) => 4,
            Value::Timestamp(_) => 5,
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int64(i) => write!(f, "{}", i),
            Value::Float64(v) => write!(f, "{}", v),
            Value::String(s) => write!(f, "{}", s),
            Value::Timestamp(t) => write!(f, "{}", t),
        }
    }
}

/// Column data type for schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    Null,
    Bool,
    Int64,
    Float64,
    String,
    Timestamp,
}

impl DataType {
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Null => DataType::Null,
            Value::Bool(_) => DataType::Bool,
            Value::Int64(_) => DataType::Int64,
            Value::Float64(_) => DataType::Float64,
            Value::String(_) => DataType::String,
            Value::Timestamp(_) => DataType::Timestamp,
        }
    }

    /// Determine the best type when merging two types
    pub fn merge(&self, other: &DataType) -> DataType {
        if self == other {
            return *self;
        }
        match (self, other) {
            (DataType::Null, t) | (t, DataType::Null) => *t,
            (DataType::Int64, DataType::Float64) | (DataType::Float64, DataType::Int64) => {
                DataType::Float64
            }
            // Default to string for incompatible types
            _ => DataType::String,
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataType::Null => write!(f, "NULL"),
            DataType::Bool => write!(f, "BOOLEAN"),
            DataType::Int64 => write!(f, "BIGINT"),
            DataType::Float64 => write!(f, "DOUBLE"),
            DataType::String => write!(f, "VARCHAR"),
            DataType::Timestamp => write!(f, "TIMESTAMP"),
        }
    }
}
