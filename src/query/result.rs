//! Reassembles raw result rows into timestamped response records

use serde::ser::{SerializeMap, SerializeStruct};
use serde::{Serialize, Serializer};
use std::collections::HashMap;

use super::aggregation::{coercion, Coercion};
use super::alias::AliasMaker;
use super::executor::RawResultSet;
use super::post_agg::{evaluate, EvalError};
use super::time::{bucket_count, bucket_start, TimeError};
use crate::data::format_timestamp;
use crate::model::AggregationQuery;

/// A typed value in a response event
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResponseValue {
    String(String),
    Integer(i64),
    Float(f64),
    Null,
}

/// One `{timestamp, event}` record; event fields keep their column order
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseRecord {
    pub timestamp: String,
    pub event: Vec<(String, ResponseValue)>,
}

impl ResponseRecord {
    pub fn get(&self, name: &str) -> Option<&ResponseValue> {
        self.event
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
    }
}

struct Event<'a>(&'a [(String, ResponseValue)]);

impl Serialize for Event<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, value) in self.0 {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

impl Serialize for ResponseRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut record = serializer.serialize_struct("ResponseRecord", 2)?;
        record.serialize_field("timestamp", &self.timestamp)?;
        record.serialize_field("event", &Event(&self.event))?;
        record.end()
    }
}

/// The response to one query, in row order
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ResponseRecords(pub Vec<ResponseRecord>);

impl ResponseRecords {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ResponseRecord> {
        self.0.iter()
    }

    /// Render as JSON. A rendering failure yields a diagnostic object instead
    /// of an error.
    pub fn to_json(&self) -> serde_json::Value {
        match serde_json::to_value(self) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("Failed to serialize response: {}", e);
                serde_json::json!({ "error": format!("response could not be serialized: {}", e) })
            }
        }
    }
}

/// Turns the rows of one execution into response records
pub struct ResultSetProcessor<'q> {
    query: &'q AggregationQuery,
    aliases: &'q AliasMaker,
}

impl<'q> ResultSetProcessor<'q> {
    pub fn new(query: &'q AggregationQuery, aliases: &'q AliasMaker) -> Self {
        Self { query, aliases }
    }

    /// Process every row in the order the store returned it
    pub fn process(&self, result: &RawResultSet) -> Result<ResponseRecords, ProcessError> {
        if result.rows.is_empty() {
            return Ok(ResponseRecords::default());
        }

        let dimensions = self.query.dimensions.len();
        let buckets = bucket_count(self.query.granularity.grain)?;
        let aggregates_from = dimensions + buckets;

        if result.columns.len() < aggregates_from {
            return Err(ProcessError::Layout {
                expected: aggregates_from,
                found: result.columns.len(),
            });
        }

        let names: Vec<&str> = result
            .columns
            .names()
            .iter()
            .map(|name| self.aliases.unapply(name))
            .collect();

        let mut records = Vec::with_capacity(result.row_count());
        for row in &result.rows {
            if row.len() != names.len() {
                return Err(ProcessError::Layout {
                    expected: names.len(),
                    found: row.len(),
                });
            }

            let bucket_values = row[dimensions..aggregates_from]
                .iter()
                .zip(&names[dimensions..aggregates_from])
                .map(|(cell, name)| parse_bucket(name, cell.as_deref()))
                .collect::<Result<Vec<_>, _>>()?;
            let timestamp = bucket_start(&self.query.granularity, &bucket_values)?;

            let mut event =
                Vec::with_capacity(row.len() - buckets + self.query.post_aggregations.len());
            let mut fields: HashMap<String, String> = HashMap::new();

            for (position, (cell, name)) in row.iter().zip(&names).enumerate() {
                if (dimensions..aggregates_from).contains(&position) {
                    continue;
                }
                let value = if position >= aggregates_from {
                    if let Some(raw) = cell {
                        fields.insert(name.to_string(), raw.clone());
                    }
                    self.aggregate_value(name, cell.as_deref())?
                } else {
                    cell.clone()
                        .map(ResponseValue::String)
                        .unwrap_or(ResponseValue::Null)
                };
                event.push((name.to_string(), value));
            }

            for post_agg in &self.query.post_aggregations {
                let value = {
                    let lookup = |field: &str| fields.get(field).map(String::as_str);
                    evaluate(post_agg, &lookup).map_err(|source| ProcessError::PostAggregation {
                        name: post_agg.name().to_string(),
                        source,
                    })?
                };
                fields.insert(post_agg.name().to_string(), value.to_string());
                event.push((post_agg.name().to_string(), ResponseValue::Float(value)));
            }

            records.push(ResponseRecord {
                timestamp: format_timestamp(&timestamp),
                event,
            });
        }

        tracing::debug!(records = records.len(), "Processed result rows");
        Ok(ResponseRecords(records))
    }

    fn aggregate_value(
        &self,
        name: &str,
        cell: Option<&str>,
    ) -> Result<ResponseValue, ProcessError> {
        let Some(raw) = cell else {
            return Ok(ResponseValue::Null);
        };
        let kind = self
            .query
            .aggregation(name)
            .map(|agg| agg.kind.as_str())
            .unwrap_or_default();

        match coercion(kind) {
            Coercion::Integer => parse_integer(raw)
                .map(ResponseValue::Integer)
                .ok_or_else(|| coercion_error(name, raw, "integer")),
            Coercion::Float => raw
                .trim()
                .parse::<f64>()
                .map(ResponseValue::Float)
                .map_err(|_| coercion_error(name, raw, "float")),
            Coercion::PassThrough => Ok(ResponseValue::String(raw.to_string())),
        }
    }
}

/// Integers may arrive in floating notation; the fraction is dropped. Values
/// outside the `i64` range are rejected rather than clamped.
fn parse_integer(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    raw.parse::<i64>().ok().or_else(|| {
        raw.parse::<f64>()
            .ok()
            .map(f64::trunc)
            // i64::MAX as f64 rounds up to 2^63, which is already out of range
            .filter(|f| *f >= i64::MIN as f64 && *f < i64::MAX as f64)
            .map(|f| f as i64)
    })
}

fn parse_bucket(name: &str, cell: Option<&str>) -> Result<i64, ProcessError> {
    cell.and_then(parse_integer)
        .ok_or_else(|| ProcessError::BucketValue {
            column: name.to_string(),
            value: cell.map(str::to_string),
        })
}

fn coercion_error(column: &str, value: &str, target: &'static str) -> ProcessError {
    ProcessError::Coercion {
        column: column.to_string(),
        value: value.to_string(),
        target,
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("Result has {found} columns, expected at least {expected}")]
    Layout { expected: usize, found: usize },

    #[error(transparent)]
    Bucket(#[from] TimeError),

    #[error("Bucket column '{column}' holds {value:?}")]
    BucketValue {
        column: String,
        value: Option<String>,
    },

    #[error("Cannot read '{value}' in column '{column}' as {target}")]
    Coercion {
        column: String,
        value: String,
        target: &'static str,
    },

    #[error("Post-aggregation '{name}' failed: {source}")]
    PostAggregation {
        name: String,
        #[source]
        source: EvalError,
    },
}
