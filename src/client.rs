//! Query pipeline: resolve the table, translate, execute, reassemble.
//!
//! Every call builds its own plan and evaluator state; a client can be cloned
//! and shared across tasks.

use std::sync::Arc;
use tracing::warn;

use crate::config::ConverterConfig;
use crate::model::AggregationQuery;
use crate::query::executor::{execute_statement, resolve_table};
use crate::query::{
    plan_query, AliasMaker, CatalogMetadata, DataSource, MetadataAccessor, QueryError,
    ResponseRecords, ResultSetProcessor,
};

/// Answers aggregation queries from a SQL-backed store
#[derive(Clone)]
pub struct SqlBackedClient {
    source: Arc<dyn DataSource>,
    metadata: Arc<dyn MetadataAccessor>,
    config: ConverterConfig,
}

impl SqlBackedClient {
    pub fn new(
        source: Arc<dyn DataSource>,
        metadata: Arc<dyn MetadataAccessor>,
        config: ConverterConfig,
    ) -> Self {
        Self {
            source,
            metadata,
            config,
        }
    }

    /// Client that reads table layouts from the store's own catalog
    pub fn with_catalog(source: Arc<dyn DataSource>, config: ConverterConfig) -> Self {
        let metadata = Arc::new(CatalogMetadata::new(config.schema.clone()));
        Self::new(source, metadata, config)
    }

    pub fn config(&self) -> &ConverterConfig {
        &self.config
    }

    /// Run the whole pipeline on the calling thread
    pub fn run(&self, query: &AggregationQuery) -> Result<ResponseRecords, QueryError> {
        query.validate()?;

        let table = resolve_table(self.source.as_ref(), self.metadata.as_ref(), &query.table)
            .map_err(QueryError::Metadata)?;
        let statement = plan_query(query, &table, &self.config)?;

        let raw = execute_statement(self.source.as_ref(), &statement)?;

        let aliases = AliasMaker::new(self.config.alias_prefix.clone());
        let records = ResultSetProcessor::new(query, &aliases).process(&raw)?;
        Ok(records)
    }

    /// Run the pipeline on the blocking pool
    pub async fn execute(&self, query: AggregationQuery) -> Result<ResponseRecords, QueryError> {
        let client = self.clone();
        tokio::task::spawn_blocking(move || client.run(&query))
            .await
            .map_err(|e| QueryError::Worker(e.to_string()))?
    }

    /// Run the pipeline and report through exactly one of the callbacks
    pub async fn execute_with_callbacks<S, F>(
        &self,
        query: AggregationQuery,
        on_success: S,
        on_failure: F,
    ) where
        S: FnOnce(ResponseRecords),
        F: FnOnce(QueryError),
    {
        match self.execute(query).await {
            Ok(records) => on_success(records),
            Err(e) => {
                warn!(kind = ?e.kind(), "Query failed: {}", e);
                on_failure(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        Aggregation, ArithmeticFn, FilterTree, Grain, Granularity, HavingTree, Interval,
        PostAggregation,
    };
    use crate::query::executor::{Connection, ExecuteError, StaticMetadata};
    use crate::query::{ErrorKind, ResponseValue};
    use crate::storage::MemoryStore;
    use chrono::{TimeZone, Utc};
    use parking_lot::Mutex;

    fn interval(start_day: u32, start_hour: u32, end_day: u32, end_hour: u32) -> Interval {
        Interval::new(
            Utc.with_ymd_and_hms(2020, 1, start_day, start_hour, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2020, 1, end_day, end_hour, 0, 0).unwrap(),
        )
        .unwrap()
    }

    fn row(time: &str, country: &str, page: &str, clicks: i64, added: f64) -> serde_json::Value {
        serde_json::json!({
            "time": time,
            "country": country,
            "page": page,
            "clicks": clicks,
            "added": added,
        })
    }

    fn wiki_store() -> MemoryStore {
        let store = MemoryStore::new();
        let rows = vec![
            row("2020-01-01T00:10:00Z", "US", "Home", 30, 1.5),
            row("2020-01-01T01:20:00Z", "US", "About", 12, 2.0),
            row("2020-01-01T02:30:00Z", "FR", "Home", 7, 0.5),
            row("2020-01-02T05:00:00Z", "US", "Home", 3, 4.0),
            row("2020-01-02T06:00:00Z", "FR", "About", 5, 1.0),
            row("2020-01-02T07:00:00Z", "DE", "Home", 9, 3.0),
            row("2020-01-05T00:00:00Z", "US", "Home", 100, 9.0),
        ];
        store.insert_json_rows("wikiticker", &rows);
        store
    }

    fn client(store: MemoryStore) -> SqlBackedClient {
        SqlBackedClient::with_catalog(Arc::new(store), ConverterConfig::default())
    }

    #[test]
    fn test_group_by_end_to_end() {
        let query = AggregationQuery::group_by("wikiticker", Granularity::utc(Grain::Day))
            .with_dimension("country")
            .with_aggregation(Aggregation::new("longSum", "clicks", "clicks"))
            .with_interval(interval(1, 0, 3, 0));

        let records = client(wiki_store()).run(&query).unwrap();
        let json = records.to_json();
        let array = json.as_array().unwrap();
        assert!(array.contains(&serde_json::json!({
            "timestamp": "2020-01-01T00:00:00.000Z",
            "event": {"country": "US", "clicks": 42}
        })));
        assert_eq!(records.len(), 5);

        // Sorted by bucket then dimension
        let first = &records.0[0];
        assert_eq!(first.timestamp, "2020-01-01T00:00:00.000Z");
        assert_eq!(first.get("country"), Some(&ResponseValue::String("FR".into())));
        assert_eq!(first.get("clicks"), Some(&ResponseValue::Integer(7)));
    }

    #[test]
    fn test_timeseries_hourly_floats() {
        let query = AggregationQuery::timeseries("wikiticker", Granularity::utc(Grain::Hour))
            .with_aggregation(Aggregation::new("doubleSum", "added", "added"))
            .with_interval(interval(1, 0, 1, 3));

        let records = client(wiki_store()).run(&query).unwrap();
        assert_eq!(records.len(), 3);
        let timestamps: Vec<&str> = records.iter().map(|r| r.timestamp.as_str()).collect();
        assert_eq!(
            timestamps,
            vec![
                "2020-01-01T00:00:00.000Z",
                "2020-01-01T01:00:00.000Z",
                "2020-01-01T02:00:00.000Z",
            ]
        );
        assert_eq!(records.0[0].get("added"), Some(&ResponseValue::Float(1.5)));
        assert_eq!(records.0[1].get("added"), Some(&ResponseValue::Float(2.0)));
    }

    #[test]
    fn test_top_n_per_day() {
        let query = AggregationQuery::top_n(
            "wikiticker",
            Granularity::utc(Grain::Day),
            "country",
            "clicks",
            1,
        )
        .with_aggregation(Aggregation::new("longSum", "clicks", "clicks"))
        .with_interval(interval(1, 0, 3, 0));

        let records = client(wiki_store()).run(&query).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records.0[0].timestamp, "2020-01-01T00:00:00.000Z");
        assert_eq!(records.0[0].get("country"), Some(&ResponseValue::String("US".into())));
        assert_eq!(records.0[1].timestamp, "2020-01-02T00:00:00.000Z");
        assert_eq!(records.0[1].get("country"), Some(&ResponseValue::String("DE".into())));
        assert_eq!(records.0[1].get("clicks"), Some(&ResponseValue::Integer(9)));
    }

    #[test]
    fn test_having_keeps_greater_rows() {
        let store = MemoryStore::new();
        let rows = vec![
            serde_json::json!({"time": "2020-01-01T00:00:00Z", "k": "a", "m": 3}),
            serde_json::json!({"time": "2020-01-01T00:00:00Z", "k": "b", "m": 7}),
            serde_json::json!({"time": "2020-01-01T00:00:00Z", "k": "c", "m": 5}),
        ];
        store.insert_json_rows("t", &rows);

        let query = AggregationQuery::group_by("t", Granularity::utc(Grain::Day))
            .with_dimension("k")
            .with_aggregation(Aggregation::new("longSum", "m", "m"))
            .with_having(HavingTree::greater_than("m", 5.0))
            .with_interval(interval(1, 0, 2, 0));

        let records = client(store).run(&query).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records.0[0].get("k"), Some(&ResponseValue::String("b".into())));
        assert_eq!(records.0[0].get("m"), Some(&ResponseValue::Integer(7)));
    }

    #[test]
    fn test_filter_and_post_aggregation() {
        let query = AggregationQuery::timeseries("wikiticker", Granularity::utc(Grain::Day))
            .with_filter(FilterTree::selector("country", "FR"))
            .with_aggregation(Aggregation::new("longSum", "clicks", "clicks"))
            .with_aggregation(Aggregation::new("doubleMax", "peak", "added"))
            .with_post_aggregation(PostAggregation::arithmetic(
                "ratio",
                ArithmeticFn::Divide,
                vec![
                    PostAggregation::field_access("clicks"),
                    PostAggregation::constant("zero", 0.0),
                ],
            ))
            .with_interval(interval(1, 0, 3, 0));

        let records = client(wiki_store()).run(&query).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records.0[0].get("clicks"), Some(&ResponseValue::Integer(7)));
        assert_eq!(records.0[0].get("peak"), Some(&ResponseValue::Float(0.5)));
        assert_eq!(records.0[0].get("ratio"), Some(&ResponseValue::Float(0.0)));
        assert_eq!(records.0[1].get("clicks"), Some(&ResponseValue::Integer(5)));
    }

    #[test]
    fn test_static_metadata_maps_physical_table() {
        let store = wiki_store();
        let metadata = StaticMetadata::new("PUBLIC").with_table("wiki", "wikiticker", "time");
        let client = SqlBackedClient::new(
            Arc::new(store),
            Arc::new(metadata),
            ConverterConfig::default(),
        );
        let query = AggregationQuery::timeseries("wiki", Granularity::utc(Grain::Year))
            .with_aggregation(Aggregation::new("longSum", "clicks", "clicks"))
            .with_interval(interval(1, 0, 31, 0));

        let records = client.run(&query).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records.0[0].get("clicks"), Some(&ResponseValue::Integer(166)));
    }

    #[test]
    fn test_failures_are_classified() {
        let client = client(wiki_store());

        let missing_table = AggregationQuery::timeseries("nope", Granularity::utc(Grain::Day))
            .with_aggregation(Aggregation::new("longSum", "clicks", "clicks"))
            .with_interval(interval(1, 0, 2, 0));
        assert_eq!(
            client.run(&missing_table).unwrap_err().kind(),
            ErrorKind::TranslationFailure
        );

        let quarter = AggregationQuery::timeseries("wikiticker", Granularity::utc(Grain::Quarter))
            .with_aggregation(Aggregation::new("longSum", "clicks", "clicks"))
            .with_interval(interval(1, 0, 2, 0));
        assert_eq!(client.run(&quarter).unwrap_err().kind(), ErrorKind::UnsupportedQuery);

        let sketch = AggregationQuery::timeseries("wikiticker", Granularity::utc(Grain::Day))
            .with_aggregation(Aggregation::new("longSum", "clicks", "clicks"))
            .with_post_aggregation(PostAggregation::SketchEstimate { name: "s".into() })
            .with_interval(interval(1, 0, 2, 0));
        assert_eq!(client.run(&sketch).unwrap_err().kind(), ErrorKind::UnsupportedQuery);
    }

    #[test]
    fn test_from_json_end_to_end() {
        let query = AggregationQuery::from_json(
            r#"{
                "queryType": "groupBy",
                "dataSource": "wikiticker",
                "granularity": "day",
                "dimensions": ["country"],
                "filter": {"type": "selector", "dimension": "page", "value": "Home"},
                "aggregations": [{"type": "longSum", "name": "clicks", "fieldName": "clicks"}],
                "intervals": ["2020-01-02T00:00:00Z/2020-01-03T00:00:00Z"]
            }"#,
        )
        .unwrap();

        let records = client(wiki_store()).run(&query).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records.0[0].get("country"), Some(&ResponseValue::String("DE".into())));
        assert_eq!(records.0[1].get("country"), Some(&ResponseValue::String("US".into())));
    }

    #[test]
    fn test_json_output_follows_row_layout() {
        let store = MemoryStore::new();
        let rows = vec![
            serde_json::json!({"time": "2020-01-01T05:00:00Z", "level": "1", "clicks": 2}),
            serde_json::json!({"time": "2020-01-01T06:00:00Z", "level": "1", "clicks": 3}),
        ];
        store.insert_json_rows("t", &rows);

        let query = AggregationQuery::group_by("t", Granularity::utc(Grain::Day))
            .with_dimension("level")
            .with_aggregation(Aggregation::new("longSum", "clicks", "clicks"))
            .with_interval(interval(1, 0, 2, 0));

        let records = client(store).run(&query).unwrap();
        assert_eq!(
            records.to_json().to_string(),
            r#"[{"timestamp":"2020-01-01T00:00:00.000Z","event":{"level":"1","clicks":5}}]"#
        );
    }

    #[test]
    fn test_overflowing_long_sum_is_a_processing_failure() {
        let store = MemoryStore::new();
        let rows = vec![
            serde_json::json!({"time": "2020-01-01T00:00:00Z", "clicks": i64::MAX}),
            serde_json::json!({"time": "2020-01-01T01:00:00Z", "clicks": 5}),
        ];
        store.insert_json_rows("t", &rows);

        let query = AggregationQuery::timeseries("t", Granularity::utc(Grain::Day))
            .with_aggregation(Aggregation::new("longSum", "clicks", "clicks"))
            .with_interval(interval(1, 0, 2, 0));

        let err = client(store).run(&query).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ProcessingFailure);
    }

    #[test]
    fn test_zoned_days_end_to_end() {
        let query = AggregationQuery::timeseries(
            "wikiticker",
            Granularity::new(Grain::Day, chrono_tz::America::New_York),
        )
        .with_aggregation(Aggregation::new("longSum", "clicks", "clicks"))
        .with_interval(interval(1, 5, 3, 5));

        let records = client(wiki_store()).run(&query).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records.0[0].timestamp, "2020-01-02T05:00:00.000Z");
        assert_eq!(records.0[0].get("clicks"), Some(&ResponseValue::Integer(17)));
    }

    /// Source whose statements always fail; counts closed connections
    struct RejectingSource {
        closed: Arc<Mutex<usize>>,
        store: MemoryStore,
    }

    struct RejectingConnection {
        closed: Arc<Mutex<usize>>,
        inner: Box<dyn Connection>,
    }

    impl DataSource for RejectingSource {
        fn connect(&self) -> Result<Box<dyn Connection>, ExecuteError> {
            Ok(Box::new(RejectingConnection {
                closed: Arc::clone(&self.closed),
                inner: self.store.connect()?,
            }))
        }
    }

    impl Connection for RejectingConnection {
        fn table_columns(
            &mut self,
            schema: &str,
            table: &str,
        ) -> Result<Vec<crate::data::ColumnMeta>, ExecuteError> {
            self.inner.table_columns(schema, table)
        }

        fn execute(
            &mut self,
            _statement: &crate::query::Statement,
        ) -> Result<crate::query::RawResultSet, ExecuteError> {
            Err(ExecuteError::Rejected("store unavailable".into()))
        }

        fn close(&mut self) {
            *self.closed.lock() += 1;
        }
    }

    #[tokio::test]
    async fn test_execute_async() {
        let query = AggregationQuery::timeseries("wikiticker", Granularity::utc(Grain::Day))
            .with_aggregation(Aggregation::new("longSum", "clicks", "clicks"))
            .with_interval(interval(1, 0, 3, 0));

        let records = client(wiki_store()).execute(query).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records.0[0].get("clicks"), Some(&ResponseValue::Integer(49)));
    }

    #[test]
    fn test_execute_on_current_thread_runtime() {
        let query = AggregationQuery::timeseries("wikiticker", Granularity::utc(Grain::Month))
            .with_aggregation(Aggregation::new("longMin", "fewest", "clicks"))
            .with_aggregation(Aggregation::new("longMax", "most", "clicks"))
            .with_interval(interval(1, 0, 31, 0));

        let records = tokio_test::block_on(client(wiki_store()).execute(query)).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records.0[0].timestamp, "2020-01-01T00:00:00.000Z");
        assert_eq!(records.0[0].get("fewest"), Some(&ResponseValue::Integer(3)));
        assert_eq!(records.0[0].get("most"), Some(&ResponseValue::Integer(100)));
    }

    #[tokio::test]
    async fn test_callbacks_fire_exactly_once() {
        let query = AggregationQuery::timeseries("wikiticker", Granularity::utc(Grain::Day))
            .with_aggregation(Aggregation::new("longSum", "clicks", "clicks"))
            .with_interval(interval(1, 0, 3, 0));

        let outcomes = Arc::new(Mutex::new(Vec::new()));
        let (ok, err) = (Arc::clone(&outcomes), Arc::clone(&outcomes));
        client(wiki_store())
            .execute_with_callbacks(
                query.clone(),
                move |records| ok.lock().push(format!("ok:{}", records.len())),
                move |e| err.lock().push(format!("err:{:?}", e.kind())),
            )
            .await;
        assert_eq!(*outcomes.lock(), vec!["ok:2".to_string()]);

        let closed = Arc::new(Mutex::new(0));
        let source = RejectingSource {
            closed: Arc::clone(&closed),
            store: wiki_store(),
        };
        let failing = SqlBackedClient::with_catalog(Arc::new(source), ConverterConfig::default());

        let outcomes = Arc::new(Mutex::new(Vec::new()));
        let (ok, err) = (Arc::clone(&outcomes), Arc::clone(&outcomes));
        failing
            .execute_with_callbacks(
                query,
                move |records| ok.lock().push(format!("ok:{}", records.len())),
                move |e| err.lock().push(format!("err:{:?}", e.kind())),
            )
            .await;
        assert_eq!(*outcomes.lock(), vec!["err:ExecutionFailure".to_string()]);
        // Metadata and execution connections were both released
        assert_eq!(*closed.lock(), 2);
    }
}
