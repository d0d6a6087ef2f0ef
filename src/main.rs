//! Quarry command line
//!
//! Run with: quarry <rows.json> <query.json>
//!
//! `rows.json` holds `{"table": "...", "columns": [...], "rows": [{...}, ...]}`
//! and is loaded into the in-memory store. `columns` is optional and fixes the
//! catalog order, e.g. `{"name": "time", "data_type": "Timestamp"}`.
//! `query.json` is an aggregation query in the analytics protocol's JSON form.
//! The response records are printed to stdout.
//!
//! Environment variables:
//! - QUARRY_SCHEMA: Schema named in generated SQL (default: PUBLIC)
//! - QUARRY_ALIAS_PREFIX: Prefix for aliased output columns (default: __)
//! - QUARRY_VALIDATE_SQL: Parse generated SQL before running it (default: true)
//! - RUST_LOG: Log level (default: info)

use quarry::{AggregationQuery, ConverterConfig, MemoryStore, SqlBackedClient};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "quarry=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args: Vec<String> = std::env::args().collect();
    let (rows_path, query_path) = match args.as_slice() {
        [_, rows, query] => (rows, query),
        _ => {
            eprintln!("usage: quarry <rows.json> <query.json>");
            std::process::exit(2);
        }
    };

    let config = ConverterConfig::from_env();
    tracing::info!("Quarry configuration:");
    tracing::info!("  Schema: {}", config.schema);
    tracing::info!("  Alias prefix: {}", config.alias_prefix);
    tracing::info!("  Validate SQL: {}", config.validate_sql);

    let store = MemoryStore::new();
    let (table, rows) = store.load_json(&std::fs::read_to_string(rows_path)?)?;
    tracing::info!("Loaded {} rows into '{}'", rows, table);

    let query = AggregationQuery::from_json(&std::fs::read_to_string(query_path)?)?;
    let client = SqlBackedClient::with_catalog(Arc::new(store), config);

    match client.execute(query).await {
        Ok(records) => {
            println!("{}", serde_json::to_string_pretty(&records.to_json())?);
            Ok(())
        }
        Err(e) => {
            tracing::error!(kind = ?e.kind(), "Query failed: {}", e);
            Err(e.into())
        }
    }
}
