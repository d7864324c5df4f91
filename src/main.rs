//! db-template - Main entry point.
//!
//! Runs one parameterized statement against a database through the
//! template and prints the outcome as JSON on stdout.

use clap::Parser;
use db_template::config::{Command, Config};
use db_template::db::{JdbcTemplate, Row, SqlValue, SqlxDataSource};
use db_template::error::SqlError;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    // Logs go to stderr so stdout carries only the result.
    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

/// Map a row to a JSON object keyed by column name.
fn row_to_json(row: &dyn Row) -> Result<Value, SqlError> {
    let mut object = Map::new();
    for (index, name) in row.column_names().into_iter().enumerate() {
        let value = serde_json::to_value(row.value_at(index)?)
            .map_err(|e| SqlError::driver(format!("Failed to encode column {name}: {e}")))?;
        object.insert(name, value);
    }
    Ok(Value::Object(object))
}

fn parse_params(params: &[String]) -> Vec<SqlValue> {
    params.iter().map(|p| SqlValue::parse_arg(p)).collect()
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse configuration from command line and environment
    let config = Config::parse();

    init_tracing(&config);

    let source_config = config.data_source()?;
    info!(
        db_type = %source_config.db_type,
        database = %source_config.masked_connection_string(),
        "Starting db-template v{}",
        env!("CARGO_PKG_VERSION")
    );

    let mut data_source = SqlxDataSource::new(source_config.connection_string)?;
    if let Some(limit) = source_config.connect_timeout {
        data_source = data_source.with_connect_timeout(limit);
    }
    let template = JdbcTemplate::new(Arc::new(data_source));

    let result = match &config.command {
        Command::Execute { sql, params } => template
            .execute_update(sql, &parse_params(params))
            .map(|rows_affected| json!({ "rows_affected": rows_affected })),
        Command::QueryOne { sql, params } => template
            .execute_query_single(sql, row_to_json, &parse_params(params))
            .map(|row| row.unwrap_or(Value::Null)),
        Command::Query { sql, params } => template
            .execute_query_multi(sql, row_to_json, &parse_params(params))
            .map(Value::Array),
    };

    match result {
        Ok(output) => {
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }
        Err(e) => {
            error!(operation = %e.operation(), error = %e, "Statement failed");
            Err(e.into())
        }
    }
}
