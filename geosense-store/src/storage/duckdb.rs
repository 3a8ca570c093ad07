//! DuckDB storage backend implementation.
//!
//! This module keeps measurements in a single embedded DuckDB table. The
//! implementation supports:
//! - In-memory and persistent storage options
//! - Transactional single and batch inserts
//! - Filtered reads streamed straight from the engine cursor
//! - Latest-per-station aggregation pushed down as a windowed query
//!
//! # Configuration
//!
//! ```toml
//! [engine]
//! engine = "duckdb"
//! connection = "data/measurements.db"  # Use ":memory:" for in-memory
//! options = { threads = "4" }          # Optional: DuckDB worker threads
//! ```
//!
//! Writes go through one connection guarded by an async mutex and run on the
//! blocking pool. Every read clones that connection and drains its cursor on a
//! blocking worker, handing rows over a bounded channel, so readers neither
//! block writers nor each other.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::error::StoreError;
use crate::measurement::{
    from_storage_micros, to_storage_micros, LatestStationMeta, Measurement, MeasurementValue,
    MeasurementsQuery,
};
use crate::query::{build_select_query, Operand, Predicate};
use crate::storage::{MeasurementStore, MeasurementStream, StationStream};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use duckdb::types::{ToSqlOutput, Value};
use duckdb::{params, Config, Connection, Row, ToSql};
use futures::stream::{BoxStream, StreamExt};
use tokio::sync::{mpsc, Mutex};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info};

const TABLE_NAME: &str = "measurements";

const MEASUREMENT_COLUMNS: [&str; 10] = [
    "key",
    "measurement_name",
    "unit",
    "value_int",
    "value_float",
    "timestamp",
    "receipt_time",
    "latitude",
    "longitude",
    "hardware",
];

/// Rows buffered ahead of a slow consumer
const STREAM_BUFFER: usize = 256;

const SCHEMA_SQL: &str = r#"
    CREATE SEQUENCE IF NOT EXISTS measurements_id_seq START 1;

    CREATE TABLE IF NOT EXISTS measurements (
        id BIGINT PRIMARY KEY DEFAULT nextval('measurements_id_seq'),
        key VARCHAR NOT NULL CHECK (regexp_matches(key, '[^ \t\n\f\r]')),
        measurement_name VARCHAR NOT NULL,
        unit VARCHAR NOT NULL,
        value_int BIGINT,
        value_float DOUBLE,
        timestamp BIGINT,
        receipt_time BIGINT NOT NULL,
        latitude DOUBLE,
        longitude DOUBLE,
        hardware VARCHAR,
        CHECK ((value_int IS NULL) <> (value_float IS NULL))
    );

    CREATE INDEX IF NOT EXISTS idx_measurements_timestamp ON measurements(timestamp);
"#;

const INSERT_SQL: &str = r#"
    INSERT INTO measurements (
        key, measurement_name, unit, value_int, value_float,
        timestamp, receipt_time, latitude, longitude, hardware
    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
"#;

// Ties on the timestamp go to the last inserted row; untimed rows sort last.
const LATEST_STATIONS_SQL: &str = r#"
    SELECT key, latitude, longitude, timestamp
    FROM (
        SELECT key, latitude, longitude, timestamp,
               ROW_NUMBER() OVER (
                   PARTITION BY key
                   ORDER BY timestamp DESC NULLS LAST, id DESC
               ) AS rn
        FROM measurements
    ) ranked
    WHERE rn = 1
    ORDER BY key
"#;

impl ToSql for Operand {
    fn to_sql(&self) -> duckdb::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Operand::Float(v) => ToSqlOutput::Owned(Value::Double(*v)),
            Operand::Time(t) => ToSqlOutput::Owned(Value::BigInt(to_storage_micros(t))),
            Operand::Text(s) => ToSqlOutput::Owned(Value::Text(s.clone())),
        })
    }
}

/// DuckDB-based measurement store.
#[derive(Clone)]
pub struct DuckDbStore {
    conn: Arc<Mutex<Connection>>,
}

impl DuckDbStore {
    /// Opens (or creates) a DuckDB database.
    ///
    /// `connection_string` is a file path or `:memory:`. Missing parent
    /// directories of a file path are created. Recognized options:
    /// - `threads`: number of DuckDB worker threads
    pub fn new_with_options(connection_string: &str, options: &HashMap<String, String>) -> Result<Self, StoreError> {
        let mut config = Config::default();
        if let Some(threads) = options.get("threads") {
            let threads: i64 = threads
                .parse()
                .map_err(|e| StoreError::unavailable("invalid threads option", e))?;
            config = config.threads(threads)?;
        }

        if connection_string != ":memory:" {
            if let Some(parent) = Path::new(connection_string).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)
                        .map_err(|e| StoreError::unavailable("failed to create database directory", e))?;
                }
            }
        }

        let conn = Connection::open_with_flags(connection_string, config)
            .map_err(|e| StoreError::unavailable("failed to open database", e))?;
        info!(connection = connection_string, "opened duckdb measurement store");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Creates a store backed by a fresh in-memory database.
    pub fn new_in_memory() -> Result<Self, StoreError> {
        Self::new_with_options(":memory:", &HashMap::new())
    }

    /// Runs `op` on the shared connection from the blocking pool, holding the
    /// write lock until it returns.
    async fn with_writer<R, F>(&self, op: F) -> Result<R, StoreError>
    where
        R: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<R, StoreError> + Send + 'static,
    {
        let mut conn = Arc::clone(&self.conn).lock_owned().await;
        tokio::task::spawn_blocking(move || op(&mut conn))
            .await
            .map_err(|e| StoreError::unavailable("write task failed", e))?
    }

    /// Runs `sql` on a cloned connection and streams decoded rows back.
    async fn stream_rows<T, F>(
        &self,
        sql: String,
        params: Vec<Operand>,
        decode: F,
    ) -> Result<BoxStream<'static, Result<T, StoreError>>, StoreError>
    where
        T: Send + 'static,
        F: Fn(&Row<'_>) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = {
            let guard = self.conn.lock().await;
            guard
                .try_clone()
                .map_err(|e| StoreError::unavailable("failed to open read connection", e))?
        };

        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        tokio::task::spawn_blocking(move || {
            if let Err(e) = drain_cursor(&conn, &sql, &params, &decode, &tx) {
                error!(error = %e, "measurement read failed");
                // The consumer may already be gone
                let _ = tx.blocking_send(Err(e));
            }
        });

        Ok(ReceiverStream::new(rx).boxed())
    }
}

/// Writes rows in one transaction; any failure rolls the whole set back.
fn write_rows(conn: &mut Connection, measurements: &[Measurement]) -> Result<(), StoreError> {
    let tx = conn
        .transaction()
        .map_err(|e| StoreError::unavailable("failed to begin transaction", e))?;

    {
        let mut stmt = tx
            .prepare(INSERT_SQL)
            .map_err(|e| StoreError::unavailable("failed to prepare insert", e))?;

        for m in measurements {
            let (value_int, value_float) = match m.value {
                MeasurementValue::Integer(v) => (Some(v), None),
                MeasurementValue::Float(v) => (None, Some(v)),
            };
            stmt.execute(params![
                m.key,
                m.measurement_name,
                m.unit,
                value_int,
                value_float,
                m.timestamp.as_ref().map(to_storage_micros),
                to_storage_micros(&m.receipt_time),
                m.latitude,
                m.longitude,
                m.hardware,
            ])
            .map_err(|e| StoreError::unavailable("failed to insert measurement", e))?;
        }
    }

    tx.commit()
        .map_err(|e| StoreError::unavailable("failed to commit transaction", e))?;
    Ok(())
}

fn drain_cursor<T, F>(
    conn: &Connection,
    sql: &str,
    params: &[Operand],
    decode: &F,
    tx: &mpsc::Sender<Result<T, StoreError>>,
) -> Result<(), StoreError>
where
    F: Fn(&Row<'_>) -> Result<T, StoreError>,
{
    let mut stmt = conn
        .prepare(sql)
        .map_err(|e| StoreError::unavailable("failed to prepare query", e))?;
    let param_refs: Vec<&dyn ToSql> = params.iter().map(|p| p as &dyn ToSql).collect();
    let mut rows = stmt
        .query(param_refs.as_slice())
        .map_err(|e| StoreError::unavailable("failed to run query", e))?;

    while let Some(row) = rows.next()? {
        let item = decode(row)?;
        if tx.blocking_send(Ok(item)).is_err() {
            // Stream dropped, stop reading
            return Ok(());
        }
    }
    Ok(())
}

fn decode_time(micros: i64) -> Result<DateTime<Utc>, StoreError> {
    from_storage_micros(micros)
        .ok_or_else(|| StoreError::StorageUnavailable(format!("stored time out of range: {}", micros)))
}

fn measurement_from_row(row: &Row<'_>) -> Result<Measurement, StoreError> {
    let value_int: Option<i64> = row.get(3)?;
    let value_float: Option<f64> = row.get(4)?;
    let value = match (value_int, value_float) {
        (Some(v), _) => MeasurementValue::Integer(v),
        (None, Some(v)) => MeasurementValue::Float(v),
        (None, None) => {
            return Err(StoreError::StorageUnavailable("stored measurement has no value".to_string()))
        }
    };

    let timestamp: Option<i64> = row.get(5)?;
    let receipt_time: i64 = row.get(6)?;

    Ok(Measurement {
        key: row.get(0)?,
        measurement_name: row.get(1)?,
        unit: row.get(2)?,
        value,
        timestamp: timestamp.map(decode_time).transpose()?,
        receipt_time: decode_time(receipt_time)?,
        latitude: row.get(7)?,
        longitude: row.get(8)?,
        hardware: row.get(9)?,
    })
}

fn station_from_row(row: &Row<'_>) -> Result<LatestStationMeta, StoreError> {
    let latest_time: Option<i64> = row.get(3)?;
    Ok(LatestStationMeta {
        station_key: row.get(0)?,
        latitude: row.get(1)?,
        longitude: row.get(2)?,
        latest_time: latest_time.map(decode_time).transpose()?,
    })
}

#[async_trait]
impl MeasurementStore for DuckDbStore {
    async fn init(&self) -> Result<(), StoreError> {
        self.with_writer(|conn| {
            conn.execute_batch(SCHEMA_SQL)
                .map_err(|e| StoreError::unavailable("failed to create tables", e))
        })
        .await
    }

    async fn insert(&self, measurement: Measurement) -> Result<(), StoreError> {
        let key = measurement.key.clone();
        self.with_writer(move |conn| write_rows(conn, std::slice::from_ref(&measurement)))
            .await?;
        debug!(key = %key, "inserted measurement");
        Ok(())
    }

    async fn insert_batch(&self, measurements: Vec<Measurement>) -> Result<(), StoreError> {
        if measurements.is_empty() {
            return Ok(());
        }
        let rows = measurements.len();
        self.with_writer(move |conn| write_rows(conn, &measurements)).await?;
        debug!(rows, "inserted measurement batch");
        Ok(())
    }

    async fn select_all(&self) -> Result<MeasurementStream, StoreError> {
        self.select_where(MeasurementsQuery::default()).await
    }

    async fn select_where(&self, query: MeasurementsQuery) -> Result<MeasurementStream, StoreError> {
        let predicate = Predicate::from_query(&query);
        let sql = build_select_query(TABLE_NAME, &MEASUREMENT_COLUMNS, &predicate);
        let params = predicate.params().into_iter().cloned().collect();
        debug!(sql = %sql, "selecting measurements");
        self.stream_rows(sql, params, measurement_from_row).await
    }

    async fn clear(&self) -> Result<(), StoreError> {
        let removed = self
            .with_writer(|conn| {
                conn.execute(&format!("DELETE FROM {}", TABLE_NAME), params![])
                    .map_err(|e| StoreError::unavailable("failed to clear measurements", e))
            })
            .await?;
        info!(rows = removed, "cleared measurement store");
        Ok(())
    }

    async fn get_stations(&self) -> Result<StationStream, StoreError> {
        self.stream_rows(LATEST_STATIONS_SQL.to_string(), Vec::new(), station_from_row)
            .await
    }
}
