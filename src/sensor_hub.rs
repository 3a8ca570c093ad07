//! Ingestion and query entry points over a measurement store.
//!
//! `SensorHub` is what a transport layer calls: it validates inbound payloads,
//! assigns the receipt time and hands finished records to the store. Reads are
//! passed through as lazy streams.

use crate::config::Settings;
use crate::error::{Error, Result};
use crate::ingest::{receipt_now, Ingestion, ItemBatch, SensorPayload, SensorSeries, ValidationError};
use crate::params::BoundedQueryParams;
use chrono::{DateTime, Utc};
use geosense_store::storage::duckdb::DuckDbStore;
use geosense_store::{Measurement, MeasurementStore, MeasurementStream, MeasurementsQuery, StationStream};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

fn rejected(e: ValidationError) -> ValidationError {
    warn!(field = %e.field, reason = %e.reason, "rejected payload");
    e
}

#[derive(Clone)]
pub struct SensorHub {
    store: Arc<dyn MeasurementStore>,
}

impl SensorHub {
    pub fn new(store: Arc<dyn MeasurementStore>) -> Self {
        Self { store }
    }

    /// Opens the configured engine and makes sure its schema exists.
    pub async fn from_settings(settings: &Settings) -> Result<Self> {
        let store: Arc<dyn MeasurementStore> = match settings.engine.engine.as_str() {
            "duckdb" => Arc::new(DuckDbStore::new_with_options(
                &settings.engine.connection,
                &settings.engine.options,
            )?),
            other => return Err(Error::Config(format!("unsupported engine type: {}", other))),
        };
        store.init().await?;
        info!(
            engine = %settings.engine.engine,
            connection = %settings.engine.connection,
            "measurement store ready"
        );
        Ok(Self::new(store))
    }

    /// Validates and stores a JSON request body of any accepted shape.
    ///
    /// Returns the number of records written.
    pub async fn ingest_json(&self, body: &[u8]) -> Result<usize> {
        let ingestion = Ingestion::from_json(body).map_err(|e| {
            warn!(error = %e, "rejected payload");
            e
        })?;
        self.ingest(ingestion).await
    }

    pub async fn ingest_reading(&self, payload: SensorPayload) -> Result<usize> {
        self.ingest(Ingestion::Reading(payload)).await
    }

    pub async fn ingest_series(&self, series: SensorSeries) -> Result<usize> {
        self.ingest(Ingestion::Series(series)).await
    }

    pub async fn ingest_items(&self, batch: ItemBatch) -> Result<usize> {
        self.ingest(Ingestion::Items(batch)).await
    }

    /// Stores a classified payload. Every record produced by one call shares
    /// one receipt time, and a multi-record payload is written all or nothing.
    #[instrument(skip_all)]
    pub async fn ingest(&self, ingestion: Ingestion) -> Result<usize> {
        let received = receipt_now();
        let single = matches!(ingestion, Ingestion::Reading(_));
        let measurements = ingestion.into_measurements(received).map_err(rejected)?;
        self.write(measurements, single, received).await
    }

    /// Stores several JSON payloads as one unit.
    ///
    /// Every payload is validated before anything is written, all records share
    /// one receipt time, and they go to the store in a single batch. A failing
    /// payload is reported by its position, e.g. `[2].value`.
    #[instrument(skip_all, fields(payloads = payloads.len()))]
    pub async fn ingest_many(&self, payloads: Vec<Value>) -> Result<usize> {
        let received = receipt_now();
        let mut measurements = Vec::new();
        for (i, payload) in payloads.into_iter().enumerate() {
            let produced = Ingestion::from_value(payload)
                .and_then(|ingestion| ingestion.into_measurements(received))
                .map_err(|e| rejected(e.within(&format!("[{}]", i))))?;
            measurements.extend(produced);
        }
        self.write(measurements, false, received).await
    }

    async fn write(
        &self,
        mut measurements: Vec<Measurement>,
        single: bool,
        received: DateTime<Utc>,
    ) -> Result<usize> {
        let count = measurements.len();
        let written = match (single, count) {
            (_, 0) => Ok(()),
            (true, _) => self.store.insert(measurements.remove(0)).await,
            (false, _) => self.store.insert_batch(measurements).await,
        };
        written.map_err(|e| {
            error!(error = %e, count, "failed to store measurements");
            e
        })?;

        debug!(count, receipt_time = %received, "stored measurements");
        Ok(count)
    }

    /// Records matching `query`, in storage order.
    pub async fn measurements(&self, query: MeasurementsQuery) -> Result<MeasurementStream> {
        debug!(?query, "selecting measurements");
        Ok(self.store.select_where(query).await?)
    }

    /// Records matching caller-supplied bounds, validated first.
    pub async fn query(&self, params: BoundedQueryParams) -> Result<MeasurementStream> {
        let query = params.into_query().map_err(|e| {
            warn!(field = %e.field, reason = %e.reason, "rejected query");
            e
        })?;
        self.measurements(query).await
    }

    pub async fn all_measurements(&self) -> Result<MeasurementStream> {
        Ok(self.store.select_all().await?)
    }

    /// Latest known position of every station.
    pub async fn stations(&self) -> Result<StationStream> {
        Ok(self.store.get_stations().await?)
    }

    /// Discards every stored record.
    pub async fn reset(&self) -> Result<()> {
        self.store.clear().await?;
        info!("measurement store cleared");
        Ok(())
    }
}
