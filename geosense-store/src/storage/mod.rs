//! Storage backends for measurement persistence.
//!
//! This module provides:
//! - `MeasurementStore`: the contract every backend implements
//! - `duckdb`: embedded DuckDB backend, file-backed or in-memory
//!
//! Reads return lazy streams. A backend produces rows as the consumer polls,
//! so a large result set is never materialized unless the caller collects it.

pub mod duckdb;

use crate::error::StoreError;
use crate::measurement::{LatestStationMeta, Measurement, MeasurementsQuery};
use crate::stations::latest_from_stream;
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};

/// Lazy sequence of stored measurements
pub type MeasurementStream = BoxStream<'static, Result<Measurement, StoreError>>;

/// Lazy sequence of per-station summaries
pub type StationStream = BoxStream<'static, Result<LatestStationMeta, StoreError>>;

/// Append-only measurement storage.
///
/// Each insert is its own transaction and is durable when the call returns.
/// Each read observes a consistent snapshot taken when the call is made; a
/// concurrent insert may or may not be visible, but never partially.
#[async_trait]
pub trait MeasurementStore: Send + Sync + 'static {
    /// Creates the schema if it does not exist yet.
    async fn init(&self) -> Result<(), StoreError>;

    /// Appends one record.
    async fn insert(&self, measurement: Measurement) -> Result<(), StoreError>;

    /// Appends records in order, all or nothing.
    async fn insert_batch(&self, measurements: Vec<Measurement>) -> Result<(), StoreError>;

    /// Every stored record in storage order.
    async fn select_all(&self) -> Result<MeasurementStream, StoreError>;

    /// Records matching the conjunction built from `query`.
    async fn select_where(&self, query: MeasurementsQuery) -> Result<MeasurementStream, StoreError>;

    /// Discards the whole collection.
    async fn clear(&self) -> Result<(), StoreError>;

    /// One summary per distinct key with that key's latest position.
    ///
    /// The default implementation scans [`MeasurementStore::select_all`] and
    /// reduces in process. Backends that can aggregate natively override it.
    async fn get_stations(&self) -> Result<StationStream, StoreError> {
        let stations = latest_from_stream(self.select_all().await?).await?;
        Ok(stream::iter(stations.into_iter().map(Ok)).boxed())
    }
}
