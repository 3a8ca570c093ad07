//! Geosense: ingestion and bounded queries for geolocated sensor readings.
//!
//! Sensor stations report readings (what was measured, where and when) as JSON.
//! This crate validates those payloads, stamps them with a server-side receipt
//! time and appends them to a [`geosense_store::MeasurementStore`]. Reads are
//! bounded queries over position, time and exact-match fields, plus the latest
//! known position of every station, optionally rendered as GeoJSON.
//!
//! # Example
//!
//! ```rust,no_run
//! use futures::TryStreamExt;
//! use geosense::{SensorHub, Settings, ConfigArgs, MeasurementsQuery};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = Settings::new(&ConfigArgs::default())?;
//!     let hub = SensorHub::from_settings(&settings).await?;
//!
//!     let body = br#"{"key": "Demo Buoy Station", "measurement_name": "Temperature",
//!                     "unit": "C", "value": 21, "timestamp": 1700000000,
//!                     "lat": 32.7767, "lon": -96.797}"#;
//!     hub.ingest_json(body).await?;
//!
//!     let query = MeasurementsQuery::default().with_lats(30.0, 35.0);
//!     let readings: Vec<_> = hub.measurements(query).await?.try_collect().await?;
//!     println!("{} readings", readings.len());
//!
//!     let stations: Vec<_> = hub.stations().await?.try_collect().await?;
//!     println!("{} stations", stations.len());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod geojson;
pub mod ingest;
pub mod params;
pub mod sensor_hub;

pub use config::{ConfigArgs, Settings};
pub use error::{Error, Result};
pub use geojson::{Feature, FeatureCollection, PointGeometry};
pub use ingest::{Ingestion, ItemBatch, SensorPayload, SensorSeries, ValidationError, WireTimestamp};
pub use params::BoundedQueryParams;
pub use sensor_hub::SensorHub;

pub use geosense_store::{LatestStationMeta, Measurement, MeasurementValue, MeasurementsQuery};

#[cfg(test)]
mod tests;
