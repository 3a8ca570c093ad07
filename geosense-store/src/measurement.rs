//! Measurement records, query filters and derived station summaries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Numeric reading value. Integers and floats are kept apart so a stored
/// reading comes back exactly as it was ingested.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MeasurementValue {
    Integer(i64),
    Float(f64),
}

impl MeasurementValue {
    /// Returns the value widened to a float.
    pub fn as_f64(&self) -> f64 {
        match *self {
            MeasurementValue::Integer(v) => v as f64,
            MeasurementValue::Float(v) => v,
        }
    }
}

impl Display for MeasurementValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            MeasurementValue::Integer(v) => write!(f, "{}", v),
            MeasurementValue::Float(v) => write!(f, "{}", v),
        }
    }
}

impl From<i64> for MeasurementValue {
    fn from(v: i64) -> Self {
        MeasurementValue::Integer(v)
    }
}

impl From<f64> for MeasurementValue {
    fn from(v: f64) -> Self {
        MeasurementValue::Float(v)
    }
}

/// A single sensor reading.
///
/// Records are append-only: created at ingestion and never updated. Times
/// carry microsecond precision, which is what the store persists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// Identifier of the reporting station, not unique. Must contain at least
    /// one character other than ASCII whitespace (space, `\t`, `\n`, `\x0c`,
    /// `\r`); stored as given, without trimming.
    pub key: String,
    /// What was measured, e.g. "Temperature"
    pub measurement_name: String,
    /// Unit of `value` as reported, e.g. "C". No conversion is applied.
    pub unit: String,
    pub value: MeasurementValue,
    /// When the sensor took the reading, if it said so
    pub timestamp: Option<DateTime<Utc>>,
    /// When the server received the reading. Always server-assigned.
    pub receipt_time: DateTime<Utc>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Device or sensor type
    pub hardware: Option<String>,
}

/// Sparse filter over measurements. Unset fields put no constraint on their
/// dimension, so the default query matches every record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeasurementsQuery {
    pub lats: Option<(f64, f64)>,
    pub lons: Option<(f64, f64)>,
    pub time_range: Option<(DateTime<Utc>, DateTime<Utc>)>,
    pub receipt_time_range: Option<(DateTime<Utc>, DateTime<Utc>)>,
    pub measurement_name: Option<String>,
    pub hardware: Option<String>,
    pub key: Option<String>,
    pub unit: Option<String>,
    /// Maximum number of records to return, in storage order
    #[serde(default)]
    pub limit: Option<usize>,
}

impl MeasurementsQuery {
    pub fn with_lats(mut self, a: f64, b: f64) -> Self {
        self.lats = Some((a, b));
        self
    }

    pub fn with_lons(mut self, a: f64, b: f64) -> Self {
        self.lons = Some((a, b));
        self
    }

    pub fn with_time_range(mut self, a: DateTime<Utc>, b: DateTime<Utc>) -> Self {
        self.time_range = Some((a, b));
        self
    }

    pub fn with_receipt_time_range(mut self, a: DateTime<Utc>, b: DateTime<Utc>) -> Self {
        self.receipt_time_range = Some((a, b));
        self
    }

    pub fn with_measurement_name(mut self, name: impl Into<String>) -> Self {
        self.measurement_name = Some(name.into());
        self
    }

    pub fn with_hardware(mut self, hardware: impl Into<String>) -> Self {
        self.hardware = Some(hardware.into());
        self
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Most recent known position of one station, computed on demand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatestStationMeta {
    pub station_key: String,
    #[serde(rename = "lat")]
    pub latitude: Option<f64>,
    #[serde(rename = "lon")]
    pub longitude: Option<f64>,
    pub latest_time: Option<DateTime<Utc>>,
}

impl LatestStationMeta {
    /// Builds the summary carried by a station's winning record.
    pub fn from_measurement(m: &Measurement) -> Self {
        Self {
            station_key: m.key.clone(),
            latitude: m.latitude,
            longitude: m.longitude,
            latest_time: m.timestamp,
        }
    }
}

/// Converts a time to the integer microseconds persisted by the store.
pub fn to_storage_micros(time: &DateTime<Utc>) -> i64 {
    time.timestamp_micros()
}

/// Converts persisted microseconds back to a time.
pub fn from_storage_micros(micros: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_micros(micros)
}
