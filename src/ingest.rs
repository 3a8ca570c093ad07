//! Mapping of inbound sensor payloads onto stored measurements.
//!
//! Three wire shapes are accepted:
//! - a single reading: `{key, measurement_name, unit, value, timestamp?, lat?, lon?, hardware?}`
//! - a series: one key, name, unit, position and hardware shared by the parallel
//!   arrays `values` and (optionally) `timestamps`
//! - an item batch: `{items: [reading, ...]}`
//!
//! The receipt time is always assigned by the server. One call takes it once and
//! stamps it on every measurement it produces; a client-sent `receipt_time` is ignored.

use chrono::{DateTime, NaiveDateTime, SubsecRound, Utc};
use geosense_store::{Measurement, MeasurementValue};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::convert::Infallible;
use std::str::FromStr;
use thiserror::Error;

/// Rejected input. Nothing is stored for a payload that fails validation.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("invalid {field}: {reason}")]
pub struct ValidationError {
    /// Offending field, or `payload` when the body as a whole is malformed
    pub field: String,
    pub reason: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Qualifies the field with the enclosing element, e.g. `items[3].key`.
    pub(crate) fn within(self, prefix: &str) -> Self {
        Self::new(format!("{}.{}", prefix, self.field), self.reason)
    }
}

/// Current time at the precision the store keeps.
pub fn receipt_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Reading time as sent on the wire: seconds since the Unix epoch, or a string.
///
/// Strings may hold epoch seconds, RFC 3339, or a naive
/// `YYYY-MM-DD[T ]HH:MM:SS[.f]` date-time taken as UTC.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireTimestamp {
    Epoch(f64),
    Text(String),
}

impl FromStr for WireTimestamp {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(WireTimestamp::Text(s.to_string()))
    }
}

fn from_epoch_seconds(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() {
        return None;
    }
    let micros = (secs * 1_000_000.0).round();
    if micros < i64::MIN as f64 || micros > i64::MAX as f64 {
        return None;
    }
    DateTime::from_timestamp_micros(micros as i64)
}

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

impl WireTimestamp {
    /// Resolves to a UTC time truncated to microseconds.
    pub fn to_datetime(&self, field: &str) -> Result<DateTime<Utc>, ValidationError> {
        let parsed = match self {
            WireTimestamp::Epoch(secs) => from_epoch_seconds(*secs),
            WireTimestamp::Text(text) => {
                let text = text.trim();
                if let Ok(secs) = text.parse::<f64>() {
                    from_epoch_seconds(secs)
                } else if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
                    Some(dt.with_timezone(&Utc))
                } else {
                    NAIVE_FORMATS
                        .iter()
                        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
                        .map(|naive| naive.and_utc())
                }
            }
        };
        parsed
            .map(|dt| dt.trunc_subsecs(6))
            .ok_or_else(|| ValidationError::new(field, "not a representable point in time"))
    }
}

fn require_key(key: &str) -> Result<(), ValidationError> {
    if key.chars().all(|c| c.is_ascii_whitespace()) {
        return Err(ValidationError::new("key", "must not be blank"));
    }
    Ok(())
}

fn optional_time(ts: Option<&WireTimestamp>, field: &str) -> Result<Option<DateTime<Utc>>, ValidationError> {
    ts.map(|t| t.to_datetime(field)).transpose()
}

/// A single sensor reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorPayload {
    pub key: String,
    pub measurement_name: String,
    pub unit: String,
    pub value: MeasurementValue,
    pub timestamp: Option<WireTimestamp>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub hardware: Option<String>,
    /// Accepted for compatibility with older uplinks and ignored
    #[serde(default, skip_serializing)]
    pub receipt_time: Option<Value>,
}

impl SensorPayload {
    pub fn into_measurement(self, receipt_time: DateTime<Utc>) -> Result<Measurement, ValidationError> {
        require_key(&self.key)?;
        let timestamp = optional_time(self.timestamp.as_ref(), "timestamp")?;
        Ok(Measurement {
            key: self.key,
            measurement_name: self.measurement_name,
            unit: self.unit,
            value: self.value,
            timestamp,
            receipt_time,
            latitude: self.lat,
            longitude: self.lon,
            hardware: self.hardware,
        })
    }
}

/// Many readings of one measurement from one station.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorSeries {
    pub key: String,
    pub measurement_name: String,
    pub unit: String,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub hardware: Option<String>,
    pub values: Vec<MeasurementValue>,
    /// Parallel to `values`; omitted means no reading carries a timestamp
    pub timestamps: Option<Vec<Option<WireTimestamp>>>,
}

impl SensorSeries {
    /// Expands the series into one measurement per value.
    pub fn into_measurements(self, receipt_time: DateTime<Utc>) -> Result<Vec<Measurement>, ValidationError> {
        require_key(&self.key)?;

        let timestamps = match self.timestamps {
            Some(timestamps) if timestamps.len() != self.values.len() => {
                return Err(ValidationError::new(
                    "timestamps",
                    format!("has {} entries but values has {}", timestamps.len(), self.values.len()),
                ));
            }
            Some(timestamps) => timestamps,
            None => vec![None; self.values.len()],
        };

        self.values
            .into_iter()
            .zip(timestamps)
            .enumerate()
            .map(|(i, (value, ts))| -> Result<Measurement, ValidationError> {
                Ok(Measurement {
                    key: self.key.clone(),
                    measurement_name: self.measurement_name.clone(),
                    unit: self.unit.clone(),
                    value,
                    timestamp: optional_time(ts.as_ref(), &format!("timestamps[{}]", i))?,
                    receipt_time,
                    latitude: self.lat,
                    longitude: self.lon,
                    hardware: self.hardware.clone(),
                })
            })
            .collect()
    }
}

/// Independent readings delivered together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemBatch {
    pub items: Vec<SensorPayload>,
}

impl ItemBatch {
    pub fn into_measurements(self, receipt_time: DateTime<Utc>) -> Result<Vec<Measurement>, ValidationError> {
        self.items
            .into_iter()
            .enumerate()
            .map(|(i, item)| {
                item.into_measurement(receipt_time)
                    .map_err(|e| e.within(&format!("items[{}]", i)))
            })
            .collect()
    }
}

/// A classified inbound payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Ingestion {
    Reading(SensorPayload),
    Series(SensorSeries),
    Items(ItemBatch),
}

fn decode<T: serde::de::DeserializeOwned>(value: Value) -> Result<T, ValidationError> {
    serde_json::from_value(value).map_err(|e| ValidationError::new("payload", e.to_string()))
}

impl Ingestion {
    /// Parses a JSON request body.
    pub fn from_json(body: &[u8]) -> Result<Self, ValidationError> {
        let value: Value =
            serde_json::from_slice(body).map_err(|e| ValidationError::new("payload", e.to_string()))?;
        Self::from_value(value)
    }

    /// Classifies a JSON document by shape: `items` marks an item batch,
    /// `values` a series, anything else must be a single reading.
    pub fn from_value(value: Value) -> Result<Self, ValidationError> {
        let object = value
            .as_object()
            .ok_or_else(|| ValidationError::new("payload", "expected a JSON object"))?;

        if object.contains_key("items") {
            Ok(Ingestion::Items(decode(value)?))
        } else if object.contains_key("values") {
            Ok(Ingestion::Series(decode(value)?))
        } else {
            Ok(Ingestion::Reading(decode(value)?))
        }
    }

    /// Converts the payload, stamping every measurement with `receipt_time`.
    pub fn into_measurements(self, receipt_time: DateTime<Utc>) -> Result<Vec<Measurement>, ValidationError> {
        match self {
            Ingestion::Reading(payload) => Ok(vec![payload.into_measurement(receipt_time)?]),
            Ingestion::Series(series) => series.into_measurements(receipt_time),
            Ingestion::Items(batch) => batch.into_measurements(receipt_time),
        }
    }
}
