//! GeoJSON rendering of measurements and station summaries.
//!
//! Positions become `Point` geometries with `[lon, lat]` coordinates. Records
//! without both coordinates have no place on a map and are left out.

use chrono::{DateTime, SecondsFormat, Utc};
use geosense_store::{LatestStationMeta, Measurement, MeasurementValue};
use serde::Serialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename = "Point")]
pub struct PointGeometry {
    pub coordinates: [f64; 2],
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename = "Feature")]
pub struct Feature {
    pub geometry: PointGeometry,
    pub properties: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(tag = "type", rename = "FeatureCollection")]
pub struct FeatureCollection {
    pub features: Vec<Feature>,
}

fn point(latitude: Option<f64>, longitude: Option<f64>) -> Option<PointGeometry> {
    Some(PointGeometry {
        coordinates: [longitude?, latitude?],
    })
}

fn time_value(time: Option<&DateTime<Utc>>) -> Value {
    time.map_or(Value::Null, |t| Value::from(t.to_rfc3339_opts(SecondsFormat::AutoSi, true)))
}

fn reading_value(value: MeasurementValue) -> Value {
    match value {
        MeasurementValue::Integer(v) => Value::from(v),
        MeasurementValue::Float(v) => Value::from(v),
    }
}

impl Feature {
    pub fn from_measurement(m: &Measurement) -> Option<Self> {
        let geometry = point(m.latitude, m.longitude)?;
        let mut properties = Map::new();
        properties.insert("key".to_string(), Value::from(m.key.as_str()));
        properties.insert("measurement_name".to_string(), Value::from(m.measurement_name.as_str()));
        properties.insert("unit".to_string(), Value::from(m.unit.as_str()));
        properties.insert("value".to_string(), reading_value(m.value));
        properties.insert("timestamp".to_string(), time_value(m.timestamp.as_ref()));
        properties.insert("receipt_time".to_string(), time_value(Some(&m.receipt_time)));
        properties.insert(
            "hardware".to_string(),
            m.hardware.as_deref().map_or(Value::Null, Value::from),
        );
        Some(Self { geometry, properties })
    }

    pub fn from_station(station: &LatestStationMeta) -> Option<Self> {
        let geometry = point(station.latitude, station.longitude)?;
        let mut properties = Map::new();
        properties.insert("station_key".to_string(), Value::from(station.station_key.as_str()));
        properties.insert("latest_time".to_string(), time_value(station.latest_time.as_ref()));
        Some(Self { geometry, properties })
    }
}

impl FeatureCollection {
    pub fn from_measurements<'a, I>(records: I) -> Self
    where
        I: IntoIterator<Item = &'a Measurement>,
    {
        Self {
            features: records.into_iter().filter_map(Feature::from_measurement).collect(),
        }
    }

    pub fn from_stations<'a, I>(stations: I) -> Self
    where
        I: IntoIterator<Item = &'a LatestStationMeta>,
    {
        Self {
            features: stations.into_iter().filter_map(Feature::from_station).collect(),
        }
    }
}
