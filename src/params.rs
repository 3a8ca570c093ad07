//! Caller-facing query bounds, as they arrive from a command line or a URL.

use crate::ingest::{ValidationError, WireTimestamp};
use chrono::{DateTime, Utc};
use clap::Args;
use geosense_store::MeasurementsQuery;
use serde::Deserialize;

/// Flat query parameters. Each range is given as a `min_*`/`max_*` pair and
/// must be complete; endpoints may come in either order.
#[derive(Args, Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct BoundedQueryParams {
    /// Lower reading time bound (epoch seconds or RFC 3339)
    #[arg(long)]
    pub min_time: Option<WireTimestamp>,
    /// Upper reading time bound
    #[arg(long)]
    pub max_time: Option<WireTimestamp>,
    #[arg(long)]
    pub min_receipt_time: Option<WireTimestamp>,
    #[arg(long)]
    pub max_receipt_time: Option<WireTimestamp>,
    #[arg(long, allow_negative_numbers = true)]
    pub min_lat: Option<f64>,
    #[arg(long, allow_negative_numbers = true)]
    pub max_lat: Option<f64>,
    #[arg(long, allow_negative_numbers = true)]
    pub min_lon: Option<f64>,
    #[arg(long, allow_negative_numbers = true)]
    pub max_lon: Option<f64>,
    /// Station key to match exactly
    #[arg(long)]
    pub key: Option<String>,
    #[arg(long)]
    pub measurement_name: Option<String>,
    #[arg(long)]
    pub unit: Option<String>,
    #[arg(long)]
    pub hardware: Option<String>,
    /// Maximum number of records to return
    #[arg(long)]
    pub limit: Option<usize>,
}

fn both_ends<T>(min: Option<T>, max: Option<T>, field: &str) -> Result<Option<(T, T)>, ValidationError> {
    match (min, max) {
        (Some(a), Some(b)) => Ok(Some((a, b))),
        (None, None) => Ok(None),
        _ => Err(ValidationError::new(field, "range needs both a minimum and a maximum")),
    }
}

fn coordinate_range(
    min: Option<f64>,
    max: Option<f64>,
    field: &str,
) -> Result<Option<(f64, f64)>, ValidationError> {
    let range = both_ends(min, max, field)?;
    if let Some((a, b)) = range {
        if !a.is_finite() || !b.is_finite() {
            return Err(ValidationError::new(field, "bounds must be finite numbers"));
        }
    }
    Ok(range)
}

fn time_range(
    min: Option<WireTimestamp>,
    max: Option<WireTimestamp>,
    field: &str,
) -> Result<Option<(DateTime<Utc>, DateTime<Utc>)>, ValidationError> {
    both_ends(min, max, field)?
        .map(|(a, b)| Ok((a.to_datetime(field)?, b.to_datetime(field)?)))
        .transpose()
}

impl BoundedQueryParams {
    /// Validates the bounds and builds the store query.
    pub fn into_query(self) -> Result<MeasurementsQuery, ValidationError> {
        Ok(MeasurementsQuery {
            lats: coordinate_range(self.min_lat, self.max_lat, "lat")?,
            lons: coordinate_range(self.min_lon, self.max_lon, "lon")?,
            time_range: time_range(self.min_time, self.max_time, "time")?,
            receipt_time_range: time_range(self.min_receipt_time, self.max_receipt_time, "receipt_time")?,
            measurement_name: self.measurement_name,
            hardware: self.hardware,
            key: self.key,
            unit: self.unit,
            limit: self.limit,
        })
    }
}
