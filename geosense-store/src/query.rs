//! Translation of a sparse [`MeasurementsQuery`] into one conjunctive predicate.
//!
//! Every present range becomes two strict comparisons, `column > min AND column < max`,
//! after the endpoints are put in order. Every present scalar becomes an equality.
//! Absent fields contribute nothing, so an empty query selects every record.
//!
//! The predicate renders to SQL with positional placeholders for the storage engine,
//! and can also be evaluated against a record in process.

use crate::measurement::{Measurement, MeasurementsQuery};
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::fmt::{Display, Formatter};

/// Filterable measurement columns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    Key,
    MeasurementName,
    Unit,
    Hardware,
    Timestamp,
    ReceiptTime,
    Latitude,
    Longitude,
}

impl Column {
    /// Column name in the measurements table
    pub fn as_sql(&self) -> &'static str {
        match self {
            Column::Key => "key",
            Column::MeasurementName => "measurement_name",
            Column::Unit => "unit",
            Column::Hardware => "hardware",
            Column::Timestamp => "timestamp",
            Column::ReceiptTime => "receipt_time",
            Column::Latitude => "latitude",
            Column::Longitude => "longitude",
        }
    }
}

/// Comparison applied between a column and an operand
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Greater,
    Less,
    Equal,
}

impl Display for Comparison {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Comparison::Greater => write!(f, ">"),
            Comparison::Less => write!(f, "<"),
            Comparison::Equal => write!(f, "="),
        }
    }
}

impl Comparison {
    fn holds(&self, ordering: Ordering) -> bool {
        match self {
            Comparison::Greater => ordering == Ordering::Greater,
            Comparison::Less => ordering == Ordering::Less,
            Comparison::Equal => ordering == Ordering::Equal,
        }
    }
}

/// Right-hand side of a condition
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Float(f64),
    Time(DateTime<Utc>),
    Text(String),
}

/// A single `column <comparison> operand` term
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub column: Column,
    pub comparison: Comparison,
    pub operand: Operand,
}

impl Condition {
    fn new(column: Column, comparison: Comparison, operand: Operand) -> Self {
        Self { column, comparison, operand }
    }

    /// Evaluates the condition against a record. An absent field never matches.
    pub fn matches(&self, m: &Measurement) -> bool {
        let ordering = match (&self.operand, self.column) {
            (Operand::Float(v), Column::Latitude) => m.latitude.map(|lat| engine_cmp(lat, *v)),
            (Operand::Float(v), Column::Longitude) => m.longitude.map(|lon| engine_cmp(lon, *v)),
            (Operand::Time(t), Column::Timestamp) => m.timestamp.map(|ts| ts.cmp(t)),
            (Operand::Time(t), Column::ReceiptTime) => Some(m.receipt_time.cmp(t)),
            (Operand::Text(s), Column::Key) => Some(m.key.as_str().cmp(s.as_str())),
            (Operand::Text(s), Column::MeasurementName) => Some(m.measurement_name.as_str().cmp(s.as_str())),
            (Operand::Text(s), Column::Unit) => Some(m.unit.as_str().cmp(s.as_str())),
            (Operand::Text(s), Column::Hardware) => m.hardware.as_deref().map(|h| h.cmp(s.as_str())),
            _ => None,
        };
        ordering.map_or(false, |o| self.comparison.holds(o))
    }
}

/// Conjunction of conditions plus an optional row limit
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Predicate {
    conditions: Vec<Condition>,
    limit: Option<usize>,
}

/// Float comparison as the store engine does it: NaN equals NaN and sorts
/// above every number, including infinity.
pub fn engine_cmp(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}

/// Orders a pair so the smaller endpoint comes first.
fn ordered_floats(a: f64, b: f64) -> (f64, f64) {
    if engine_cmp(a, b) == Ordering::Greater {
        (b, a)
    } else {
        (a, b)
    }
}

fn ordered_times(a: DateTime<Utc>, b: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    if a > b {
        (b, a)
    } else {
        (a, b)
    }
}

impl Predicate {
    /// Builds the predicate for a query.
    pub fn from_query(query: &MeasurementsQuery) -> Self {
        let mut conditions = Vec::new();

        // Ranged, exclusive on both ends
        let float_ranges = [(query.lats, Column::Latitude), (query.lons, Column::Longitude)];
        for (range, column) in float_ranges {
            if let Some((a, b)) = range {
                let (low, high) = ordered_floats(a, b);
                conditions.push(Condition::new(column, Comparison::Greater, Operand::Float(low)));
                conditions.push(Condition::new(column, Comparison::Less, Operand::Float(high)));
            }
        }

        let time_ranges = [
            (query.time_range, Column::Timestamp),
            (query.receipt_time_range, Column::ReceiptTime),
        ];
        for (range, column) in time_ranges {
            if let Some((a, b)) = range {
                let (low, high) = ordered_times(a, b);
                conditions.push(Condition::new(column, Comparison::Greater, Operand::Time(low)));
                conditions.push(Condition::new(column, Comparison::Less, Operand::Time(high)));
            }
        }

        // Exact match
        let scalars = [
            (&query.measurement_name, Column::MeasurementName),
            (&query.key, Column::Key),
            (&query.unit, Column::Unit),
            (&query.hardware, Column::Hardware),
        ];
        for (value, column) in scalars {
            if let Some(value) = value {
                conditions.push(Condition::new(column, Comparison::Equal, Operand::Text(value.clone())));
            }
        }

        Self {
            conditions,
            limit: query.limit,
        }
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// True when no condition constrains the result.
    pub fn is_unconstrained(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Evaluates the whole conjunction against a record.
    pub fn matches(&self, m: &Measurement) -> bool {
        self.conditions.iter().all(|c| c.matches(m))
    }

    /// Renders ` WHERE a AND b ...` with `?` placeholders, in the same order
    /// as [`Predicate::params`]. Empty when unconstrained.
    pub fn where_clause(&self) -> String {
        if self.conditions.is_empty() {
            return String::new();
        }
        let terms: Vec<String> = self
            .conditions
            .iter()
            .map(|c| format!("{} {} ?", c.column.as_sql(), c.comparison))
            .collect();
        format!(" WHERE {}", terms.join(" AND "))
    }

    /// Operands bound to the placeholders of [`Predicate::where_clause`]
    pub fn params(&self) -> Vec<&Operand> {
        self.conditions.iter().map(|c| &c.operand).collect()
    }
}

/// Builds a SELECT over `table_name` filtered by `predicate`.
///
/// Rows come back in storage order (`id`), truncated by the predicate's limit.
pub fn build_select_query(table_name: &str, columns: &[&str], predicate: &Predicate) -> String {
    let mut query = format!("SELECT {} FROM {}", columns.join(", "), table_name);
    query.push_str(&predicate.where_clause());
    query.push_str(" ORDER BY id ASC");
    if let Some(limit) = predicate.limit() {
        query.push_str(&format!(" LIMIT {}", limit));
    }
    query
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measurement::MeasurementValue;
    use chrono::TimeZone;

    fn reading(lat: Option<f64>) -> Measurement {
        Measurement {
            key: "station".to_string(),
            measurement_name: "Temperature".to_string(),
            unit: "C".to_string(),
            value: MeasurementValue::Float(21.5),
            timestamp: Some(Utc.timestamp_opt(100, 0).unwrap()),
            receipt_time: Utc.timestamp_opt(105, 0).unwrap(),
            latitude: lat,
            longitude: Some(0.0),
            hardware: Some("Thermometer".to_string()),
        }
    }

    #[test]
    fn test_empty_query_renders_no_where_clause() {
        let predicate = Predicate::from_query(&MeasurementsQuery::default());
        assert!(predicate.is_unconstrained());
        assert_eq!(predicate.where_clause(), "");
        assert!(predicate.matches(&reading(None)));
        assert_eq!(
            build_select_query("measurements", &["key"], &predicate),
            "SELECT key FROM measurements ORDER BY id ASC"
        );
    }

    #[test]
    fn test_range_becomes_two_strict_conditions() {
        let predicate = Predicate::from_query(&MeasurementsQuery::default().with_lats(0.0, 10.0));
        assert_eq!(predicate.where_clause(), " WHERE latitude > ? AND latitude < ?");
        assert_eq!(
            predicate.params(),
            vec![&Operand::Float(0.0), &Operand::Float(10.0)]
        );
    }

    #[test]
    fn test_reversed_range_is_normalized() {
        let forward = Predicate::from_query(&MeasurementsQuery::default().with_lons(-3.0, 7.0));
        let reversed = Predicate::from_query(&MeasurementsQuery::default().with_lons(7.0, -3.0));
        assert_eq!(forward, reversed);

        let early = Utc.timestamp_opt(10, 0).unwrap();
        let late = Utc.timestamp_opt(20, 0).unwrap();
        let forward = Predicate::from_query(&MeasurementsQuery::default().with_time_range(early, late));
        let reversed = Predicate::from_query(&MeasurementsQuery::default().with_time_range(late, early));
        assert_eq!(forward, reversed);
    }

    #[test]
    fn test_bounds_are_exclusive() {
        let predicate = Predicate::from_query(&MeasurementsQuery::default().with_lats(0.0, 10.0));
        assert!(!predicate.matches(&reading(Some(0.0))));
        assert!(!predicate.matches(&reading(Some(10.0))));
        assert!(predicate.matches(&reading(Some(5.0))));
        assert!(!predicate.matches(&reading(None)));
    }

    #[test]
    fn test_all_fields_are_combined_with_and() {
        let query = MeasurementsQuery::default()
            .with_lats(0.0, 1.0)
            .with_lons(0.0, 1.0)
            .with_time_range(Utc.timestamp_opt(0, 0).unwrap(), Utc.timestamp_opt(1, 0).unwrap())
            .with_receipt_time_range(Utc.timestamp_opt(0, 0).unwrap(), Utc.timestamp_opt(1, 0).unwrap())
            .with_measurement_name("Temperature")
            .with_key("station")
            .with_unit("C")
            .with_hardware("Thermometer")
            .with_limit(5);
        let predicate = Predicate::from_query(&query);
        assert_eq!(predicate.conditions().len(), 12);
        assert_eq!(
            predicate.where_clause(),
            " WHERE latitude > ? AND latitude < ? AND longitude > ? AND longitude < ? \
             AND timestamp > ? AND timestamp < ? AND receipt_time > ? AND receipt_time < ? \
             AND measurement_name = ? AND key = ? AND unit = ? AND hardware = ?"
        );
        assert!(build_select_query("measurements", &["key"], &predicate).ends_with(" LIMIT 5"));
    }

    #[test]
    fn test_equality_on_absent_hardware_never_matches() {
        let predicate = Predicate::from_query(&MeasurementsQuery::default().with_hardware("Thermometer"));
        let mut m = reading(Some(1.0));
        assert!(predicate.matches(&m));
        m.hardware = None;
        assert!(!predicate.matches(&m));
    }

    #[test]
    fn test_nan_bound_sorts_above_every_number() {
        assert_eq!(engine_cmp(f64::NAN, f64::INFINITY), Ordering::Greater);
        assert_eq!(engine_cmp(-f64::NAN, 1.0), Ordering::Greater);
        assert_eq!(engine_cmp(f64::NAN, f64::NAN), Ordering::Equal);
        assert_eq!(engine_cmp(-0.0, 0.0), Ordering::Equal);

        let predicate = Predicate::from_query(&MeasurementsQuery::default().with_lats(f64::NAN, 4.0));
        let bounds: Vec<_> = predicate.conditions().iter().map(|c| c.operand.clone()).collect();
        assert_eq!(bounds[0], Operand::Float(4.0));
        assert!(matches!(bounds[1], Operand::Float(v) if v.is_nan()));
    }
}
