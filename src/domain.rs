//! ==============================================================================
//! domain.rs - measurement data model
//! ==============================================================================
//!
//! purpose:
//!     typed records shared by the store, the query service and the api.
//!
//! relationships:
//!     - used by: store/* (persisted shape), query.rs (validated filters),
//!       seed.rs (generated records), server.rs (json responses)
//!
//! ==============================================================================

use chrono::{DateTime, SecondsFormat, Utc};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// one timestamped sensor sample
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Measurement {
    pub timestamp: DateTime<Utc>,
    /// celsius
    pub temperature: f64,
    /// relative humidity (0-100%)
    pub humidity: f64,
    /// ppm
    pub co2: f64,
}

impl Measurement {
    pub fn value(&self, field: Field) -> f64 {
        match field {
            Field::Temperature => self.temperature,
            Field::Humidity => self.humidity,
            Field::Co2 => self.co2,
        }
    }
}

// ==============================================================================
// field - the measurable quantities
// ==============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum Field {
    #[default]
    Temperature,
    Humidity,
    Co2,
}

impl Field {
    pub const ALL: [Field; 3] = [Field::Temperature, Field::Humidity, Field::Co2];

    /// name used in query strings, json keys and document keys
    pub fn as_str(self) -> &'static str {
        match self {
            Field::Temperature => "temperature",
            Field::Humidity => "humidity",
            Field::Co2 => "co2",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownField(pub String);

impl fmt::Display for UnknownField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown field {:?}", self.0)
    }
}

impl std::error::Error for UnknownField {}

impl FromStr for Field {
    type Err = UnknownField;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Field::ALL
            .into_iter()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| UnknownField(s.to_string()))
    }
}

// ==============================================================================
// range - inclusive timestamp filter
// ==============================================================================

/// both bounds inclusive, either may be absent
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DateRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl DateRange {
    pub fn contains(&self, ts: &DateTime<Utc>) -> bool {
        self.start.map_or(true, |s| *ts >= s) && self.end.map_or(true, |e| *ts <= e)
    }
}

// ==============================================================================
// query results
// ==============================================================================

/// one row of a time series: the timestamp plus the single requested field
#[derive(Clone, Debug, PartialEq)]
pub struct SeriesPoint {
    pub timestamp: DateTime<Utc>,
    pub field: Field,
    pub value: f64,
}

/// rfc 3339 with millisecond precision and a `Z` suffix
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

// serialized as {"timestamp": "...", "<field>": value} so the key matches the query
impl Serialize for SeriesPoint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("timestamp", &format_timestamp(&self.timestamp))?;
        map.serialize_entry(self.field.as_str(), &self.value)?;
        map.end()
    }
}

/// summary statistics over every record matching a filter
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Metrics {
    pub avg: f64,
    pub min: f64,
    pub max: f64,
    #[serde(rename = "stdDev")]
    pub std_dev: f64,
    pub count: u64,
}

impl Metrics {
    pub fn zero() -> Self {
        Self { avg: 0.0, min: 0.0, max: 0.0, std_dev: 0.0, count: 0 }
    }

    /// population standard deviation (divides by n, not n - 1)
    pub fn from_values(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self::zero();
        }

        let n = values.len() as f64;
        let avg = values.iter().sum::<f64>() / n;
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let variance = values.iter().map(|v| (v - avg).powi(2)).sum::<f64>() / n;

        Self {
            avg,
            min,
            max,
            std_dev: variance.sqrt(),
            count: values.len() as u64,
        }
    }
}
