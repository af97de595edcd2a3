//! ==============================================================================
//! query.rs - query validation and dispatch
//! ==============================================================================
//!
//! purpose:
//!     turns raw query-string parameters into a typed (field, range) pair and
//!     runs it against the store. validation always happens before the store
//!     is touched, so a bad request never costs a database round trip.
//!
//! relationships:
//!     - used by: server.rs (measurements + metrics handlers)
//!     - uses: store/mod.rs (MeasurementStore), domain.rs (Field, DateRange)
//!
//! ==============================================================================

use crate::domain::{DateRange, Field, Metrics, SeriesPoint, UnknownField};
use crate::store::{SharedStore, StoreError};

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Deserialize;
use std::fmt;

/// raw `?field=&start_date=&end_date=` parameters
#[derive(Debug, Default, Clone, Deserialize)]
pub struct MeasurementQuery {
    pub field: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    Start,
    End,
}

impl fmt::Display for Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bound::Start => f.write_str("start_date"),
            Bound::End => f.write_str("end_date"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("Invalid field. Allowed: temperature, humidity, co2")]
    InvalidField(#[from] UnknownField),
    #[error("Invalid {bound} format")]
    InvalidDate { bound: Bound, value: String },
    /// the query string itself could not be decoded (e.g. a repeated key)
    #[error("{0}")]
    MalformedQuery(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl QueryError {
    pub fn is_validation(&self) -> bool {
        !matches!(self, QueryError::Store(_))
    }

    /// the offending input for validation failures
    pub fn rejected_value(&self) -> Option<&str> {
        match self {
            QueryError::InvalidField(UnknownField(value))
            | QueryError::InvalidDate { value, .. }
            | QueryError::MalformedQuery(value) => Some(value.as_str()),
            QueryError::Store(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidatedQuery {
    pub field: Field,
    pub range: DateRange,
}

impl MeasurementQuery {
    pub fn validate(&self) -> Result<ValidatedQuery, QueryError> {
        let field = match self.field.as_deref() {
            None => Field::default(),
            Some(raw) => raw.parse()?,
        };

        let range = DateRange {
            start: parse_bound(self.start_date.as_deref(), Bound::Start)?,
            end: parse_bound(self.end_date.as_deref(), Bound::End)?,
        };

        Ok(ValidatedQuery { field, range })
    }
}

/// empty strings count as "not given"
fn parse_bound(raw: Option<&str>, bound: Bound) -> Result<Option<DateTime<Utc>>, QueryError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(value) => parse_date(value)
            .map(Some)
            .ok_or_else(|| QueryError::InvalidDate { bound, value: value.to_string() }),
    }
}

/// ISO-8601 style dates, down to a bare year. values without an offset are
/// read as UTC and a missing month or day is the 1st.
pub fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }

    // minute precision with a zone: 2024-01-01T12:00Z, 2024-01-01T12:00+02:00
    let zoned = match value.strip_suffix('Z') {
        Some(rest) => format!("{}+00:00", rest),
        None => value.to_string(),
    };
    if let Ok(dt) = DateTime::parse_from_str(&zoned, "%Y-%m-%dT%H:%M%:z") {
        return Some(dt.with_timezone(&Utc));
    }

    const NAIVE_FORMATS: [&str; 3] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"];
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(naive.and_utc());
        }
    }

    parse_calendar_date(value)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// `YYYY-MM-DD`, `YYYY-MM` or `YYYY`
fn parse_calendar_date(value: &str) -> Option<NaiveDate> {
    let bytes = value.as_bytes();
    let digits = |range: std::ops::Range<usize>| bytes[range].iter().all(u8::is_ascii_digit);

    match bytes.len() {
        10 => NaiveDate::parse_from_str(value, "%Y-%m-%d").ok(),
        7 if digits(0..4) && bytes[4] == b'-' && digits(5..7) => {
            NaiveDate::parse_from_str(&format!("{}-01", value), "%Y-%m-%d").ok()
        }
        4 if digits(0..4) => NaiveDate::from_ymd_opt(value.parse().ok()?, 1, 1),
        _ => None,
    }
}

// ==============================================================================
// query service
// ==============================================================================

#[derive(Clone)]
pub struct QueryService {
    store: SharedStore,
}

impl QueryService {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// up to 100 rows, ascending by timestamp
    pub async fn series(&self, query: &MeasurementQuery) -> Result<Vec<SeriesPoint>, QueryError> {
        let q = query.validate()?;
        tracing::debug!(field = %q.field, start = ?q.range.start, end = ?q.range.end, "series query");
        Ok(self.store.find(q.field, &q.range).await?)
    }

    /// full-range statistics; unlike `series` this is not capped
    pub async fn metrics(&self, query: &MeasurementQuery) -> Result<Metrics, QueryError> {
        let q = query.validate()?;
        tracing::debug!(field = %q.field, start = ?q.range.start, end = ?q.range.end, "metrics query");
        Ok(self.store.aggregate(q.field, &q.range).await?)
    }
}

// ==============================================================================
// tests
// ==============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Measurement;
    use crate::store::{MeasurementStore, MemoryStore};
    use chrono::{Duration, TimeZone};
    use std::sync::Arc;

    fn query(field: Option<&str>, start: Option<&str>, end: Option<&str>) -> MeasurementQuery {
        MeasurementQuery {
            field: field.map(String::from),
            start_date: start.map(String::from),
            end_date: end.map(String::from),
        }
    }

    #[test]
    fn test_field_defaults_to_temperature() {
        let q = query(None, None, None).validate().unwrap();
        assert_eq!(q.field, Field::Temperature);
        assert_eq!(q.range, DateRange::default());
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = query(Some("pressure"), None, None).validate().unwrap_err();
        assert_eq!(err.rejected_value(), Some("pressure"));
        assert!(err.to_string().contains("temperature, humidity, co2"));

        let err = query(Some(""), None, None).validate().unwrap_err();
        assert!(matches!(err, QueryError::InvalidField(_)));
    }

    #[test]
    fn test_bad_dates_name_the_bound() {
        let err = query(None, Some("yesterday"), Some("2024-01-02")).validate().unwrap_err();
        assert_eq!(err.to_string(), "Invalid start_date format");

        let err = query(None, Some("2024-01-01"), Some("2024-13-45")).validate().unwrap_err();
        assert_eq!(err.to_string(), "Invalid end_date format");
    }

    #[test]
    fn test_empty_dates_are_ignored() {
        let q = query(Some("co2"), Some(""), Some("  ")).validate().unwrap();
        assert_eq!(q.range, DateRange::default());
    }

    #[test]
    fn test_date_formats() {
        let noon = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        assert_eq!(parse_date("2024-01-01T12:00:00Z"), Some(noon));
        assert_eq!(parse_date("2024-01-01T12:00:00.000Z"), Some(noon));
        assert_eq!(parse_date("2024-01-01T14:00:00+02:00"), Some(noon));
        assert_eq!(parse_date("2024-01-01T12:00:00"), Some(noon));
        assert_eq!(parse_date("2024-01-01T12:00"), Some(noon));
        assert_eq!(parse_date("2024-01-01 12:00:00"), Some(noon));
        assert_eq!(parse_date("2024-01-01"), Some(noon - Duration::hours(12)));
        assert_eq!(parse_date("01/01/2024"), None);
        assert_eq!(parse_date("2024-02-30"), None);
    }

    #[test]
    fn test_reduced_precision_dates() {
        let noon = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        assert_eq!(parse_date("2024-01-01T12:00Z"), Some(noon));
        assert_eq!(parse_date("2024-01-01T14:00+02:00"), Some(noon));
        assert_eq!(parse_date("2024-01-01T07:00-05:00"), Some(noon));
        assert_eq!(parse_date("2024-03"), Some(Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()));
        assert_eq!(parse_date("2024"), Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()));
        assert_eq!(parse_date("2024-13"), None);
        assert_eq!(parse_date("2024-1"), None);
        assert_eq!(parse_date("24"), None);
        assert_eq!(parse_date("2024-01-01T12:00Y"), None);
    }

    #[tokio::test]
    async fn test_validation_precedes_store_access() {
        let service = QueryService::new(Arc::new(MemoryStore::new()));
        let err = service.series(&query(Some("pressure"), None, None)).await.unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_single_day_window() {
        let store = Arc::new(MemoryStore::new());
        let noon = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        store
            .insert_many(&[
                Measurement { timestamp: noon, temperature: 21.0, humidity: 50.0, co2: 500.0 },
                Measurement { timestamp: noon + Duration::days(3), temperature: 22.0, humidity: 51.0, co2: 600.0 },
            ])
            .await
            .unwrap();
        let service = QueryService::new(store);

        let rows = service
            .series(&query(Some("co2"), Some("2024-01-01"), Some("2024-01-02")))
            .await
            .unwrap();
        assert_eq!(
            serde_json::to_value(&rows).unwrap(),
            serde_json::json!([{"timestamp": "2024-01-01T12:00:00.000Z", "co2": 500.0}])
        );
    }

    #[tokio::test]
    async fn test_metrics_count_exceeds_series_cap() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let records: Vec<_> = (0..300)
            .map(|i| Measurement {
                timestamp: start + Duration::hours(i),
                temperature: 20.0,
                humidity: 50.0,
                co2: 400.0,
            })
            .collect();
        let service = QueryService::new(Arc::new(MemoryStore::with_records(records)));
        let q = query(Some("humidity"), None, None);

        assert_eq!(service.series(&q).await.unwrap().len(), 100);
        assert_eq!(service.metrics(&q).await.unwrap().count, 300);
    }

    #[tokio::test]
    async fn test_no_match_gives_zeroed_metrics() {
        let service = QueryService::new(Arc::new(MemoryStore::new()));
        let metrics = service
            .metrics(&query(Some("temperature"), Some("2030-01-01"), None))
            .await
            .unwrap();
        assert_eq!(metrics, Metrics::zero());
    }
}
