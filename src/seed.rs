//! ==============================================================================
//! seed.rs - synthetic measurement generator
//! ==============================================================================
//!
//! two modes:
//!     - bootstrap: 50 uniform-random hourly records, only when the store is empty
//!     - series:    720 hourly records (30 days) of sine + jitter, always appended
//!
//! both walk backwards from `now`, index 0 being the most recent hour.
//! generators take the rng and clock as arguments so tests can pin them.
//!
//! ==============================================================================

use crate::domain::Measurement;
use crate::store::{MeasurementStore, StoreError};

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::Serialize;

pub const BOOTSTRAP_RECORDS: usize = 50;
pub const SERIES_HOURS: usize = 720;
pub const SERIES_TIME_RANGE: &str = "Last 30 days (720 hours)";

/// uniform readings in [20,25) °C, [45,55) %, [400,600) ppm
pub fn bootstrap_batch<R: Rng>(now: DateTime<Utc>, rng: &mut R) -> Vec<Measurement> {
    (0..BOOTSTRAP_RECORDS)
        .map(|i| Measurement {
            timestamp: now - Duration::hours(i as i64),
            temperature: rng.gen_range(20.0..25.0),
            humidity: rng.gen_range(45.0..55.0),
            co2: rng.gen_range(400.0..600.0),
        })
        .collect()
}

/// smooth periodic base per field plus bounded jitter
pub fn synthetic_series<R: Rng>(now: DateTime<Utc>, rng: &mut R) -> Vec<Measurement> {
    (0..SERIES_HOURS)
        .map(|i| {
            let x = i as f64;
            Measurement {
                timestamp: now - Duration::hours(i as i64),
                temperature: 20.0 + 5.0 * (0.1 * x).sin() + rng.gen_range(-1.0..1.0),
                humidity: 50.0 + 15.0 * (0.05 * x).sin() + rng.gen_range(-2.5..2.5),
                co2: 400.0 + 200.0 * (0.02 * x).sin() + rng.gen_range(-50.0..50.0),
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapOutcome {
    Seeded(usize),
    /// store already held this many records
    Skipped(u64),
}

/// idempotent: a non-empty store is left alone
pub async fn bootstrap(store: &dyn MeasurementStore) -> Result<BootstrapOutcome, StoreError> {
    let existing = store.count().await?;
    if existing > 0 {
        return Ok(BootstrapOutcome::Skipped(existing));
    }

    tracing::info!("Generating dummy data...");
    let batch = bootstrap_batch(Utc::now(), &mut rand::thread_rng());
    store.insert_many(&batch).await?;
    Ok(BootstrapOutcome::Seeded(batch.len()))
}

/// body of a successful POST /api/measurements/seed
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SeedReport {
    pub message: String,
    pub count: usize,
    #[serde(rename = "timeRange")]
    pub time_range: String,
}

/// appends a fresh 30-day series; repeated calls keep appending
pub async fn seed_series(store: &dyn MeasurementStore) -> Result<SeedReport, StoreError> {
    // ThreadRng is !Send, so the batch is built before the first await
    let batch = synthetic_series(Utc::now(), &mut rand::thread_rng());
    store.insert_many(&batch).await?;

    Ok(SeedReport {
        message: format!("Successfully added {} test measurements", batch.len()),
        count: batch.len(),
        time_range: SERIES_TIME_RANGE.to_string(),
    })
}

// ==============================================================================
// tests
// ==============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_bootstrap_batch_ranges() {
        let now = Utc::now();
        let batch = bootstrap_batch(now, &mut StdRng::seed_from_u64(7));
        assert_eq!(batch.len(), BOOTSTRAP_RECORDS);
        assert_eq!(batch[0].timestamp, now);
        assert_eq!(batch[49].timestamp, now - Duration::hours(49));
        for m in &batch {
            assert!((20.0..25.0).contains(&m.temperature));
            assert!((45.0..55.0).contains(&m.humidity));
            assert!((400.0..600.0).contains(&m.co2));
        }
    }

    #[test]
    fn test_series_follows_sine_envelope() {
        let now = Utc::now();
        let series = synthetic_series(now, &mut StdRng::seed_from_u64(42));
        assert_eq!(series.len(), SERIES_HOURS);
        assert_eq!(series[719].timestamp, now - Duration::hours(719));

        for (i, m) in series.iter().enumerate() {
            let x = i as f64;
            assert!((m.temperature - (20.0 + 5.0 * (0.1 * x).sin())).abs() <= 1.0);
            assert!((m.humidity - (50.0 + 15.0 * (0.05 * x).sin())).abs() <= 2.5);
            assert!((m.co2 - (400.0 + 200.0 * (0.02 * x).sin())).abs() <= 50.0);
        }
    }

    #[test]
    fn test_series_values_vary_between_runs() {
        let now = Utc::now();
        let a = synthetic_series(now, &mut StdRng::seed_from_u64(1));
        let b = synthetic_series(now, &mut StdRng::seed_from_u64(2));
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_bootstrap_is_idempotent() {
        let store = MemoryStore::new();
        assert_eq!(bootstrap(&store).await.unwrap(), BootstrapOutcome::Seeded(50));
        assert_eq!(bootstrap(&store).await.unwrap(), BootstrapOutcome::Skipped(50));
        assert_eq!(store.count().await.unwrap(), 50);
    }

    #[tokio::test]
    async fn test_seed_series_always_appends() {
        let store = MemoryStore::new();
        for round in 1..=2u64 {
            let report = seed_series(&store).await.unwrap();
            assert_eq!(report.count, 720);
            assert_eq!(store.count().await.unwrap(), 720 * round);
        }
    }

    #[tokio::test]
    async fn test_bootstrap_skips_after_on_demand_seed() {
        let store = MemoryStore::new();
        seed_series(&store).await.unwrap();
        assert_eq!(bootstrap(&store).await.unwrap(), BootstrapOutcome::Skipped(720));
    }
}
