//! in-process store with the same find/aggregate semantics as the mongo backend.

use super::{MeasurementStore, StoreError, FIND_LIMIT};
use crate::domain::{DateRange, Field, Measurement, Metrics, SeriesPoint};

use async_trait::async_trait;
use tokio::sync::RwLock;

#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<Vec<Measurement>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn with_records(records: Vec<Measurement>) -> Self {
        Self { records: RwLock::new(records) }
    }
}

#[async_trait]
impl MeasurementStore for MemoryStore {
    async fn count(&self) -> Result<u64, StoreError> {
        Ok(self.records.read().await.len() as u64)
    }

    async fn insert_many(&self, records: &[Measurement]) -> Result<(), StoreError> {
        self.records.write().await.extend_from_slice(records);
        Ok(())
    }

    async fn find(&self, field: Field, range: &DateRange) -> Result<Vec<SeriesPoint>, StoreError> {
        let records = self.records.read().await;
        let mut matched: Vec<&Measurement> =
            records.iter().filter(|m| range.contains(&m.timestamp)).collect();
        // stable sort keeps insertion order for equal timestamps
        matched.sort_by_key(|m| m.timestamp);

        Ok(matched
            .into_iter()
            .take(FIND_LIMIT)
            .map(|m| SeriesPoint { timestamp: m.timestamp, field, value: m.value(field) })
            .collect())
    }

    async fn aggregate(&self, field: Field, range: &DateRange) -> Result<Metrics, StoreError> {
        let records = self.records.read().await;
        let values: Vec<f64> = records
            .iter()
            .filter(|m| range.contains(&m.timestamp))
            .map(|m| m.value(field))
            .collect();
        Ok(Metrics::from_values(&values))
    }

    async fn is_connected(&self) -> bool {
        true
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
