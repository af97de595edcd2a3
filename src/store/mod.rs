//! ==============================================================================
//! store/mod.rs - measurement store abstraction
//! ==============================================================================
//!
//! purpose:
//!     the only stateful component. handlers never touch the database driver
//!     directly; they receive an `Arc<dyn MeasurementStore>` built once in main.
//!
//! backends:
//!     - mongo.rs:  MongoDB collection (production)
//!     - memory.rs: in-process vector (tests, running without a database)
//!
//! ==============================================================================

pub mod memory;
pub mod mongo;

use crate::domain::{DateRange, Field, Measurement, Metrics, SeriesPoint};

use async_trait::async_trait;
use std::sync::Arc;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

/// maximum rows returned by `find`; `aggregate` is not capped
pub const FIND_LIMIT: usize = 100;

pub type SharedStore = Arc<dyn MeasurementStore>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{0}")]
    Database(#[from] mongodb::error::Error),
    #[error("malformed document: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait MeasurementStore: Send + Sync {
    /// total number of records
    async fn count(&self) -> Result<u64, StoreError>;

    /// bulk append, no uniqueness enforced
    async fn insert_many(&self, records: &[Measurement]) -> Result<(), StoreError>;

    /// ascending by timestamp, at most [`FIND_LIMIT`] rows, only `field` projected
    async fn find(&self, field: Field, range: &DateRange) -> Result<Vec<SeriesPoint>, StoreError>;

    /// statistics over every matching record, zeroed when nothing matches
    async fn aggregate(&self, field: Field, range: &DateRange) -> Result<Metrics, StoreError>;

    /// live connectivity check, never cached
    async fn is_connected(&self) -> bool;

    /// one-time setup such as index creation
    async fn prepare(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn close(&self) {}

    fn backend(&self) -> &'static str;
}
