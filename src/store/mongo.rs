//! ==============================================================================
//! store/mongo.rs - mongodb-backed measurement store
//! ==============================================================================
//!
//! purpose:
//!     persists measurements in a single `measurements` collection.
//!     concurrency and durability are the database's job; this type is a
//!     cheap, cloneable handle around the driver's connection pool.
//!
//! document layout:
//!     { _id, timestamp: Date, temperature: Double, humidity: Double, co2: Double }
//!     indexed ascending on `timestamp`.
//!
//! relationships:
//!     - implements: store/mod.rs (MeasurementStore)
//!     - created by: main.rs (once, from DatabaseConfig)
//!
//! ==============================================================================

use super::{MeasurementStore, StoreError, FIND_LIMIT};
use crate::config::DatabaseConfig;
use crate::domain::{DateRange, Field, Measurement, Metrics, SeriesPoint};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use futures_util::TryStreamExt;
use mongodb::bson::{doc, Bson, DateTime as BsonDateTime, Document};
use mongodb::options::{ClientOptions, FindOptions};
use mongodb::{Client, Collection, Database, IndexModel};
use std::time::Duration;

/// used when the connection string names no database
pub const DEFAULT_DATABASE: &str = "analytics";
pub const COLLECTION: &str = "measurements";

#[derive(Clone)]
pub struct MongoStore {
    client: Client,
    database: Database,
    collection: Collection<Document>,
    /// bounds the health ping only; regular operations keep the driver's timeouts
    ping_timeout: Duration,
}

/// driver options for `config`; server selection is left to the driver unless configured
async fn client_options(config: &DatabaseConfig) -> Result<ClientOptions, StoreError> {
    let mut options = ClientOptions::parse(&config.uri).await?;
    options.app_name = Some(env!("CARGO_PKG_NAME").to_string());
    if let Some(secs) = config.server_selection_timeout_seconds {
        options.server_selection_timeout = Some(Duration::from_secs(secs));
    }
    Ok(options)
}

impl MongoStore {
    /// parse the uri and build the client; no round trip to the server happens here
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let client = Client::with_options(client_options(config).await?)?;
        let database = client
            .default_database()
            .unwrap_or_else(|| client.database(DEFAULT_DATABASE));
        let collection = database.collection::<Document>(COLLECTION);

        tracing::debug!(database = %database.name(), collection = COLLECTION, "mongo client ready");
        Ok(Self {
            client,
            database,
            collection,
            ping_timeout: Duration::from_secs(config.ping_timeout_seconds),
        })
    }

    pub async fn ping(&self) -> Result<(), StoreError> {
        self.database.run_command(doc! { "ping": 1 }, None).await?;
        Ok(())
    }
}

#[async_trait]
impl MeasurementStore for MongoStore {
    async fn count(&self) -> Result<u64, StoreError> {
        Ok(self.collection.count_documents(None, None).await?)
    }

    async fn insert_many(&self, records: &[Measurement]) -> Result<(), StoreError> {
        // the server rejects empty batches
        if records.is_empty() {
            return Ok(());
        }
        let docs: Vec<Document> = records.iter().map(to_document).collect();
        self.collection.insert_many(docs, None).await?;
        Ok(())
    }

    async fn find(&self, field: Field, range: &DateRange) -> Result<Vec<SeriesPoint>, StoreError> {
        let mut projection = doc! { "_id": 0, "timestamp": 1 };
        projection.insert(field.as_str(), 1);
        let options = FindOptions::builder()
            .projection(projection)
            .sort(doc! { "timestamp": 1 })
            .limit(FIND_LIMIT as i64)
            .build();

        let docs: Vec<Document> = self
            .collection
            .find(range_filter(range), options)
            .await?
            .try_collect()
            .await?;

        docs.iter().map(|d| point_from_document(d, field)).collect()
    }

    async fn aggregate(&self, field: Field, range: &DateRange) -> Result<Metrics, StoreError> {
        let mut cursor = self
            .collection
            .aggregate(metrics_pipeline(field, range), None)
            .await?;

        match cursor.try_next().await? {
            Some(group) => Ok(metrics_from_document(&group)),
            None => Ok(Metrics::zero()),
        }
    }

    async fn is_connected(&self) -> bool {
        match tokio::time::timeout(self.ping_timeout, self.ping()).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                tracing::debug!("mongo ping failed: {}", e);
                false
            }
            Err(_) => {
                tracing::debug!("mongo ping timed out after {:?}", self.ping_timeout);
                false
            }
        }
    }

    async fn prepare(&self) -> Result<(), StoreError> {
        let index = IndexModel::builder().keys(doc! { "timestamp": 1 }).build();
        self.collection.create_index(index, None).await?;
        Ok(())
    }

    async fn close(&self) {
        self.client.clone().shutdown().await;
    }

    fn backend(&self) -> &'static str {
        "mongodb"
    }
}

// ==============================================================================
// document mapping
// ==============================================================================

fn to_bson_datetime(ts: &DateTime<Utc>) -> BsonDateTime {
    BsonDateTime::from_millis(ts.timestamp_millis())
}

fn to_document(m: &Measurement) -> Document {
    doc! {
        "timestamp": to_bson_datetime(&m.timestamp),
        "temperature": m.temperature,
        "humidity": m.humidity,
        "co2": m.co2,
    }
}

fn range_filter(range: &DateRange) -> Document {
    let mut bounds = Document::new();
    if let Some(start) = &range.start {
        bounds.insert("$gte", to_bson_datetime(start));
    }
    if let Some(end) = &range.end {
        bounds.insert("$lte", to_bson_datetime(end));
    }

    if bounds.is_empty() {
        Document::new()
    } else {
        doc! { "timestamp": bounds }
    }
}

fn metrics_pipeline(field: Field, range: &DateRange) -> Vec<Document> {
    let path = format!("${}", field.as_str());
    vec![
        doc! { "$match": range_filter(range) },
        doc! {
            "$group": {
                "_id": Bson::Null,
                "avg": { "$avg": path.as_str() },
                "min": { "$min": path.as_str() },
                "max": { "$max": path.as_str() },
                "stdDev": { "$stdDevPop": path.as_str() },
                "count": { "$sum": 1 },
            }
        },
    ]
}

/// numeric bson of any width; null and missing read as absent
fn number(value: Option<&Bson>) -> Option<f64> {
    match value? {
        Bson::Double(v) => Some(*v),
        Bson::Int32(v) => Some(f64::from(*v)),
        Bson::Int64(v) => Some(*v as f64),
        _ => None,
    }
}

fn point_from_document(doc: &Document, field: Field) -> Result<SeriesPoint, StoreError> {
    let millis = doc
        .get_datetime("timestamp")
        .map_err(|e| StoreError::Malformed(format!("timestamp: {e}")))?
        .timestamp_millis();
    let timestamp = Utc
        .timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| StoreError::Malformed(format!("timestamp out of range: {millis}")))?;
    let value = number(doc.get(field.as_str()))
        .ok_or_else(|| StoreError::Malformed(format!("missing numeric {field}")))?;

    Ok(SeriesPoint { timestamp, field, value })
}

fn metrics_from_document(doc: &Document) -> Metrics {
    let get = |key: &str| number(doc.get(key)).unwrap_or(0.0);
    Metrics {
        avg: get("avg"),
        min: get("min"),
        max: get("max"),
        std_dev: get("stdDev"),
        count: get("count") as u64,
    }
}
