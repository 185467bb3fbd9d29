//! Shared store contract
//!
//! The producer and the aggregator only ever talk to the store through
//! [`ReadingStore`]: append one immutable record, and read back the latest
//! records ordered by timestamp, newest first.

use std::future::Future;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

use crate::domain::{RawRecord, SensorReading, StoredReading};
use crate::error::StoreError;
use crate::id_generator::{IdGenerator, RandomIdGenerator};
use crate::record::document_timestamp;

pub trait ReadingStore: Send + Sync {
    /// Persist one reading and return it with its store-assigned identifier
    fn append(
        &self,
        reading: &SensorReading,
    ) -> impl Future<Output = Result<StoredReading, StoreError>> + Send;

    /// Up to `limit` records ordered by timestamp descending
    fn query_latest(
        &self,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<RawRecord>, StoreError>> + Send;
}

impl<S: ReadingStore> ReadingStore for Arc<S> {
    async fn append(&self, reading: &SensorReading) -> Result<StoredReading, StoreError> {
        (**self).append(reading).await
    }

    async fn query_latest(&self, limit: usize) -> Result<Vec<RawRecord>, StoreError> {
        (**self).query_latest(limit).await
    }
}

struct Entry {
    sort_key: Option<DateTime<Utc>>,
    record: RawRecord,
}

/// In-process append-only log
///
/// Backs the demo mode of the binaries and the tests. Records are kept in
/// insertion order; ordering by timestamp happens at query time, the same
/// way the hosted store does it.
pub struct MemoryReadingStore {
    entries: RwLock<Vec<Entry>>,
    ids: Box<dyn IdGenerator>,
}

impl Default for MemoryReadingStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryReadingStore {
    pub fn new() -> Self {
        Self::with_id_generator(Box::new(RandomIdGenerator::new()))
    }

    pub fn with_id_generator(ids: Box<dyn IdGenerator>) -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            ids,
        }
    }

    /// Insert a document as-is, bypassing reading serialization
    ///
    /// Lets callers seed documents written by other producers, including
    /// ones that will not normalize.
    pub fn push_raw(&self, record: RawRecord) -> Result<(), StoreError> {
        let sort_key = document_timestamp(&record.document);
        self.write_entries()?.push(Entry { sort_key, record });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn write_entries(&self) -> Result<std::sync::RwLockWriteGuard<'_, Vec<Entry>>, StoreError> {
        self.entries
            .write()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))
    }
}

impl ReadingStore for MemoryReadingStore {
    async fn append(&self, reading: &SensorReading) -> Result<StoredReading, StoreError> {
        let record_id = self.ids.next_id();
        let document = serde_json::to_value(reading.to_document())?;

        self.write_entries()?.push(Entry {
            sort_key: Some(reading.timestamp),
            record: RawRecord::new(record_id.clone(), document),
        });

        Ok(StoredReading {
            record_id,
            reading: reading.clone(),
        })
    }

    async fn query_latest(&self, limit: usize) -> Result<Vec<RawRecord>, StoreError> {
        let entries = self
            .entries
            .read()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))?;

        // Newest first; documents without a usable timestamp sort last
        let mut ordered: Vec<&Entry> = entries.iter().collect();
        ordered.sort_by(|a, b| b.sort_key.cmp(&a.sort_key));

        Ok(ordered
            .into_iter()
            .take(limit)
            .map(|entry| entry.record.clone())
            .collect())
    }
}
