use aws_sdk_dynamodb::error::SdkError;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client as DynamoDbClient;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use factory_stream::{
    IdGenerator, RandomIdGenerator, RawRecord, ReadingStore, SensorReading, StoreError,
    StoredReading, DEFAULT_QUERY_TIMEOUT,
};

/// Factory log backed by a DynamoDB table
///
/// Table layout:
/// - partition key `collection` (S): collection name, e.g. "factory_log"
/// - sort key `ts_record` (S): "{timestamp_ms:013}#{record_id}"
///
/// The zero-padded millisecond prefix makes the sort key order match
/// timestamp order, so the latest-N query is a single descending Query.
pub struct DynamoReadingStore {
    client: DynamoDbClient,
    table: String,
    collection: String,
    ids: Box<dyn IdGenerator>,
    /// Operation timeout the client was built with, reported on SDK timeouts
    timeout: Duration,
}

impl DynamoReadingStore {
    pub fn new(client: DynamoDbClient, table: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            client,
            table: table.into(),
            collection: collection.into(),
            ids: Box::new(RandomIdGenerator::new()),
            timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Confirm the table is reachable with the configured credentials
    pub async fn verify(&self) -> Result<(), StoreError> {
        self.client
            .describe_table()
            .table_name(&self.table)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| sdk_error(e, self.timeout))
    }
}

impl ReadingStore for DynamoReadingStore {
    async fn append(&self, reading: &SensorReading) -> Result<StoredReading, StoreError> {
        let record_id = self.ids.next_id();
        let item = reading_to_item(&self.collection, &record_id, reading)?;

        // Sort keys embed a fresh UUID; the condition only guards against overwrites
        self.client
            .put_item()
            .table_name(&self.table)
            .set_item(Some(item))
            .condition_expression("attribute_not_exists(ts_record)")
            .send()
            .await
            .map_err(|e| sdk_error(e, self.timeout))?;

        Ok(StoredReading {
            record_id,
            reading: reading.clone(),
        })
    }

    async fn query_latest(&self, limit: usize) -> Result<Vec<RawRecord>, StoreError> {
        let mut records = Vec::with_capacity(limit.min(1000));
        if limit == 0 {
            return Ok(records);
        }

        let mut start_key: Option<HashMap<String, AttributeValue>> = None;
        loop {
            let remaining = limit - records.len();
            let page_limit = i32::try_from(remaining).unwrap_or(i32::MAX);

            let output = self
                .client
                .query()
                .table_name(&self.table)
                .key_condition_expression("#collection = :collection")
                .expression_attribute_names("#collection", "collection")
                .expression_attribute_values(
                    ":collection",
                    AttributeValue::S(self.collection.clone()),
                )
                .scan_index_forward(false) // Newest first (descending order)
                .limit(page_limit)
                .set_exclusive_start_key(start_key.take())
                .send()
                .await
                .map_err(|e| sdk_error(e, self.timeout))?;

            records.extend(output.items.unwrap_or_default().into_iter().map(item_to_raw));

            // A page can stop short of the limit when it hits the 1 MB cap
            match output.last_evaluated_key {
                Some(key) if records.len() < limit => start_key = Some(key),
                _ => break,
            }
        }

        records.truncate(limit);
        Ok(records)
    }
}

/// DynamoDB row of the factory log
#[derive(Debug, Serialize)]
struct FactoryLogItem<'a> {
    collection: &'a str,
    ts_record: String,
    record_id: &'a str,
    sensor_id: &'a str,
    sensor_value: f64,
    target_value: u8,
    timestamp: String,
    timestamp_ms: i64,
}

fn sort_key(timestamp_ms: i64, record_id: &str) -> String {
    format!("{:013}#{}", timestamp_ms, record_id)
}

/// Convert a reading to a DynamoDB item
fn reading_to_item(
    collection: &str,
    record_id: &str,
    reading: &SensorReading,
) -> Result<HashMap<String, AttributeValue>, StoreError> {
    let document = reading.to_document();
    let timestamp_ms = reading.timestamp.timestamp_millis();

    let row = FactoryLogItem {
        collection,
        ts_record: sort_key(timestamp_ms, record_id),
        record_id,
        sensor_id: &document.sensor_id,
        sensor_value: document.sensor_value,
        target_value: document.target_value,
        timestamp: document.timestamp,
        timestamp_ms,
    };

    serde_dynamo::to_item(&row).map_err(|e| StoreError::Serialization(e.to_string()))
}

/// Convert a DynamoDB item to a raw record
///
/// Items that cannot be decoded become a null document, which normalization
/// then rejects on its own without failing the rest of the page.
fn item_to_raw(item: HashMap<String, AttributeValue>) -> RawRecord {
    let record_id = item
        .get("record_id")
        .or_else(|| item.get("ts_record"))
        .and_then(|v| v.as_s().ok())
        .cloned()
        .unwrap_or_default();

    let document = match serde_dynamo::from_item::<_, serde_json::Value>(item) {
        Ok(document) => document,
        Err(err) => {
            debug!(record_id = %record_id, error = %err, "Undecodable DynamoDB item");
            serde_json::Value::Null
        }
    };

    RawRecord::new(record_id, document)
}

fn sdk_error<E>(err: SdkError<E>, timeout: Duration) -> StoreError
where
    E: std::error::Error + 'static,
{
    match err {
        SdkError::TimeoutError(_) => StoreError::Timeout(timeout),
        other => StoreError::from(other),
    }
}
