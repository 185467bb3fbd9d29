// Integration tests for the producer and aggregator over a shared store
//
// These tests verify the end-to-end loop:
// - Round-robin sensor assignment across ticks
// - Latest-N windows, newest first
// - Idempotent refreshes when nothing was written
// - Stale snapshots while the store is down, and recovery afterwards
// - Malformed records skipped without failing the refresh
// - Producer shutdown and survival of store outages

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::json;
use tokio::sync::watch;

use factory_stream::{
    Aggregator, Clock, FixedClock, MemoryReadingStore, Producer, ProducerSettings, RawRecord,
    ReadingGenerator, ReadingStore, SensorReading, SequentialIdGenerator, StoreError,
    StoredReading, ValueProfile,
};

const T0: i64 = 1_705_314_600_000;

// Store wrapper whose calls can be switched to fail
struct SwitchableStore {
    inner: MemoryReadingStore,
    down: AtomicBool,
}

impl SwitchableStore {
    fn new() -> Self {
        Self {
            inner: MemoryReadingStore::with_id_generator(Box::new(SequentialIdGenerator::new())),
            down: AtomicBool::new(false),
        }
    }

    fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.down.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("connection refused".to_string()))
        } else {
            Ok(())
        }
    }
}

impl ReadingStore for SwitchableStore {
    async fn append(&self, reading: &SensorReading) -> Result<StoredReading, StoreError> {
        self.check()?;
        self.inner.append(reading).await
    }

    async fn query_latest(&self, limit: usize) -> Result<Vec<RawRecord>, StoreError> {
        self.check()?;
        self.inner.query_latest(limit).await
    }
}

fn at(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap()
}

fn clock() -> Arc<dyn Clock> {
    Arc::new(FixedClock::from_epoch_millis(T0 + 60_000))
}

fn reading(index: u32, millis: i64, value: f64, is_defect: bool) -> SensorReading {
    SensorReading {
        sensor_id: format!("SENSOR_{:03}", index),
        value,
        is_defect,
        timestamp: at(millis),
    }
}

fn producer(
    store: Arc<SwitchableStore>,
    sensors: u32,
    probability: f64,
    settings: ProducerSettings,
) -> Producer<Arc<SwitchableStore>, StdRng> {
    let generator = ReadingGenerator::new(
        sensors,
        probability,
        ValueProfile::default(),
        StdRng::seed_from_u64(42),
    )
    .unwrap();
    Producer::new(
        store,
        generator,
        Arc::new(FixedClock::from_epoch_millis(T0)),
        settings,
    )
}

fn fast_settings() -> ProducerSettings {
    ProducerSettings {
        interval: Duration::from_millis(5),
        backoff: Duration::from_millis(5),
    }
}

#[tokio::test]
async fn test_five_ticks_over_three_sensors() {
    let store = Arc::new(SwitchableStore::new());
    let mut producer = producer(Arc::clone(&store), 3, 0.0, fast_settings());

    for _ in 0..5 {
        producer.tick().await.unwrap();
    }

    let mut aggregator = Aggregator::new(Arc::clone(&store), clock());
    let snapshot = aggregator.refresh(10).await;

    // Newest first, so read the sequence back to front
    let sensors: Vec<&str> = snapshot
        .readings
        .iter()
        .rev()
        .map(|r| r.reading.sensor_id.as_str())
        .collect();
    assert_eq!(
        sensors,
        vec!["SENSOR_001", "SENSOR_002", "SENSOR_003", "SENSOR_001", "SENSOR_002"]
    );
    assert!(snapshot.readings.iter().all(|r| !r.reading.is_defect));
    assert_eq!(snapshot.view.status.total, 5);
    assert_eq!(snapshot.view.status.defect, 0);
}

#[tokio::test]
async fn test_refresh_returns_latest_window() {
    let store = Arc::new(SwitchableStore::new());
    for k in 1..=5 {
        store
            .append(&reading(k, T0 + k as i64 * 1_000, 75.0, false))
            .await
            .unwrap();
    }

    let mut aggregator = Aggregator::new(Arc::clone(&store), clock());
    let snapshot = aggregator.refresh(2).await;

    let timestamps: Vec<DateTime<Utc>> =
        snapshot.readings.iter().map(|r| r.reading.timestamp).collect();
    assert_eq!(timestamps, vec![at(T0 + 5_000), at(T0 + 4_000)]);
    assert!(!snapshot.stale);
}

#[tokio::test]
async fn test_refresh_is_idempotent_without_writes() {
    let store = Arc::new(SwitchableStore::new());
    for k in 1..=4 {
        store
            .append(&reading(k, T0 + k as i64 * 500, 95.0, k % 2 == 0))
            .await
            .unwrap();
    }

    let mut aggregator = Aggregator::new(Arc::clone(&store), clock());
    let first = aggregator.refresh(50).await;
    let second = aggregator.refresh(50).await;

    assert_eq!(first, second);
    assert_eq!(second.view.status.defect, 2);
}

#[tokio::test]
async fn test_outage_serves_stale_snapshot_then_recovers() {
    let store = Arc::new(SwitchableStore::new());
    store.append(&reading(1, T0, 74.0, false)).await.unwrap();

    let mut aggregator = Aggregator::new(Arc::clone(&store), clock());
    let good = aggregator.refresh(50).await;
    assert!(!good.stale);

    store.set_down(true);
    let stale = aggregator.refresh(50).await;
    assert!(stale.stale);
    assert_eq!(stale.readings, good.readings);
    assert!(stale
        .last_error
        .as_deref()
        .unwrap()
        .contains("connection refused"));

    store.set_down(false);
    store.append(&reading(2, T0 + 1_000, 76.0, false)).await.unwrap();
    let recovered = aggregator.refresh(50).await;
    assert!(!recovered.stale);
    assert_eq!(recovered.readings.len(), 2);
    assert_eq!(recovered.last_error, None);
}

#[tokio::test]
async fn test_outage_before_first_success_is_empty_and_stale() {
    let store = Arc::new(SwitchableStore::new());
    store.set_down(true);

    let mut aggregator = Aggregator::new(Arc::clone(&store), clock());
    let snapshot = aggregator.refresh(50).await;

    assert!(snapshot.stale);
    assert!(snapshot.readings.is_empty());
    assert!(aggregator.last_good().is_none());
}

#[tokio::test]
async fn test_fields_round_trip_through_store() {
    let store = Arc::new(SwitchableStore::new());
    let written = reading(17, T0 + 123, 97.123456789, true);
    store.append(&written).await.unwrap();

    let mut aggregator = Aggregator::new(Arc::clone(&store), clock());
    let snapshot = aggregator.refresh(1).await;

    let read = &snapshot.readings[0].reading;
    assert_eq!(read.sensor_id, written.sensor_id);
    assert_eq!(read.value, written.value);
    assert_eq!(read.is_defect, written.is_defect);
    assert_eq!(read.timestamp, written.timestamp);
}

#[tokio::test]
async fn test_malformed_records_are_skipped() {
    let store = Arc::new(SwitchableStore::new());
    store.append(&reading(1, T0, 74.0, false)).await.unwrap();
    store
        .inner
        .push_raw(RawRecord::new(
            "junk-1",
            json!({"sensor_id": "SENSOR_002", "sensor_value": "hot", "target_value": 0, "timestamp": "2024-01-15T10:30:05Z"}),
        ))
        .unwrap();
    store
        .inner
        .push_raw(RawRecord::new("junk-2", json!(["not", "an", "object"])))
        .unwrap();

    let mut aggregator = Aggregator::new(Arc::clone(&store), clock());
    let snapshot = aggregator.refresh(50).await;

    assert!(!snapshot.stale);
    assert_eq!(snapshot.skipped, 2);
    assert_eq!(snapshot.readings.len(), 1);
    assert_eq!(snapshot.readings[0].reading.sensor_id, "SENSOR_001");
}

#[tokio::test]
async fn test_producer_stops_on_shutdown() {
    let store = Arc::new(SwitchableStore::new());
    let producer = producer(Arc::clone(&store), 3, 0.05, fast_settings());

    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn(producer.run(rx));

    tokio::time::sleep(Duration::from_millis(60)).await;
    tx.send(true).unwrap();

    let report = tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("producer should stop promptly")
        .unwrap();

    assert!(report.written > 0);
    assert_eq!(report.failed, 0);
    assert_eq!(store.inner.len() as u64, report.written);
}

#[tokio::test]
async fn test_producer_survives_outage_without_skipping_sensors() {
    let store = Arc::new(SwitchableStore::new());
    store.set_down(true);
    let producer = producer(Arc::clone(&store), 3, 0.0, fast_settings());

    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn(producer.run(rx));

    tokio::time::sleep(Duration::from_millis(40)).await;
    store.set_down(false);
    tokio::time::sleep(Duration::from_millis(60)).await;
    tx.send(true).unwrap();

    let report = tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("producer should stop promptly")
        .unwrap();
    assert!(report.failed > 0);
    assert!(report.written > 0);

    let mut aggregator = Aggregator::new(Arc::clone(&store), clock());
    let snapshot = aggregator.refresh(1_000).await;

    // Failed ticks never advanced the cycle
    let oldest = snapshot.readings.last().unwrap();
    assert_eq!(oldest.reading.sensor_id, "SENSOR_001");
}
