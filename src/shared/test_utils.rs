//! Test utilities for property-based and loop tests
//!
//! `generators` holds proptest strategies for readings and stored documents;
//! `helpers` holds store wrappers that inject failures and latency.

pub mod generators {
    use chrono::{DateTime, Utc};
    use proptest::prelude::*;
    use serde_json::{json, Value};

    use crate::domain::{sensor_key, SensorReading};

    /// Generate a timestamp in epoch milliseconds
    /// Range: 2020-01-01 to 2030-12-31
    pub fn timestamp_ms() -> impl Strategy<Value = i64> {
        1_577_836_800_000i64..1_924_991_999_000i64
    }

    /// Generate a canonical sensor key within `[1, max]`
    pub fn sensor_id(max: u32) -> impl Strategy<Value = String> {
        (1..=max).prop_map(sensor_key)
    }

    /// Generate a complete reading with a value consistent with its flag
    pub fn reading() -> impl Strategy<Value = SensorReading> {
        (sensor_id(300), any::<bool>(), 0.0f64..1.0, timestamp_ms()).prop_map(
            |(sensor_id, is_defect, unit, millis)| SensorReading {
                sensor_id,
                value: if is_defect { 90.0 + unit * 20.0 } else { 70.0 + unit * 10.0 },
                is_defect,
                timestamp: DateTime::<Utc>::from_timestamp_millis(millis).unwrap_or_default(),
            },
        )
    }

    /// Spellings of the defect flag accepted from other producers
    pub fn defect_flag() -> impl Strategy<Value = (Value, bool)> {
        prop_oneof![
            Just((json!(0), false)),
            Just((json!(1), true)),
            Just((json!(false), false)),
            Just((json!(true), true)),
            Just((json!("0"), false)),
            Just((json!("1"), true)),
            Just((json!("true"), true)),
        ]
    }

    /// Documents that must be rejected by normalization
    pub fn malformed_document() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(json!(null)),
            Just(json!([])),
            Just(json!({})),
            Just(json!({"sensor_id": "", "sensor_value": 75.0, "target_value": 0, "timestamp": "2024-01-15T10:30:00Z"})),
            Just(json!({"sensor_id": "SENSOR_001", "sensor_value": "abc", "target_value": 0, "timestamp": "2024-01-15T10:30:00Z"})),
            Just(json!({"sensor_id": "SENSOR_001", "sensor_value": 75.0, "target_value": 7, "timestamp": "2024-01-15T10:30:00Z"})),
            Just(json!({"sensor_id": "SENSOR_001", "sensor_value": 75.0, "target_value": 0, "timestamp": "not a time"})),
            Just(json!({"sensor_id": 12, "sensor_value": 75.0, "target_value": 0, "timestamp": "2024-01-15T10:30:00Z"})),
        ]
    }
}

pub mod helpers {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use crate::domain::{RawRecord, SensorReading, StoredReading};
    use crate::error::StoreError;
    use crate::store::ReadingStore;

    /// Store wrapper whose calls can be switched to fail
    pub struct FlakyStore<S> {
        inner: S,
        failing: AtomicBool,
        reversed: bool,
        append_attempts: AtomicUsize,
    }

    impl<S> FlakyStore<S> {
        pub fn new(inner: S) -> Self {
            Self {
                inner,
                failing: AtomicBool::new(false),
                reversed: false,
                append_attempts: AtomicUsize::new(0),
            }
        }

        /// Return query results oldest first, violating the store ordering
        pub fn reversed(mut self) -> Self {
            self.reversed = true;
            self
        }

        pub fn set_failing(&self, failing: bool) {
            self.failing.store(failing, Ordering::SeqCst);
        }

        pub fn append_attempts(&self) -> usize {
            self.append_attempts.load(Ordering::SeqCst)
        }

        pub fn inner(&self) -> &S {
            &self.inner
        }

        fn check(&self) -> Result<(), StoreError> {
            if self.failing.load(Ordering::SeqCst) {
                Err(StoreError::Unavailable("injected failure".to_string()))
            } else {
                Ok(())
            }
        }
    }

    impl<S: ReadingStore> ReadingStore for FlakyStore<S> {
        async fn append(&self, reading: &SensorReading) -> Result<StoredReading, StoreError> {
            self.append_attempts.fetch_add(1, Ordering::SeqCst);
            self.check()?;
            self.inner.append(reading).await
        }

        async fn query_latest(&self, limit: usize) -> Result<Vec<RawRecord>, StoreError> {
            self.check()?;
            let mut records = self.inner.query_latest(limit).await?;
            if self.reversed {
                records.reverse();
            }
            Ok(records)
        }
    }

    /// Store wrapper that delays every query
    pub struct SlowStore<S> {
        inner: S,
        delay: Duration,
    }

    impl<S> SlowStore<S> {
        pub fn new(inner: S, delay: Duration) -> Self {
            Self { inner, delay }
        }
    }

    impl<S: ReadingStore> ReadingStore for SlowStore<S> {
        async fn append(&self, reading: &SensorReading) -> Result<StoredReading, StoreError> {
            self.inner.append(reading).await
        }

        async fn query_latest(&self, limit: usize) -> Result<Vec<RawRecord>, StoreError> {
            tokio::time::sleep(self.delay).await;
            self.inner.query_latest(limit).await
        }
    }
}
