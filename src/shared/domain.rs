use chrono::{DateTime, SecondsFormat, Utc};
use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

/// Default collection holding the factory log
pub const DEFAULT_COLLECTION: &str = "factory_log";

/// Format a sensor index as its stable store key, e.g. `SENSOR_007`
pub fn sensor_key(index: u32) -> String {
    format!("SENSOR_{:03}", index)
}

/// Extract the numeric index from a sensor key
///
/// Accepts the canonical `SENSOR_001` form and the lowercase `sensor1` form
/// written by older producers. Used to order sensor tables numerically.
pub fn sensor_index(key: &str) -> Option<u32> {
    static SENSOR_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = SENSOR_REGEX.get_or_init(|| {
        Regex::new(r"^(?i:sensor)_?(\d+)$").expect("Valid regex for sensor key")
    });

    regex
        .captures(key)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// One synthetic sensor data point, immutable once written
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorReading {
    pub sensor_id: String,
    pub value: f64,
    pub is_defect: bool,
    pub timestamp: DateTime<Utc>,
}

impl SensorReading {
    /// Persisted document shape of the factory log
    pub fn to_document(&self) -> FactoryLogDocument {
        FactoryLogDocument {
            sensor_id: self.sensor_id.clone(),
            sensor_value: self.value,
            target_value: u8::from(self.is_defect),
            timestamp: self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

/// A reading together with the identifier the store assigned to it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredReading {
    pub record_id: String,
    #[serde(flatten)]
    pub reading: SensorReading,
}

/// Wire shape of a factory log document
///
/// Field names and types are shared with every other producer and consumer
/// of the collection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FactoryLogDocument {
    pub sensor_id: String,
    pub sensor_value: f64,
    pub target_value: u8,
    pub timestamp: String,
}

/// A document as returned by the store, before normalization
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    pub record_id: String,
    pub document: serde_json::Value,
}

impl RawRecord {
    pub fn new(record_id: impl Into<String>, document: serde_json::Value) -> Self {
        Self {
            record_id: record_id.into(),
            document,
        }
    }

    /// Build a raw record from a reading, as the store would hand it back
    pub fn from_reading(record_id: impl Into<String>, reading: &SensorReading) -> Self {
        let document = serde_json::to_value(reading.to_document()).unwrap_or_default();
        Self::new(record_id, document)
    }
}
