//! Normalization of stored documents into typed readings
//!
//! Documents come from any producer writing to the collection, so every field
//! is checked. A document that fails any check is rejected on its own; the
//! caller decides whether that is fatal (it never is for the aggregator).

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::{Map, Value};

use crate::domain::{RawRecord, SensorReading, StoredReading};
use crate::error::RecordError;

// 2000-01-01T00:00:00Z and 2100-01-01T00:00:00Z in epoch milliseconds
const MIN_TIMESTAMP_MS: i64 = 946_684_800_000;
const MAX_TIMESTAMP_MS: i64 = 4_102_444_800_000;

/// Normalize one raw record into a stored reading
pub fn normalize(raw: &RawRecord) -> Result<StoredReading, RecordError> {
    let document = raw.document.as_object().ok_or(RecordError::NotAnObject)?;

    let sensor_id = parse_sensor_id(required(document, "sensor_id")?)?;
    let value = parse_value(required(document, "sensor_value")?)?;
    let is_defect = parse_defect_flag(required(document, "target_value")?)?;
    let timestamp = parse_timestamp(required(document, "timestamp")?)?;

    Ok(StoredReading {
        record_id: raw.record_id.clone(),
        reading: SensorReading {
            sensor_id,
            value,
            is_defect,
            timestamp,
        },
    })
}

/// Best-effort timestamp of a document, used for ordering by stores
pub fn document_timestamp(document: &Value) -> Option<DateTime<Utc>> {
    document
        .get("timestamp")
        .and_then(|value| parse_timestamp(value).ok())
}

fn required<'a>(document: &'a Map<String, Value>, field: &'static str) -> Result<&'a Value, RecordError> {
    match document.get(field) {
        None | Some(Value::Null) => Err(RecordError::MissingField(field)),
        Some(value) => Ok(value),
    }
}

fn parse_sensor_id(value: &Value) -> Result<String, RecordError> {
    let id = value
        .as_str()
        .ok_or_else(|| RecordError::invalid("sensor_id", "must be a string"))?
        .trim();

    if id.is_empty() {
        return Err(RecordError::invalid("sensor_id", "must not be empty"));
    }

    Ok(id.to_string())
}

fn parse_value(value: &Value) -> Result<f64, RecordError> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .ok_or_else(|| RecordError::invalid("sensor_value", "must be numeric"))?;

    if !number.is_finite() {
        return Err(RecordError::invalid("sensor_value", "must be finite"));
    }

    Ok(number)
}

/// Accepts 0/1, booleans and their string spellings
fn parse_defect_flag(value: &Value) -> Result<bool, RecordError> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Number(n) => match n.as_f64() {
            Some(x) if x == 0.0 => Ok(false),
            Some(x) if x == 1.0 => Ok(true),
            _ => Err(RecordError::invalid("target_value", format!("expected 0 or 1, got {}", n))),
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "0" | "false" => Ok(false),
            "1" | "true" => Ok(true),
            other => Err(RecordError::invalid(
                "target_value",
                format!("expected 0 or 1, got {:?}", other),
            )),
        },
        _ => Err(RecordError::invalid("target_value", "must be 0 or 1")),
    }
}

/// Accepts RFC3339 strings, naive ISO strings (read as UTC) and epoch milliseconds
fn parse_timestamp(value: &Value) -> Result<DateTime<Utc>, RecordError> {
    match value {
        Value::String(s) => parse_timestamp_str(s.trim()),
        Value::Number(n) => {
            let millis = n
                .as_i64()
                .ok_or_else(|| RecordError::invalid("timestamp", "epoch millis must be an integer"))?;
            if !(MIN_TIMESTAMP_MS..=MAX_TIMESTAMP_MS).contains(&millis) {
                return Err(RecordError::invalid(
                    "timestamp",
                    format!("epoch millis {} outside 2000..2100", millis),
                ));
            }
            DateTime::from_timestamp_millis(millis)
                .ok_or_else(|| RecordError::invalid("timestamp", "epoch millis out of range"))
        }
        _ => Err(RecordError::invalid("timestamp", "must be a string or epoch millis")),
    }
}

fn parse_timestamp_str(s: &str) -> Result<DateTime<Utc>, RecordError> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(s) {
        return Ok(parsed.with_timezone(&Utc));
    }

    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(s, format).ok())
        .map(|naive| naive.and_utc())
        .ok_or_else(|| RecordError::invalid("timestamp", format!("unrecognized format {:?}", s)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(document: Value) -> RawRecord {
        RawRecord::new("rec-1", document)
    }

    fn valid_document() -> Value {
        json!({
            "sensor_id": "SENSOR_042",
            "sensor_value": 93.5,
            "target_value": 1,
            "timestamp": "2024-01-15T10:30:00.250Z"
        })
    }

    #[test]
    fn test_normalize_valid_document() {
        let stored = normalize(&raw(valid_document())).unwrap();

        assert_eq!(stored.record_id, "rec-1");
        assert_eq!(stored.reading.sensor_id, "SENSOR_042");
        assert_eq!(stored.reading.value, 93.5);
        assert!(stored.reading.is_defect);
        assert_eq!(stored.reading.timestamp.timestamp_millis(), 1_705_314_600_250);
    }

    #[test]
    fn test_normalize_rejects_non_object() {
        assert_eq!(normalize(&raw(json!([1, 2, 3]))), Err(RecordError::NotAnObject));
        assert_eq!(normalize(&raw(json!("text"))), Err(RecordError::NotAnObject));
    }

    #[test]
    fn test_missing_fields() {
        for field in ["sensor_id", "sensor_value", "target_value", "timestamp"] {
            let mut doc = valid_document();
            doc.as_object_mut().unwrap().remove(field);
            assert_eq!(
                normalize(&raw(doc)).unwrap_err(),
                RecordError::MissingField(field),
                "field {}",
                field
            );
        }
    }

    #[test]
    fn test_null_field_is_missing() {
        let mut doc = valid_document();
        doc["sensor_value"] = Value::Null;
        assert_eq!(
            normalize(&raw(doc)).unwrap_err(),
            RecordError::MissingField("sensor_value")
        );
    }

    #[test]
    fn test_sensor_id_validation() {
        assert_eq!(parse_sensor_id(&json!(" SENSOR_001 ")).unwrap(), "SENSOR_001");
        assert!(parse_sensor_id(&json!("")).is_err());
        assert!(parse_sensor_id(&json!("   ")).is_err());
        assert!(parse_sensor_id(&json!(17)).is_err());
    }

    #[test]
    fn test_value_parsing() {
        assert_eq!(parse_value(&json!(75)).unwrap(), 75.0);
        assert_eq!(parse_value(&json!(75.5)).unwrap(), 75.5);
        assert_eq!(parse_value(&json!("101.25")).unwrap(), 101.25);
        assert!(parse_value(&json!("abc")).is_err());
        assert!(parse_value(&json!("NaN")).is_err());
        assert!(parse_value(&json!("inf")).is_err());
        assert!(parse_value(&json!(true)).is_err());
    }

    #[test]
    fn test_defect_flag_parsing() {
        assert!(!parse_defect_flag(&json!(0)).unwrap());
        assert!(parse_defect_flag(&json!(1)).unwrap());
        assert!(parse_defect_flag(&json!(1.0)).unwrap());
        assert!(parse_defect_flag(&json!(true)).unwrap());
        assert!(!parse_defect_flag(&json!("false")).unwrap());
        assert!(parse_defect_flag(&json!("1")).unwrap());
        assert!(parse_defect_flag(&json!(2)).is_err());
        assert!(parse_defect_flag(&json!("maybe")).is_err());
        assert!(parse_defect_flag(&json!([1])).is_err());
    }

    #[test]
    fn test_timestamp_formats() {
        let expected = 1_705_314_600_000;

        let rfc = parse_timestamp(&json!("2024-01-15T10:30:00Z")).unwrap();
        assert_eq!(rfc.timestamp_millis(), expected);

        let offset = parse_timestamp(&json!("2024-01-15T19:30:00+09:00")).unwrap();
        assert_eq!(offset.timestamp_millis(), expected);

        let iso_naive = parse_timestamp(&json!("2024-01-15T10:30:00.000123")).unwrap();
        assert_eq!(iso_naive.timestamp_millis(), expected);

        let spaced = parse_timestamp(&json!("2024-01-15 10:30:00")).unwrap();
        assert_eq!(spaced.timestamp_millis(), expected);

        let millis = parse_timestamp(&json!(expected)).unwrap();
        assert_eq!(millis.timestamp_millis(), expected);
    }

    #[test]
    fn test_timestamp_rejections() {
        assert!(parse_timestamp(&json!("yesterday")).is_err());
        assert!(parse_timestamp(&json!(0)).is_err());
        assert!(parse_timestamp(&json!(-5)).is_err());
        assert!(parse_timestamp(&json!(5_000_000_000_000i64)).is_err());
        assert!(parse_timestamp(&json!(1.5e12)).is_err());
        assert!(parse_timestamp(&json!({"seconds": 1})).is_err());
    }

    #[test]
    fn test_round_trip_from_reading() {
        let reading = SensorReading {
            sensor_id: "SENSOR_123".to_string(),
            value: 77.123456789,
            is_defect: false,
            timestamp: DateTime::from_timestamp_millis(1_705_314_600_123).unwrap(),
        };

        let stored = normalize(&RawRecord::from_reading("rec-9", &reading)).unwrap();

        assert_eq!(stored.reading, reading);
    }

    #[test]
    fn test_document_timestamp() {
        assert!(document_timestamp(&valid_document()).is_some());
        assert!(document_timestamp(&json!({"timestamp": "bad"})).is_none());
        assert!(document_timestamp(&json!({})).is_none());
    }

    mod properties {
        use super::*;
        use crate::test_utils::generators;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_generated_readings_normalize_unchanged(reading in generators::reading()) {
                let stored = normalize(&RawRecord::from_reading("rec-p", &reading)).unwrap();
                prop_assert_eq!(stored.record_id, "rec-p");
                prop_assert_eq!(stored.reading, reading);
            }

            #[test]
            fn prop_defect_flag_spellings((flag, expected) in generators::defect_flag()) {
                let mut document = valid_document();
                document["target_value"] = flag;
                let stored = normalize(&raw(document)).unwrap();
                prop_assert_eq!(stored.reading.is_defect, expected);
            }

            #[test]
            fn prop_malformed_documents_rejected(document in generators::malformed_document()) {
                prop_assert!(normalize(&raw(document)).is_err());
            }

            #[test]
            fn prop_epoch_millis_in_range_accepted(millis in generators::timestamp_ms()) {
                let parsed = parse_timestamp(&json!(millis)).unwrap();
                prop_assert_eq!(parsed.timestamp_millis(), millis);
            }
        }
    }
}
