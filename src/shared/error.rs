use std::time::Duration;

use aws_sdk_dynamodb::error::SdkError;
use thiserror::Error;

/// Errors raised by a reading store implementation
///
/// Every variant is treated as transient by the producer and the aggregator:
/// the producer backs off and retries, the aggregator serves its last good
/// snapshot flagged stale.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Store request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl<E> From<SdkError<E>> for StoreError
where
    E: std::error::Error + 'static,
{
    /// Display text of the error and its sources, without SDK debug dumps
    fn from(err: SdkError<E>) -> Self {
        let mut message = format!("DynamoDB error: {}", err);
        let mut source = std::error::Error::source(&err);
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        StoreError::Unavailable(message)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// A stored document that could not be normalized into a reading
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RecordError {
    #[error("Record is not a document object")]
    NotAnObject,

    #[error("Required field missing: {0}")]
    MissingField(&'static str),

    #[error("Invalid value for field {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

impl RecordError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        RecordError::InvalidField {
            field,
            reason: reason.into(),
        }
    }
}

/// Invalid generator parameters, rejected before the producer starts
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeneratorError {
    #[error("Sensor count must be at least 1")]
    NoSensors,

    #[error("Defect probability must be within [0, 1], got {0}")]
    InvalidProbability(f64),

    #[error("Normal value range is empty or not finite: [{min}, {max})")]
    InvalidNormalRange { min: f64, max: f64 },

    #[error("Defect offset range is invalid: [{min}, {max}]")]
    InvalidDefectOffset { min: f64, max: f64 },

    #[error("Defect offset {offset_min} is smaller than the normal range width {width}")]
    NotSeparable { offset_min: f64, width: f64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = RecordError::invalid("sensor_value", "not a number");
        assert_eq!(
            err.to_string(),
            "Invalid value for field sensor_value: not a number"
        );

        let err = StoreError::Timeout(Duration::from_secs(3));
        assert!(err.to_string().contains("3s"));

        let err = GeneratorError::InvalidProbability(1.5);
        assert!(err.to_string().contains("1.5"));
    }

    #[test]
    fn test_store_error_from_sdk_error_uses_display() {
        use aws_sdk_dynamodb::operation::query::QueryError;

        let err: SdkError<QueryError> = SdkError::construction_failure("missing table name");
        let mapped = StoreError::from(err);

        match mapped {
            StoreError::Unavailable(message) => {
                assert!(message.starts_with("DynamoDB error: "));
                assert!(message.contains("missing table name"));
                assert!(!message.contains("ConstructionFailure"));
            }
            other => panic!("Expected Unavailable, got {:?}", other),
        }
    }

    #[test]
    fn test_store_error_from_serde() {
        let parse_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err = StoreError::from(parse_err);
        assert!(matches!(err, StoreError::Serialization(_)));
    }
}
