use aws_sdk_dynamodb::Client as DynamoDbClient;
use std::str::FromStr;
use std::time::Duration;

use factory_stream::{
    GeneratorError, ProducerSettings, ValueProfile, DEFAULT_COLLECTION, DEFAULT_DEFECT_PROBABILITY,
    DEFAULT_SENSOR_COUNT,
};

/// Where readings are kept
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreMode {
    /// Hosted DynamoDB table
    DynamoDb,
    /// In-process store, for local demos
    Memory,
}

/// Settings shared by the producer and monitor binaries
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub store_mode: StoreMode,
    /// Factory log table name (required for DynamoDB)
    pub table: Option<String>,
    /// Partition key value grouping the collection
    pub collection: String,
    /// Endpoint override, e.g. DynamoDB Local
    pub endpoint_url: Option<String>,
    pub sensor_count: u32,
    pub defect_probability: f64,
    pub profile: ValueProfile,
    pub producer: ProducerSettings,
    pub producer_seed: Option<u64>,
    pub query_limit: usize,
    pub refresh_interval: Duration,
    pub query_timeout: Duration,
}

impl Settings {
    /// Load settings from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load settings through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let store_mode = match lookup("STORE_MODE").as_deref().map(str::trim) {
            None | Some("") | Some("dynamodb") => StoreMode::DynamoDb,
            Some("memory") => StoreMode::Memory,
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    var: "STORE_MODE",
                    value: other.to_string(),
                })
            }
        };

        let table = lookup("FACTORY_LOG_TABLE").filter(|t| !t.trim().is_empty());
        if store_mode == StoreMode::DynamoDb && table.is_none() {
            return Err(ConfigError::MissingEnvVar("FACTORY_LOG_TABLE".to_string()));
        }

        let collection = lookup("COLLECTION_NAME")
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_COLLECTION.to_string());

        let profile = ValueProfile::new(
            parse_or(&lookup, "VALUE_NORMAL_MIN", 70.0)?,
            parse_or(&lookup, "VALUE_NORMAL_MAX", 80.0)?,
            parse_or(&lookup, "DEFECT_OFFSET_MIN", 20.0)?,
            parse_or(&lookup, "DEFECT_OFFSET_MAX", 30.0)?,
        )?;

        let defect_probability = parse_or(&lookup, "DEFECT_PROBABILITY", DEFAULT_DEFECT_PROBABILITY)?;
        if !(0.0..=1.0).contains(&defect_probability) {
            return Err(GeneratorError::InvalidProbability(defect_probability).into());
        }

        let sensor_count = parse_or(&lookup, "SENSOR_COUNT", DEFAULT_SENSOR_COUNT)?;
        if sensor_count == 0 {
            return Err(GeneratorError::NoSensors.into());
        }

        let query_limit = parse_or(&lookup, "QUERY_LIMIT", 50usize)?;
        if query_limit == 0 {
            return Err(ConfigError::InvalidValue {
                var: "QUERY_LIMIT",
                value: "0".to_string(),
            });
        }

        Ok(Settings {
            store_mode,
            table,
            collection,
            endpoint_url: lookup("DYNAMODB_ENDPOINT_URL").filter(|u| !u.trim().is_empty()),
            sensor_count,
            defect_probability,
            profile,
            producer: ProducerSettings {
                interval: millis_or(&lookup, "PRODUCER_INTERVAL_MS", 2_000)?,
                backoff: millis_or(&lookup, "PRODUCER_BACKOFF_MS", 5_000)?,
            },
            producer_seed: parse_opt(&lookup, "PRODUCER_SEED")?,
            query_limit,
            refresh_interval: millis_or(&lookup, "REFRESH_INTERVAL_MS", 2_000)?,
            query_timeout: millis_or(&lookup, "QUERY_TIMEOUT_MS", 3_000)?,
        })
    }

    /// Reject modes whose store other processes cannot see
    pub fn require_shared_store(&self, binary: &'static str) -> Result<(), ConfigError> {
        match self.store_mode {
            StoreMode::DynamoDb => Ok(()),
            StoreMode::Memory => Err(ConfigError::UnsupportedStoreMode {
                binary,
                mode: "memory",
            }),
        }
    }

    /// Table name, only meaningful in DynamoDB mode
    pub fn table_name(&self) -> Result<&str, ConfigError> {
        self.table
            .as_deref()
            .ok_or_else(|| ConfigError::MissingEnvVar("FACTORY_LOG_TABLE".to_string()))
    }

    /// Build a DynamoDB client with bounded request timeouts
    pub async fn dynamodb_client(&self) -> DynamoDbClient {
        let aws_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .load()
            .await;

        let mut builder = aws_sdk_dynamodb::config::Builder::from(&aws_config).timeout_config(
            aws_sdk_dynamodb::config::timeout::TimeoutConfig::builder()
                .operation_timeout(self.query_timeout)
                .operation_attempt_timeout(self.query_timeout)
                .build(),
        );

        if let Some(endpoint) = &self.endpoint_url {
            builder = builder.endpoint_url(endpoint);
        }

        DynamoDbClient::from_conf(builder.build())
    }
}

fn parse_opt<T, F>(lookup: &F, var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { var, value: raw }),
    }
}

fn parse_or<T, F>(lookup: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    Ok(parse_opt(lookup, var)?.unwrap_or(default))
}

fn millis_or<F>(lookup: &F, var: &'static str, default_ms: u64) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let millis = parse_or(lookup, var, default_ms)?;
    if millis == 0 {
        return Err(ConfigError::InvalidValue {
            var,
            value: "0".to_string(),
        });
    }
    Ok(Duration::from_millis(millis))
}

/// Configuration errors, fatal at startup
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {var}: {value:?}")]
    InvalidValue { var: &'static str, value: String },

    #[error("Invalid generator settings: {0}")]
    Generator(#[from] GeneratorError),

    #[error("Store unreachable at startup: {0}")]
    StoreUnreachable(String),

    #[error("STORE_MODE={mode} is not supported by the {binary}")]
    UnsupportedStoreMode {
        binary: &'static str,
        mode: &'static str,
    },
}
