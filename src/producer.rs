// Producer binary entry point

mod config;
mod repo;

use std::sync::Arc;

use anyhow::Context;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{error, info};

use config::{ConfigError, Settings};
use factory_stream::{ctrl_c_shutdown, Producer, ReadingGenerator, ReadingStore, SystemClock};
use repo::DynamoReadingStore;

/// Build the producer for `store` from settings and run it until interrupted
async fn produce<S: ReadingStore>(store: S, settings: &Settings) -> anyhow::Result<()> {
    let rng = match settings.producer_seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let generator = ReadingGenerator::new(
        settings.sensor_count,
        settings.defect_probability,
        settings.profile,
        rng,
    )
    .map_err(ConfigError::from)?;

    let producer = Producer::new(
        store,
        generator,
        Arc::new(SystemClock::new()),
        settings.producer,
    );

    let report = producer.run(ctrl_c_shutdown()).await;
    info!(
        written = report.written,
        failed = report.failed,
        "Producer finished"
    );
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    let settings = Settings::from_env().context("Failed to load configuration")?;

    info!(
        store_mode = ?settings.store_mode,
        collection = %settings.collection,
        sensors = settings.sensor_count,
        defect_probability = settings.defect_probability,
        "Producer starting"
    );

    // A memory store lives in this process only; nothing else could read it
    settings.require_shared_store("producer")?;

    let client = settings.dynamodb_client().await;
    let store = DynamoReadingStore::new(
        client,
        settings.table_name()?,
        settings.collection.clone(),
    )
    .with_timeout(settings.query_timeout);

    // No point retrying forever against a table we cannot reach
    store
        .verify()
        .await
        .map_err(|e| ConfigError::StoreUnreachable(e.to_string()))?;

    produce(store, &settings).await
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    if let Err(e) = run().await {
        error!(error = %format!("{:#}", e), "Producer failed to start");
        return Err(e);
    }
    Ok(())
}
