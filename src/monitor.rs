// Monitor binary entry point: polls the factory log and renders snapshots

mod config;
mod repo;

use std::sync::Arc;

use anyhow::Context;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use config::{ConfigError, Settings, StoreMode};
use factory_stream::{
    ctrl_c_shutdown, shutdown_requested, Aggregator, MemoryReadingStore, Producer,
    ReadingGenerator, ReadingStore, SensorHealth, Snapshot, SystemClock,
};
use repo::DynamoReadingStore;

/// Refresh on a fixed cadence until shutdown
async fn monitor<S: ReadingStore>(
    store: S,
    settings: &Settings,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut aggregator = Aggregator::new(store, Arc::new(SystemClock::new()))
        .with_profile(settings.profile)
        .with_timeout(settings.query_timeout);

    let mut ticker = tokio::time::interval(settings.refresh_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = shutdown_requested(&mut shutdown) => break,
            _ = ticker.tick() => {
                let snapshot = aggregator.refresh(settings.query_limit).await;
                render(&snapshot);
            }
        }
    }

    info!("Monitor stopped");
}

fn render(snapshot: &Snapshot) {
    let view = &snapshot.view;
    let liveness = &snapshot.liveness;

    if snapshot.stale {
        warn!(
            error = snapshot.last_error.as_deref().unwrap_or("unknown"),
            "Showing stale snapshot, store disconnected"
        );
    }

    info!(
        total = view.status.total,
        defect = view.status.defect,
        defect_ratio = view.status.defect_ratio,
        skipped = snapshot.skipped,
        sensors = view.sensors.len(),
        offline = liveness.count(SensorHealth::Offline),
        alerts = view.alerts.len(),
        latency_ms = liveness.latency_ms.unwrap_or(-1),
        stale = snapshot.stale,
        "Snapshot refreshed"
    );

    println!("{}", snapshot);
}

/// In-process demo: a producer and the monitor sharing one memory store
async fn demo(settings: &Settings, shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
    let store = Arc::new(MemoryReadingStore::new());

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
        Arc::clone(&store),
        generator,
        Arc::new(SystemClock::new()),
        settings.producer,
    );
    let producer_task = tokio::spawn(producer.run(shutdown.clone()));

    monitor(store, settings, shutdown).await;

    let report = producer_task.await.context("Demo producer panicked")?;
    info!(written = report.written, "Demo producer finished");
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    let settings = Settings::from_env().context("Failed to load configuration")?;

    info!(
        store_mode = ?settings.store_mode,
        collection = %settings.collection,
        limit = settings.query_limit,
        refresh_ms = settings.refresh_interval.as_millis() as u64,
        "Monitor starting"
    );

    match settings.store_mode {
        StoreMode::Memory => demo(&settings, ctrl_c_shutdown()).await,
        StoreMode::DynamoDb => {
            let client = settings.dynamodb_client().await;
            let store = DynamoReadingStore::new(
                client,
                settings.table_name()?,
                settings.collection.clone(),
            )
            .with_timeout(settings.query_timeout);

            store
                .verify()
                .await
                .map_err(|e| ConfigError::StoreUnreachable(e.to_string()))?;

            // Installed only now so Ctrl-C during startup still kills the process
            monitor(store, &settings, ctrl_c_shutdown()).await;
            Ok(())
        }
    }
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
        error!(error = %format!("{:#}", e), "Monitor failed");
        return Err(e);
    }
    Ok(())
}
