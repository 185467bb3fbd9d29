//! Synthetic producer loop
//!
//! Writes one reading per tick until told to stop. Store failures never end
//! the loop: the failed tick is logged and retried for the same sensor after
//! a backoff pause.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::domain::StoredReading;
use crate::error::StoreError;
use crate::generator::ReadingGenerator;
use crate::store::ReadingStore;
use crate::time::Clock;

pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProducerSettings {
    /// Pause between successful ticks
    pub interval: Duration,
    /// Pause after a failed append
    pub backoff: Duration,
}

impl Default for ProducerSettings {
    fn default() -> Self {
        Self {
            interval: DEFAULT_TICK_INTERVAL,
            backoff: DEFAULT_BACKOFF,
        }
    }
}

/// Outcome counters of a producer run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProducerReport {
    pub written: u64,
    pub failed: u64,
}

pub struct Producer<S, R> {
    store: S,
    generator: ReadingGenerator<R>,
    clock: Arc<dyn Clock>,
    settings: ProducerSettings,
    last_timestamp: Option<DateTime<Utc>>,
}

impl<S: ReadingStore, R: Rng + Send> Producer<S, R> {
    pub fn new(
        store: S,
        generator: ReadingGenerator<R>,
        clock: Arc<dyn Clock>,
        settings: ProducerSettings,
    ) -> Self {
        Self {
            store,
            generator,
            clock,
            settings,
            last_timestamp: None,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn generator(&self) -> &ReadingGenerator<R> {
        &self.generator
    }

    /// Generate and append one reading
    ///
    /// The sensor cycle only advances once the store accepted the write.
    pub async fn tick(&mut self) -> Result<StoredReading, StoreError> {
        let timestamp = self.next_timestamp();
        let reading = self.generator.sample(timestamp);

        let stored = self.store.append(&reading).await?;

        self.last_timestamp = Some(timestamp);
        self.generator.advance();
        Ok(stored)
    }

    /// Strictly increasing per producer, even if the clock stalls or steps back
    fn next_timestamp(&self) -> DateTime<Utc> {
        let now = self.clock.now();
        match self.last_timestamp {
            Some(last) if now <= last => last + chrono::Duration::milliseconds(1),
            _ => now,
        }
    }

    /// Tick until `shutdown` flips to true or its sender is dropped
    ///
    /// Shutdown is observed between ticks and during pauses, so an append in
    /// flight always runs to completion.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> ProducerReport {
        let mut report = ProducerReport::default();

        info!(
            sensors = self.generator.cycle().count(),
            interval_ms = self.settings.interval.as_millis() as u64,
            "Producer started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let pause = match self.tick().await {
                Ok(stored) => {
                    report.written += 1;
                    info!(
                        record_id = %stored.record_id,
                        sensor_id = %stored.reading.sensor_id,
                        value = stored.reading.value,
                        defect = stored.reading.is_defect,
                        "Reading stored"
                    );
                    self.settings.interval
                }
                Err(err) => {
                    report.failed += 1;
                    warn!(
                        error = %err,
                        backoff_ms = self.settings.backoff.as_millis() as u64,
                        "Append failed, backing off"
                    );
                    self.settings.backoff
                }
            };

            tokio::select! {
                biased;
                _ = shutdown_requested(&mut shutdown) => break,
                _ = tokio::time::sleep(pause) => {}
            }
        }

        info!(
            written = report.written,
            failed = report.failed,
            "Producer stopped"
        );
        report
    }
}

/// Resolves once the channel holds `true` or its sender is gone
///
/// Other updates, such as re-sending `false`, are ignored.
pub async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    // An Err means the sender was dropped, which also ends the wait
    let _ = shutdown.wait_for(|stop| *stop).await;
}

/// Shutdown channel flipped by Ctrl-C
pub fn ctrl_c_shutdown() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Interrupt received, shutting down");
                let _ = tx.send(true);
            }
            Err(err) => {
                // Keep the sender alive so receivers do not read this as shutdown
                warn!(error = %err, "Unable to listen for interrupt signal");
                std::future::pending::<()>().await;
            }
        }
    });
    rx
}
