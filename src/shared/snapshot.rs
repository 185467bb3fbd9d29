//! Pull-based aggregation of the latest readings
//!
//! [`Aggregator::refresh`] is the single read operation offered to the
//! presentation layer. It has no timer of its own; the caller decides the
//! cadence.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use crate::aggregate::{AggregateView, Liveness, SensorHealth};
use crate::domain::StoredReading;
use crate::error::StoreError;
use crate::generator::ValueProfile;
use crate::record::normalize;
use crate::store::ReadingStore;
use crate::time::Clock;

pub const DEFAULT_QUERY_LIMIT: usize = 50;
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(3);

/// Materialized view of the latest readings
///
/// Never mutated after construction; shared as `Arc<Snapshot>`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    /// Normalized readings, newest first
    pub readings: Vec<StoredReading>,
    /// Aggregates of `readings`; identical for identical windows
    pub view: AggregateView,
    /// Sensor health and latency as of the most recent refresh attempt
    pub liveness: Liveness,
    /// Records dropped because they failed normalization
    pub skipped: usize,
    /// Carried over from an earlier refresh after a failed query
    pub stale: bool,
    /// When the underlying data was successfully read
    pub refreshed_at: DateTime<Utc>,
    /// Error of the most recent failed refresh, set on stale snapshots
    pub last_error: Option<String>,
}

impl Snapshot {
    /// Empty stale placeholder served before any refresh has succeeded
    pub fn unavailable(at: DateTime<Utc>, error: &StoreError) -> Self {
        Self {
            readings: Vec::new(),
            view: AggregateView::default(),
            liveness: Liveness::assess(&AggregateView::default(), at),
            skipped: 0,
            stale: true,
            refreshed_at: at,
            last_error: Some(error.to_string()),
        }
    }

    /// Carry the snapshot over a failed refresh; liveness keeps ageing
    fn into_stale(mut self, error: &StoreError, now: DateTime<Utc>) -> Self {
        self.liveness = Liveness::assess(&self.view, now);
        self.stale = true;
        self.last_error = Some(error.to_string());
        self
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = &self.view.status;
        writeln!(
            f,
            "[{}] total={} normal={} defect={} ({:.1}%) skipped={}{}",
            self.refreshed_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            status.total,
            status.normal,
            status.defect,
            status.defect_ratio * 100.0,
            self.skipped,
            if self.stale { " STALE" } else { "" },
        )?;
        writeln!(
            f,
            "sensors online={} warning={} offline={} latency={}",
            self.liveness.count(SensorHealth::Online),
            self.liveness.count(SensorHealth::Warning),
            self.liveness.count(SensorHealth::Offline),
            match self.liveness.latency_ms {
                Some(ms) => format!("{}ms", ms),
                None => "-".to_string(),
            },
        )?;
        writeln!(
            f,
            "{:<24} {:<12} {:>10} {:<7}",
            "timestamp", "sensor", "value", "status"
        )?;
        for stored in &self.readings {
            let reading = &stored.reading;
            writeln!(
                f,
                "{:<24} {:<12} {:>10.2} {:<7}",
                reading.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
                reading.sensor_id,
                reading.value,
                if reading.is_defect { "DEFECT" } else { "normal" },
            )?;
        }
        Ok(())
    }
}

/// Polls a store and keeps the last good snapshot
pub struct Aggregator<S> {
    store: S,
    clock: Arc<dyn Clock>,
    profile: ValueProfile,
    timeout: Duration,
    last_good: Option<Arc<Snapshot>>,
}

impl<S: ReadingStore> Aggregator<S> {
    pub fn new(store: S, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            profile: ValueProfile::default(),
            timeout: DEFAULT_QUERY_TIMEOUT,
            last_good: None,
        }
    }

    pub fn with_profile(mut self, profile: ValueProfile) -> Self {
        self.profile = profile;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Last successful snapshot, if any
    pub fn last_good(&self) -> Option<Arc<Snapshot>> {
        self.last_good.clone()
    }

    /// Read the latest `limit` records and rebuild the snapshot
    ///
    /// On a failed or timed-out query the previous good snapshot is returned
    /// flagged stale; it is never replaced by an empty one.
    pub async fn refresh(&mut self, limit: usize) -> Arc<Snapshot> {
        match self.query(limit).await {
            Ok(snapshot) => {
                let snapshot = Arc::new(snapshot);
                self.last_good = Some(Arc::clone(&snapshot));
                snapshot
            }
            Err(err) => {
                warn!(error = %err, limit, "Refresh failed, serving last good snapshot");
                let stale = match &self.last_good {
                    Some(previous) => Snapshot::clone(previous).into_stale(&err, self.clock.now()),
                    None => Snapshot::unavailable(self.clock.now(), &err),
                };
                Arc::new(stale)
            }
        }
    }

    async fn query(&self, limit: usize) -> Result<Snapshot, StoreError> {
        let records = tokio::time::timeout(self.timeout, self.store.query_latest(limit))
            .await
            .map_err(|_| StoreError::Timeout(self.timeout))??;

        let mut skipped = 0;
        let mut readings = Vec::with_capacity(records.len());
        for raw in &records {
            match normalize(raw) {
                Ok(reading) => readings.push(reading),
                Err(err) => {
                    skipped += 1;
                    debug!(record_id = %raw.record_id, error = %err, "Skipping malformed record");
                }
            }
        }

        // Store order is not trusted; ties fall back to the record id
        readings.sort_by(|a, b| {
            b.reading
                .timestamp
                .cmp(&a.reading.timestamp)
                .then_with(|| b.record_id.cmp(&a.record_id))
        });

        if skipped > 0 {
            warn!(skipped, total = records.len(), "Skipped malformed records");
        }

        let now = self.clock.now();
        let view = AggregateView::compute(&readings, &self.profile);
        Ok(Snapshot {
            liveness: Liveness::assess(&view, now),
            view,
            readings,
            skipped,
            stale: false,
            refreshed_at: now,
            last_error: None,
        })
    }
}
