//! Aggregates derived from one window of readings
//!
//! [`AggregateView`] is a pure function of the readings and the value profile,
//! so the same window always yields the same view. Anything measured against
//! the wall clock lives in [`Liveness`] instead, computed per refresh.

use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::{DateTime, Duration, Timelike, Utc};
use serde::Serialize;

use crate::domain::{sensor_index, StoredReading};
use crate::generator::ValueProfile;

/// Last seen at most this long ago: online
pub const ONLINE_WITHIN_MS: i64 = 10_000;
/// Last seen at most this long ago: warning; older is offline
pub const WARNING_WITHIN_MS: i64 = 30_000;

/// Normal vs defect counts over the window
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct StatusCounts {
    pub total: usize,
    pub normal: usize,
    pub defect: usize,
    pub defect_ratio: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorHealth {
    Online,
    Warning,
    Offline,
}

impl SensorHealth {
    pub fn classify(last_seen: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        let age = now.signed_duration_since(last_seen);
        if age <= Duration::milliseconds(ONLINE_WITHIN_MS) {
            SensorHealth::Online
        } else if age <= Duration::milliseconds(WARNING_WITHIN_MS) {
            SensorHealth::Warning
        } else {
            SensorHealth::Offline
        }
    }
}

/// Per-sensor frequency row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorStats {
    pub sensor_id: String,
    pub reads: usize,
    pub defects: usize,
    pub last_seen: DateTime<Utc>,
}

/// Defect rate for one UTC hour of the day
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HourlyDefectRate {
    pub hour: u32,
    pub total: usize,
    pub defects: usize,
    pub rate_pct: f64,
}

/// A defective reading surfaced in the alert log
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DefectAlert {
    pub record_id: String,
    pub sensor_id: String,
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct DataFlow {
    pub newest_at: Option<DateTime<Utc>>,
    pub last_normal_at: Option<DateTime<Utc>>,
    pub last_defect_at: Option<DateTime<Utc>>,
}

/// Derived view over the latest window of readings
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct AggregateView {
    pub status: StatusCounts,
    pub sensors: Vec<SensorStats>,
    pub hourly: Vec<HourlyDefectRate>,
    pub alerts: Vec<DefectAlert>,
    pub flow: DataFlow,
}

impl AggregateView {
    /// Build the view from readings already ordered newest first
    pub fn compute(readings: &[StoredReading], profile: &ValueProfile) -> Self {
        Self {
            status: status_counts(readings),
            sensors: sensor_stats(readings),
            hourly: hourly_defect_rates(readings),
            alerts: defect_alerts(readings, profile),
            flow: data_flow(readings),
        }
    }

    pub fn sensor(&self, sensor_id: &str) -> Option<&SensorStats> {
        self.sensors.iter().find(|s| s.sensor_id == sensor_id)
    }
}

pub fn status_counts(readings: &[StoredReading]) -> StatusCounts {
    let total = readings.len();
    let defect = readings.iter().filter(|r| r.reading.is_defect).count();
    let defect_ratio = if total == 0 {
        0.0
    } else {
        defect as f64 / total as f64
    };

    StatusCounts {
        total,
        normal: total - defect,
        defect,
        defect_ratio,
    }
}

/// Read counts per sensor, ordered by sensor number
pub fn sensor_stats(readings: &[StoredReading]) -> Vec<SensorStats> {
    let mut by_sensor: HashMap<&str, SensorStats> = HashMap::new();

    for stored in readings {
        let reading = &stored.reading;
        let stats = by_sensor
            .entry(reading.sensor_id.as_str())
            .or_insert_with(|| SensorStats {
                sensor_id: reading.sensor_id.clone(),
                reads: 0,
                defects: 0,
                last_seen: reading.timestamp,
            });

        stats.reads += 1;
        if reading.is_defect {
            stats.defects += 1;
        }
        if reading.timestamp > stats.last_seen {
            stats.last_seen = reading.timestamp;
        }
    }

    let mut sensors: Vec<SensorStats> = by_sensor.into_values().collect();
    sensors.sort_by(|a, b| compare_sensor_ids(&a.sensor_id, &b.sensor_id));
    sensors
}

fn compare_sensor_ids(a: &str, b: &str) -> Ordering {
    match (sensor_index(a), sensor_index(b)) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

/// 24 buckets, one per UTC hour, including empty hours
pub fn hourly_defect_rates(readings: &[StoredReading]) -> Vec<HourlyDefectRate> {
    let mut totals = [0usize; 24];
    let mut defects = [0usize; 24];

    for stored in readings {
        let hour = stored.reading.timestamp.hour() as usize;
        totals[hour] += 1;
        if stored.reading.is_defect {
            defects[hour] += 1;
        }
    }

    (0..24)
        .map(|hour| HourlyDefectRate {
            hour: hour as u32,
            total: totals[hour],
            defects: defects[hour],
            rate_pct: if totals[hour] > 0 {
                defects[hour] as f64 / totals[hour] as f64 * 100.0
            } else {
                0.0
            },
        })
        .collect()
}

/// Defective readings in window order (newest first)
pub fn defect_alerts(readings: &[StoredReading], profile: &ValueProfile) -> Vec<DefectAlert> {
    readings
        .iter()
        .filter(|stored| stored.reading.is_defect)
        .map(|stored| DefectAlert {
            record_id: stored.record_id.clone(),
            sensor_id: stored.reading.sensor_id.clone(),
            timestamp: stored.reading.timestamp,
            value: stored.reading.value,
            confidence: profile.defect_confidence(stored.reading.value),
        })
        .collect()
}

pub fn data_flow(readings: &[StoredReading]) -> DataFlow {
    let last_where = |defect: bool| {
        readings
            .iter()
            .filter(|r| r.reading.is_defect == defect)
            .map(|r| r.reading.timestamp)
            .max()
    };

    DataFlow {
        newest_at: readings.iter().map(|r| r.reading.timestamp).max(),
        last_normal_at: last_where(false),
        last_defect_at: last_where(true),
    }
}

/// Health of one sensor as of the refresh time
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorLiveness {
    pub sensor_id: String,
    pub health: SensorHealth,
}

/// Wall-clock relative state of the window
///
/// Kept apart from [`AggregateView`]: it changes as time passes even when no
/// reading was written.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Liveness {
    pub assessed_at: Option<DateTime<Utc>>,
    /// Age of the newest reading in milliseconds
    pub latency_ms: Option<i64>,
    /// Same order as [`AggregateView::sensors`]
    pub sensors: Vec<SensorLiveness>,
}

impl Liveness {
    pub fn assess(view: &AggregateView, now: DateTime<Utc>) -> Self {
        Self {
            assessed_at: Some(now),
            latency_ms: view
                .flow
                .newest_at
                .map(|ts| now.signed_duration_since(ts).num_milliseconds()),
            sensors: view
                .sensors
                .iter()
                .map(|stats| SensorLiveness {
                    sensor_id: stats.sensor_id.clone(),
                    health: SensorHealth::classify(stats.last_seen, now),
                })
                .collect(),
        }
    }

    pub fn count(&self, health: SensorHealth) -> usize {
        self.sensors.iter().filter(|s| s.health == health).count()
    }
}
