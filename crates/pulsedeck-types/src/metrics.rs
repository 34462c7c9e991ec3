//! Payload types returned by the metrics data API.
//!
//! Timestamps are epoch seconds as produced by the collectors; helpers
//! convert them to `chrono` types where a human-facing form is needed.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// A single system-level metrics sample for one host.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SystemMetrics {
    #[serde(default)]
    pub cpu_percent: f64,
    #[serde(default)]
    pub memory_percent: f64,
    #[serde(default)]
    pub memory_available_mb: f64,
    #[serde(default)]
    pub memory_used_mb: f64,
}

/// Per-host row of the dashboard overview.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostSummary {
    pub hostname: String,
    #[serde(default)]
    pub current_cpu: f64,
    #[serde(default)]
    pub current_memory: f64,
    #[serde(default)]
    pub last_seen: f64,
    #[serde(default)]
    pub is_online: bool,
    #[serde(default)]
    pub first_seen: Option<f64>,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

impl HostSummary {
    /// Last-seen timestamp as a UTC datetime, if the host has reported at all.
    pub fn last_seen_utc(&self) -> Option<DateTime<Utc>> {
        epoch_secs_to_utc(self.last_seen)
    }
}

/// Dashboard overview payload: one summary row per known host.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SystemOverview {
    #[serde(default)]
    pub hosts_summary: Vec<HostSummary>,
    #[serde(default)]
    pub total_records: u64,
}

/// One chart point in a host's metrics timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelinePoint {
    pub timestamp: f64,
    #[serde(default)]
    pub cpu_percent: f64,
    #[serde(default)]
    pub memory_percent: f64,
    #[serde(default)]
    pub memory_available_mb: f64,
    #[serde(default)]
    pub memory_used_mb: f64,
}

/// Aggregated metrics for a single host over a time window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostMetrics {
    pub hostname: String,
    #[serde(default)]
    pub total_records: u64,
    #[serde(default)]
    pub current_cpu: f64,
    #[serde(default)]
    pub current_memory: f64,
    #[serde(default)]
    pub avg_cpu: f64,
    #[serde(default)]
    pub avg_memory: f64,
    #[serde(default)]
    pub max_cpu: f64,
    #[serde(default)]
    pub max_memory: f64,
    #[serde(default)]
    pub last_seen: Option<f64>,
    #[serde(default)]
    pub first_seen: Option<f64>,
    #[serde(default)]
    pub is_online: bool,
    #[serde(default)]
    pub timeline_data: Vec<TimelinePoint>,
}

impl HostMetrics {
    /// Last-seen timestamp as a UTC datetime.
    pub fn last_seen_utc(&self) -> Option<DateTime<Utc>> {
        self.last_seen.and_then(epoch_secs_to_utc)
    }
}

fn epoch_secs_to_utc(ts: f64) -> Option<DateTime<Utc>> {
    if ts <= 0.0 {
        return None;
    }
    let secs = ts as i64;
    let nanos = ((ts - secs as f64) * 1e9) as u32;
    Utc.timestamp_opt(secs, nanos).single()
}
