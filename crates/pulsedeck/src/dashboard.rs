//! In-memory per-host state a dashboard view keeps between renders.
//!
//! Channel messages are merged in as they arrive; the view reads snapshots
//! whenever it redraws. Multiple views can share one state behind an `Arc`.

use dashmap::DashMap;
use tracing::debug;

use pulsedeck_types::{ServerMessage, SystemMetrics};

/// Latest known state of one monitored host.
#[derive(Debug, Clone, PartialEq)]
pub struct HostState {
    pub metrics: SystemMetrics,
    /// Epoch seconds of the last update that mentioned this host.
    pub last_seen: f64,
    pub online: bool,
}

/// Roll-up across all known hosts.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DashboardSummary {
    pub total_hosts: usize,
    pub online_hosts: usize,
    /// Averages over online hosts only.
    pub avg_cpu: f64,
    pub avg_memory: f64,
}

/// Live per-host dashboard state fed by channel messages.
#[derive(Debug, Default)]
pub struct DashboardState {
    hosts: DashMap<String, HostState>,
}

impl DashboardState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one channel message.
    ///
    /// Returns the cache keys the server asked to invalidate, so the caller
    /// can forward them to its cache layer; empty for every other message
    /// type.
    pub fn apply(&self, msg: &ServerMessage) -> Vec<String> {
        match msg {
            ServerMessage::MetricsUpdate {
                hostname,
                metrics,
                timestamp,
            } => {
                self.hosts.insert(
                    hostname.clone(),
                    HostState {
                        metrics: metrics.clone(),
                        last_seen: *timestamp,
                        online: true,
                    },
                );
                debug!(hostname = %hostname, "host metrics merged");
                Vec::new()
            }
            ServerMessage::HostOffline {
                hostname,
                timestamp,
            } => {
                if let Some(mut host) = self.hosts.get_mut(hostname) {
                    host.online = false;
                    if let Some(ts) = timestamp {
                        host.last_seen = *ts;
                    }
                }
                debug!(hostname = %hostname, "host marked offline");
                Vec::new()
            }
            ServerMessage::CacheInvalidation { cache_keys, .. } => cache_keys.clone(),
            _ => Vec::new(),
        }
    }

    /// Snapshot of one host.
    pub fn host(&self, hostname: &str) -> Option<HostState> {
        self.hosts.get(hostname).map(|h| h.value().clone())
    }

    pub fn hostnames(&self) -> Vec<String> {
        self.hosts.iter().map(|e| e.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    /// Aggregate across all hosts; averages cover online hosts only.
    pub fn summary(&self) -> DashboardSummary {
        let mut summary = DashboardSummary {
            total_hosts: self.hosts.len(),
            ..Default::default()
        };
        let mut cpu_total = 0.0;
        let mut memory_total = 0.0;
        for host in self.hosts.iter() {
            if host.online {
                summary.online_hosts += 1;
                cpu_total += host.metrics.cpu_percent;
                memory_total += host.metrics.memory_percent;
            }
        }
        if summary.online_hosts > 0 {
            summary.avg_cpu = cpu_total / summary.online_hosts as f64;
            summary.avg_memory = memory_total / summary.online_hosts as f64;
        }
        summary
    }

    /// Drop all host state, e.g. when the owning view unmounts.
    pub fn clear(&self) {
        self.hosts.clear();
    }
}
