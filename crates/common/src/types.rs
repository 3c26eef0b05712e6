use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Bytes per megabyte as the control plane reports quotas (decimal, not MiB).
pub const BYTES_PER_MB: f64 = 1_000_000.0;

/// A deployed application on the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workload {
    pub id: String,
    pub name: String,
    pub state: String,
    /// Memory quota in MB
    pub memory_mb: u64,
    /// Disk quota in MB
    pub disk_mb: u64,
}

/// Point-in-time resource usage for one running instance of a workload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceUsage {
    pub workload_id: String,
    pub index: u32,
    pub state: String,
    /// Uptime in seconds
    pub uptime_secs: u64,
    /// CPU usage as a fraction (0.5 = half a core)
    pub cpu: f64,
    pub memory_bytes: u64,
    pub disk_bytes: u64,
    pub sampled_at: Option<DateTime<Utc>>,
}

impl InstanceUsage {
    pub fn memory_mb(&self) -> f64 {
        self.memory_bytes as f64 / BYTES_PER_MB
    }

    pub fn disk_mb(&self) -> f64 {
        self.disk_bytes as f64 / BYTES_PER_MB
    }

    /// Memory used as a percentage of the workload's quota.
    pub fn memory_percent(&self, workload: &Workload) -> Option<f64> {
        usage_percent(self.memory_bytes, workload.memory_mb)
    }

    /// Disk used as a percentage of the workload's quota.
    pub fn disk_percent(&self, workload: &Workload) -> Option<f64> {
        usage_percent(self.disk_bytes, workload.disk_mb)
    }
}

/// `(used_bytes / 1e6) / quota_mb * 100`.
///
/// Returns `None` for a zero quota instead of producing an infinity or NaN.
pub fn usage_percent(used_bytes: u64, quota_mb: u64) -> Option<f64> {
    if quota_mb == 0 {
        return None;
    }
    Some(used_bytes as f64 / BYTES_PER_MB / quota_mb as f64 * 100.0)
}

/// Exit details attached to termination-class events (crashes, stops).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitInfo {
    pub status: Option<String>,
    pub reason: Option<String>,
    pub description: Option<String>,
}

impl ExitInfo {
    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.reason.is_none() && self.description.is_none()
    }
}

/// A platform-emitted state change for a workload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub workload_name: String,
    /// Resulting state, when the event carries one
    pub state: Option<String>,
    /// Event type tag (e.g. `app.crash`, `audit.app.stop`)
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub actor: String,
    pub actor_name: String,
    pub actor_type: String,
    /// Present only for termination-class events
    pub exit: Option<ExitInfo>,
}
