pub mod auth;
pub mod client;
pub mod models;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use herald_common::error::RemoteError;
use herald_common::types::{InstanceUsage, LifecycleEvent, Workload};

pub use client::{EventsError, PlatformClient};

/// Read access to the control plane used by the polling bot.
#[async_trait]
pub trait PlatformApi: Send + Sync {
    /// All workloads visible to the configured user.
    async fn list_workloads(&self) -> Result<Vec<Workload>, RemoteError>;

    /// Current usage of each running instance of one workload.
    async fn instance_usage(&self, workload_id: &str) -> Result<Vec<InstanceUsage>, RemoteError>;

    /// Lifecycle events newer than `threshold` (all events when `None`).
    ///
    /// Events are newest-first within each page; pages are concatenated in
    /// fetch order, so the result is not globally ordered.
    async fn events_since(
        &self,
        threshold: Option<DateTime<Utc>>,
    ) -> Result<Vec<LifecycleEvent>, EventsError>;
}
