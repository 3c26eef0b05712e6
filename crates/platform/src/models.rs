//! Wire types for the control plane's v2 JSON API and their conversion into
//! the shared domain types.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use herald_common::types::{ExitInfo, InstanceUsage, LifecycleEvent, Workload};

/// One page of a paginated list endpoint.
///
/// Entity types need not implement `Default`; a missing `resources` array is
/// an empty page.
#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "E: Deserialize<'de>"))]
pub struct Page<E> {
    /// Total number of pages for the query; 0 when nothing matched.
    #[serde(default, alias = "pages")]
    pub total_pages: u32,
    #[serde(default)]
    pub resources: Vec<Resource<E>>,
}

#[derive(Debug, Deserialize)]
pub struct Resource<E> {
    #[serde(default)]
    pub metadata: ResourceMetadata,
    pub entity: E,
}

#[derive(Debug, Default, Deserialize)]
pub struct ResourceMetadata {
    #[serde(default)]
    pub guid: String,
}

#[derive(Debug, Deserialize)]
pub struct AppEntity {
    pub name: String,
    #[serde(default)]
    pub state: String,
    /// MB
    #[serde(default)]
    pub memory: u64,
    /// MB
    #[serde(default)]
    pub disk_quota: u64,
}

impl From<Resource<AppEntity>> for Workload {
    fn from(resource: Resource<AppEntity>) -> Self {
        Workload {
            id: resource.metadata.guid,
            name: resource.entity.name,
            state: resource.entity.state,
            memory_mb: resource.entity.memory,
            disk_mb: resource.entity.disk_quota,
        }
    }
}

/// Response of `/v2/apps/{guid}/stats`, keyed by instance index.
pub type StatsResponse = HashMap<String, InstanceStatsEntry>;

#[derive(Debug, Deserialize)]
pub struct InstanceStatsEntry {
    #[serde(default)]
    pub state: String,
    /// Absent for instances that are down or still starting.
    #[serde(default)]
    pub stats: Option<InstanceStats>,
}

#[derive(Debug, Default, Deserialize)]
pub struct InstanceStats {
    #[serde(default)]
    pub uptime: u64,
    #[serde(default)]
    pub usage: UsageStats,
}

#[derive(Debug, Default, Deserialize)]
pub struct UsageStats {
    #[serde(default)]
    pub cpu: f64,
    #[serde(default)]
    pub mem: u64,
    #[serde(default)]
    pub disk: u64,
    #[serde(default)]
    pub time: Option<String>,
}

/// Convert a stats map into samples ordered by instance index.
pub fn usage_from_stats(workload_id: &str, stats: StatsResponse) -> Vec<InstanceUsage> {
    let mut samples: Vec<InstanceUsage> = stats
        .into_iter()
        .filter_map(|(key, entry)| {
            let Ok(index) = key.parse::<u32>() else {
                tracing::warn!(workload_id, key = %key, "Skipping stats entry with non-numeric index");
                return None;
            };
            let stats = entry.stats.unwrap_or_default();
            Some(InstanceUsage {
                workload_id: workload_id.to_string(),
                index,
                state: entry.state,
                uptime_secs: stats.uptime,
                cpu: stats.usage.cpu,
                memory_bytes: stats.usage.mem,
                disk_bytes: stats.usage.disk,
                sampled_at: stats.usage.time.as_deref().and_then(parse_sample_time),
            })
        })
        .collect();
    samples.sort_by_key(|s| s.index);
    samples
}

/// Stats timestamps are either RFC 3339 or `YYYY-MM-DD HH:MM:SS +ZZZZ`.
fn parse_sample_time(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S %z"))
        .map(|t| t.with_timezone(&Utc))
        .ok()
}

#[derive(Debug, Deserialize)]
pub struct EventEntity {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub actor: Option<String>,
    #[serde(default)]
    pub actor_type: Option<String>,
    #[serde(default)]
    pub actor_name: Option<String>,
    #[serde(default)]
    pub actee_name: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Option<EventMetadata>,
}

/// Crash events put exit details directly here; audit events nest them
/// under `request`.
#[derive(Debug, Default, Deserialize)]
pub struct EventMetadata {
    #[serde(default)]
    pub request: Option<EventRequest>,
    #[serde(default)]
    pub exit_status: Option<serde_json::Value>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub exit_description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct EventRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub exit_status: Option<serde_json::Value>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub exit_description: Option<String>,
}

impl From<EventEntity> for LifecycleEvent {
    fn from(entity: EventEntity) -> Self {
        let metadata = entity.metadata.unwrap_or_default();
        let request = metadata.request.unwrap_or_default();

        let exit = ExitInfo {
            status: value_text(request.exit_status).or_else(|| value_text(metadata.exit_status)),
            reason: non_empty(request.reason).or_else(|| non_empty(metadata.reason)),
            description: non_empty(request.exit_description)
                .or_else(|| non_empty(metadata.exit_description)),
        };

        LifecycleEvent {
            workload_name: non_empty(request.name)
                .or_else(|| non_empty(entity.actee_name))
                .unwrap_or_default(),
            state: non_empty(request.state),
            event_type: entity.event_type,
            timestamp: entity.timestamp,
            actor: entity.actor.unwrap_or_default(),
            actor_name: entity.actor_name.unwrap_or_default(),
            actor_type: entity.actor_type.unwrap_or_default(),
            exit: (!exit.is_empty()).then_some(exit),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn value_text(value: Option<serde_json::Value>) -> Option<String> {
    match value? {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => non_empty(Some(s)),
        other => Some(other.to_string()),
    }
}
