use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, SubsecRound, TimeDelta, Utc};
use thiserror::Error;
use tracing::Instrument;
use uuid::Uuid;

use herald_common::error::RemoteError;
use herald_common::run_state::RunStateStore;
use herald_common::types::{InstanceUsage, LifecycleEvent, Workload};
use herald_notifier::ChatNotifier;
use herald_platform::{EventsError, PlatformApi};

use crate::summary;

/// Default time between cycles (5 minutes).
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(300);

/// Default cap on events listed in one summary.
pub const DEFAULT_MAX_EVENTS: usize = 50;

/// How far before a cycle's start the next window begins. The event filter is
/// a strict `>` on whole seconds.
const WINDOW_OVERLAP_SECS: i64 = 1;

/// A cycle that stopped before a summary was delivered.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("failed to list workloads: {0}")]
    ListWorkloads(#[source] RemoteError),

    #[error("failed to fetch events: {0}")]
    Events(#[source] EventsError),

    #[error("failed to send notification: {0}")]
    Notify(#[source] RemoteError),
}

/// A workload with its instance usage. `usage` is `None` when stats could not
/// be fetched this cycle.
#[derive(Debug, Clone)]
pub struct WorkloadReport {
    pub workload: Workload,
    pub usage: Option<Vec<InstanceUsage>>,
}

/// Everything one successful cycle gathered and sent.
#[derive(Debug, Clone)]
pub struct CycleReport {
    /// Event window lower bound; `None` means all recorded events.
    pub since: Option<DateTime<Utc>>,
    pub workloads: Vec<WorkloadReport>,
    pub events: Vec<LifecycleEvent>,
    pub message: String,
}

/// Polling bot: summarizes workloads and new lifecycle events into one chat
/// message per cycle, then sleeps for a fixed interval.
pub struct Bot {
    platform: Arc<dyn PlatformApi>,
    notifier: Arc<dyn ChatNotifier>,
    run_state: Arc<dyn RunStateStore>,
    channel: String,
    interval: Duration,
    max_events: usize,
}

impl Bot {
    pub fn new(
        platform: Arc<dyn PlatformApi>,
        notifier: Arc<dyn ChatNotifier>,
        run_state: Arc<dyn RunStateStore>,
        channel: impl Into<String>,
    ) -> Self {
        Self {
            platform,
            notifier,
            run_state,
            channel: channel.into(),
            interval: DEFAULT_POLL_INTERVAL,
            max_events: DEFAULT_MAX_EVENTS,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_max_events(mut self, max_events: usize) -> Self {
        self.max_events = max_events;
        self
    }

    /// Start the polling loop. Runs indefinitely until the task is cancelled.
    ///
    /// The first cycle starts immediately; no cycle error stops the loop.
    pub async fn run(&self) {
        tracing::info!(
            channel = %self.channel,
            interval_secs = self.interval.as_secs(),
            "Bot started"
        );

        loop {
            // Outcome is logged inside tick()
            let _ = self.tick().await;
            tokio::time::sleep(self.interval).await;
        }
    }

    /// Run one full cycle: read the run state, poll, notify, persist.
    ///
    /// The cycle's start time, truncated to the second and moved back by one
    /// second, is persisted whether or not the cycle succeeded. The next
    /// window therefore covers events stamped in the same second this cycle
    /// started; an event from that second may be reported twice.
    pub async fn tick(&self) -> Result<CycleReport, CycleError> {
        let span = tracing::info_span!("cycle", cycle_id = %Uuid::new_v4());

        async {
            let started_at = Utc::now();
            let since = self.last_run().await;

            tracing::info!(since = ?since, "Cycle started");
            let result = self.run_cycle(since).await;

            match &result {
                Ok(report) => tracing::info!(
                    workloads = report.workloads.len(),
                    events = report.events.len(),
                    "Cycle completed"
                ),
                Err(CycleError::Events(e)) => tracing::error!(
                    error = %e.source,
                    page = e.page,
                    discarded = e.fetched.len(),
                    "Cycle aborted, discarding partially fetched events"
                ),
                Err(e) => tracing::error!(error = %e, "Cycle aborted"),
            }

            self.persist(window_start(started_at)).await;
            result
        }
        .instrument(span)
        .await
    }

    /// Poll the platform for everything since `since` and send one summary.
    pub async fn run_cycle(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<CycleReport, CycleError> {
        let workloads = self
            .platform
            .list_workloads()
            .await
            .map_err(CycleError::ListWorkloads)?;

        let workloads = self.collect_usage(workloads).await;

        let events = self
            .platform
            .events_since(since)
            .await
            .map_err(CycleError::Events)?;

        let message = summary::compose(since, &workloads, &events, self.max_events);

        self.notifier
            .send(&self.channel, &message)
            .await
            .map_err(CycleError::Notify)?;

        Ok(CycleReport {
            since,
            workloads,
            events,
            message,
        })
    }

    /// Fetch usage for each workload; one failure doesn't affect the others.
    async fn collect_usage(&self, workloads: Vec<Workload>) -> Vec<WorkloadReport> {
        let mut reports = Vec::with_capacity(workloads.len());

        for workload in workloads {
            let usage = match self.platform.instance_usage(&workload.id).await {
                Ok(samples) => Some(samples),
                Err(e) => {
                    tracing::warn!(
                        workload = %workload.name,
                        workload_id = %workload.id,
                        error = %e,
                        "Failed to fetch instance usage"
                    );
                    None
                }
            };
            reports.push(WorkloadReport { workload, usage });
        }

        reports
    }

    /// Last-run timestamp; any failure degrades to "fetch all events".
    async fn last_run(&self) -> Option<DateTime<Utc>> {
        match self.run_state.load().await {
            Ok(Some(at)) => Some(at),
            Ok(None) => {
                tracing::info!("No previous run recorded, fetching all events");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read run state, fetching all events");
                None
            }
        }
    }

    async fn persist(&self, at: DateTime<Utc>) {
        if let Err(e) = self.run_state.save(at).await {
            tracing::warn!(error = %e, "Failed to persist run state");
        }
    }
}

/// Lower bound of the next event window for a cycle started at `started_at`.
fn window_start(started_at: DateTime<Utc>) -> DateTime<Utc> {
    started_at.trunc_subsecs(0) - TimeDelta::seconds(WINDOW_OVERLAP_SECS)
}
