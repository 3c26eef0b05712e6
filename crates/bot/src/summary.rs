//! Slack mrkdwn rendering of a cycle's findings.

use std::fmt::Write;

use chrono::{DateTime, Utc};

use herald_common::types::{InstanceUsage, LifecycleEvent, Workload};

use crate::bot::WorkloadReport;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

/// Render one summary message for workloads and events gathered in a cycle.
///
/// At most `max_events` events are listed; the rest are counted.
pub fn compose(
    since: Option<DateTime<Utc>>,
    workloads: &[WorkloadReport],
    events: &[LifecycleEvent],
    max_events: usize,
) -> String {
    let window = match since {
        Some(at) => format!("since {}", at.format(TIME_FORMAT)),
        None => "across all recorded history".to_string(),
    };

    let mut out = format!(
        "*Platform summary*: {} {}, {} {} {}\n",
        workloads.len(),
        plural(workloads.len(), "workload", "workloads"),
        events.len(),
        plural(events.len(), "event", "events"),
        window,
    );

    out.push_str("\n*Workloads*\n");
    if workloads.is_empty() {
        out.push_str("_No workloads found._\n");
    }
    for report in workloads {
        write_workload(&mut out, report);
    }

    out.push_str("\n*Events*\n");
    if events.is_empty() {
        out.push_str("_No new events._\n");
    }
    for event in events.iter().take(max_events) {
        write_event(&mut out, event);
    }
    if events.len() > max_events {
        let _ = writeln!(out, "_...and {} more_", events.len() - max_events);
    }

    out.trim_end().to_string()
}

fn write_workload(out: &mut String, report: &WorkloadReport) {
    let workload = &report.workload;
    let _ = writeln!(
        out,
        "• *{}* {} (memory {} MB, disk {} MB)",
        workload.name, workload.state, workload.memory_mb, workload.disk_mb
    );

    match &report.usage {
        None => out.push_str("    stats unavailable\n"),
        Some(samples) if samples.is_empty() => out.push_str("    no running instances\n"),
        Some(samples) => {
            for sample in samples {
                write_instance(out, workload, sample);
            }
        }
    }
}

fn write_instance(out: &mut String, workload: &Workload, sample: &InstanceUsage) {
    let _ = writeln!(
        out,
        "    #{} {}, up {}, cpu {:.2}%, memory {:.1} MB ({}), disk {:.1} MB ({})",
        sample.index,
        sample.state,
        format_duration(sample.uptime_secs),
        sample.cpu * 100.0,
        sample.memory_mb(),
        format_percent(sample.memory_percent(workload)),
        sample.disk_mb(),
        format_percent(sample.disk_percent(workload)),
    );
}

fn write_event(out: &mut String, event: &LifecycleEvent) {
    let name: &str = if event.workload_name.is_empty() {
        "unknown"
    } else {
        &event.workload_name
    };
    let _ = write!(
        out,
        "• {} `{}` {}",
        event.timestamp.format(TIME_FORMAT),
        name,
        event.event_type
    );
    if let Some(state) = &event.state {
        let _ = write!(out, " -> {state}");
    }
    if !event.actor_name.is_empty() || !event.actor_type.is_empty() {
        let _ = write!(out, " by {} ({})", event.actor_name, event.actor_type);
    }
    out.push('\n');

    if let Some(exit) = &event.exit {
        let mut parts = Vec::new();
        if let Some(status) = &exit.status {
            parts.push(format!("exit status {status}"));
        }
        if let Some(reason) = &exit.reason {
            parts.push(format!("reason {reason}"));
        }
        let mut line = parts.join(", ");
        if let Some(description) = &exit.description {
            if !line.is_empty() {
                line.push_str(": ");
            }
            line.push_str(description);
        }
        let _ = writeln!(out, "    {line}");
    }
}

fn format_percent(percent: Option<f64>) -> String {
    match percent {
        Some(p) => format!("{p:.1}%"),
        None => "n/a".to_string(),
    }
}

fn plural<'a>(count: usize, one: &'a str, many: &'a str) -> &'a str {
    if count == 1 { one } else { many }
}

/// Format seconds into a human-readable duration.
fn format_duration(secs: u64) -> String {
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else if secs < 86_400 {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    } else {
        format!("{}d {}h", secs / 86_400, (secs % 86_400) / 3600)
    }
}
