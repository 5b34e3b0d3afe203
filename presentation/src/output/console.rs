//! Console output formatter for mission results

use colored::{ColoredString, Colorize};
use overmind_application::{MissionStatusSnapshot, StartMissionOutput};
use overmind_domain::{MissionEvent, MissionStatus};
use serde::Serialize;
use serde_json::Value;

/// Status name colored by outcome.
pub(crate) fn status_label(status: MissionStatus) -> ColoredString {
    let label = status.as_str();
    match status {
        MissionStatus::Success => label.green().bold(),
        MissionStatus::Failed => label.red().bold(),
        MissionStatus::Canceled => label.yellow().bold(),
        _ => label.cyan(),
    }
}

/// Formats mission results for console display
pub struct ConsoleFormatter;

impl ConsoleFormatter {
    pub fn format_started(started: &StartMissionOutput) -> String {
        format!(
            "{} Mission {} queued ({})\n  {} {}\n",
            "->".cyan(),
            started.mission_id.to_string().bold(),
            status_label(started.status),
            "Objective:".cyan().bold(),
            started.objective_excerpt
        )
    }

    pub fn format_status(snapshot: &MissionStatusSnapshot) -> String {
        let t = &snapshot.tasks;
        let mut output = String::new();

        output.push_str(&Self::header(&format!("Mission {}", snapshot.mission_id)));
        output.push_str(&format!(
            "{} {}\n",
            "Status:".cyan().bold(),
            status_label(snapshot.status)
        ));
        output.push_str(&format!(
            "{} {} total, {} pending, {} running, {} succeeded, {} failed, {} skipped\n",
            "Tasks:".cyan().bold(),
            t.total,
            t.pending,
            t.running,
            t.success,
            t.failed,
            t.skipped
        ));
        if let Some(summary) = &snapshot.result_summary {
            output.push_str(&format!("{} {}\n", "Result:".cyan().bold(), summary));
        }
        output
    }

    /// One line per event: time, type and the payload's salient fields.
    pub fn format_events(events: &[MissionEvent]) -> String {
        let mut output = String::new();
        for event in events {
            output.push_str(&format!(
                "{} {:<22} {}\n",
                event.created_at.format("%H:%M:%S%.3f").to_string().dimmed(),
                event.event_type.as_str().bold(),
                Self::payload_summary(&event.payload)
            ));
        }
        if events.is_empty() {
            output.push_str(&format!("{}\n", "(no events)".dimmed()));
        }
        output
    }

    /// Format any result as pretty JSON
    pub fn format_json<T: Serialize>(value: &T) -> String {
        serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
    }

    /// `key=value` pairs of a payload's scalar fields; nested values are
    /// shown as compact JSON.
    fn payload_summary(payload: &Value) -> String {
        match payload {
            Value::Object(map) => map
                .iter()
                .map(|(key, value)| match value {
                    Value::String(s) => format!("{}={}", key, s),
                    other => format!("{}={}", key, other),
                })
                .collect::<Vec<_>>()
                .join(" "),
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }

    fn header(title: &str) -> String {
        format!("{}\n", format!("=== {} ===", title).cyan().bold())
    }
}
