//! Mission status snapshots and progress lines.
//!
//! These are the plain values that cross from the runner side to request
//! handlers: a [`MissionStatusSnapshot`] is what `get_mission_status` returns
//! and a [`ProgressLine`] is one entry of the progress stream.

use overmind_domain::{Mission, MissionId, MissionStatus, Task, TaskStatus};
use serde::{Deserialize, Serialize};

/// Per-status task counts. RETRY counts as pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TaskCounts {
    pub total: usize,
    pub pending: usize,
    pub running: usize,
    pub success: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl TaskCounts {
    pub fn from_tasks(tasks: &[Task]) -> Self {
        let mut counts = TaskCounts {
            total: tasks.len(),
            ..Default::default()
        };
        for task in tasks {
            match task.status {
                TaskStatus::Pending | TaskStatus::Retry => counts.pending += 1,
                TaskStatus::Running => counts.running += 1,
                TaskStatus::Success => counts.success += 1,
                TaskStatus::Failed => counts.failed += 1,
                TaskStatus::Skipped => counts.skipped += 1,
            }
        }
        counts
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissionStatusSnapshot {
    pub mission_id: MissionId,
    pub status: MissionStatus,
    pub tasks: TaskCounts,
    pub is_terminal: bool,
    pub result_summary: Option<String>,
}

impl MissionStatusSnapshot {
    pub fn new(mission: &Mission, tasks: &[Task]) -> Self {
        Self {
            mission_id: mission.id,
            status: mission.status,
            tasks: TaskCounts::from_tasks(tasks),
            is_terminal: mission.status.is_terminal(),
            result_summary: mission.result_summary.clone(),
        }
    }

    /// Whether a progress stream should emit a new line for `self`.
    pub fn differs_from(&self, previous: &MissionStatusSnapshot) -> bool {
        self.status != previous.status || self.tasks != previous.tasks
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressKind {
    /// Status or task counts changed
    Update,
    /// The mission reached a terminal status; last line of the stream
    Terminal,
    /// The poll budget ran out; last line of the stream
    Background,
    /// Status could not be read; last line of the stream
    Unavailable,
}

/// One human-readable progress entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressLine {
    pub mission_id: MissionId,
    pub kind: ProgressKind,
    pub status: Option<MissionStatus>,
    pub text: String,
}

impl ProgressLine {
    pub fn update(snapshot: &MissionStatusSnapshot) -> Self {
        let t = &snapshot.tasks;
        let text = if t.total == 0 {
            format!("Mission {} is {}", snapshot.mission_id, snapshot.status)
        } else {
            format!(
                "Mission {} is {}: {}/{} tasks done ({} running, {} failed)",
                snapshot.mission_id, snapshot.status, t.success, t.total, t.running, t.failed
            )
        };
        Self {
            mission_id: snapshot.mission_id,
            kind: ProgressKind::Update,
            status: Some(snapshot.status),
            text,
        }
    }

    pub fn terminal(snapshot: &MissionStatusSnapshot) -> Self {
        let outcome = match snapshot.status {
            MissionStatus::Success => "completed",
            MissionStatus::Canceled => "was canceled",
            _ => "failed",
        };
        let text = match &snapshot.result_summary {
            Some(summary) if !summary.is_empty() => {
                format!("Mission {} {}: {}", snapshot.mission_id, outcome, summary)
            }
            _ => format!("Mission {} {}", snapshot.mission_id, outcome),
        };
        Self {
            mission_id: snapshot.mission_id,
            kind: ProgressKind::Terminal,
            status: Some(snapshot.status),
            text,
        }
    }

    pub fn background(mission_id: MissionId, status: Option<MissionStatus>) -> Self {
        let text = match status {
            Some(status) => format!(
                "Mission {} continues in the background (currently {})",
                mission_id, status
            ),
            None => format!("Mission {} continues in the background", mission_id),
        };
        Self {
            mission_id,
            kind: ProgressKind::Background,
            status,
            text,
        }
    }

    pub fn unavailable(mission_id: MissionId, reason: impl std::fmt::Display) -> Self {
        Self {
            mission_id,
            kind: ProgressKind::Unavailable,
            status: None,
            text: format!("Status of mission {} is unavailable: {}", mission_id, reason),
        }
    }

    /// Whether this line ends the stream.
    pub fn is_final(&self) -> bool {
        self.kind != ProgressKind::Update
    }
}

impl std::fmt::Display for ProgressLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.text)
    }
}
