//! Status enums for missions, plans, tasks and events.
//!
//! [`MissionStatus::can_transition_to`] is the single definition of the
//! mission state machine. Both the orchestrator and the repositories consult
//! it, so an illegal transition cannot be persisted regardless of who asks.

use crate::core::error::DomainError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Lifecycle status of a mission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MissionStatus {
    #[default]
    Pending,
    Planning,
    Planned,
    Running,
    Adapting,
    Success,
    Failed,
    Canceled,
}

impl MissionStatus {
    pub const ALL: [MissionStatus; 8] = [
        MissionStatus::Pending,
        MissionStatus::Planning,
        MissionStatus::Planned,
        MissionStatus::Running,
        MissionStatus::Adapting,
        MissionStatus::Success,
        MissionStatus::Failed,
        MissionStatus::Canceled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MissionStatus::Pending => "pending",
            MissionStatus::Planning => "planning",
            MissionStatus::Planned => "planned",
            MissionStatus::Running => "running",
            MissionStatus::Adapting => "adapting",
            MissionStatus::Success => "success",
            MissionStatus::Failed => "failed",
            MissionStatus::Canceled => "canceled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            MissionStatus::Success | MissionStatus::Failed | MissionStatus::Canceled
        )
    }

    /// Whether the mission state machine allows moving from `self` to `next`.
    ///
    /// ```text
    /// PENDING → PLANNING → PLANNED → RUNNING → SUCCESS
    ///              │                    │ ╲
    ///              ▼                    ▼  ╲→ ADAPTING → PLANNING
    ///            FAILED               FAILED      └────→ FAILED
    /// any non-terminal → CANCELED
    /// ```
    pub fn can_transition_to(&self, next: MissionStatus) -> bool {
        use MissionStatus::*;

        if self.is_terminal() {
            return false;
        }
        if next == Canceled {
            return true;
        }
        matches!(
            (self, next),
            (Pending, Planning)
                | (Planning, Planned)
                | (Planning, Failed)
                | (Planned, Running)
                | (Running, Success)
                | (Running, Failed)
                | (Running, Adapting)
                | (Adapting, Planning)
                | (Adapting, Failed)
        )
    }
}

impl std::fmt::Display for MissionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for MissionStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MissionStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| DomainError::UnknownStatus(s.to_string()))
    }
}

/// Status of a versioned mission plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    #[default]
    Draft,
    Approved,
    Rejected,
    Superseded,
}

impl PlanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanStatus::Draft => "draft",
            PlanStatus::Approved => "approved",
            PlanStatus::Rejected => "rejected",
            PlanStatus::Superseded => "superseded",
        }
    }
}

impl std::fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PlanStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(PlanStatus::Draft),
            "approved" => Ok(PlanStatus::Approved),
            "rejected" => Ok(PlanStatus::Rejected),
            "superseded" => Ok(PlanStatus::Superseded),
            other => Err(DomainError::UnknownStatus(other.to_string())),
        }
    }
}

/// Status of a single task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting for its dependencies or for admission
    #[default]
    Pending,
    /// Tool call in flight
    Running,
    /// Tool call succeeded and the result was verified
    Success,
    /// Tool call failed, or its result could not be verified
    Failed,
    /// Attempt failed and another attempt is scheduled
    Retry,
    /// Abandoned because the mission re-planned, failed or was canceled
    Skipped,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Success => "success",
            TaskStatus::Failed => "failed",
            TaskStatus::Retry => "retry",
            TaskStatus::Skipped => "skipped",
        }
    }

    /// Terminal task states are immutable once written.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Success | TaskStatus::Failed | TaskStatus::Skipped
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "running" => Ok(TaskStatus::Running),
            "success" => Ok(TaskStatus::Success),
            "failed" => Ok(TaskStatus::Failed),
            "retry" => Ok(TaskStatus::Retry),
            "skipped" => Ok(TaskStatus::Skipped),
            other => Err(DomainError::UnknownStatus(other.to_string())),
        }
    }
}

/// Kind of an entry in the mission event log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    Created,
    StatusChanged,
    PlanProposed,
    PlanApproved,
    PlanRejected,
    TaskStarted,
    TaskSucceeded,
    TaskFailed,
    TaskSkipped,
    AdaptationRequested,
    MissionCompleted,
    MissionFailed,
    MissionCanceled,
}

impl EventType {
    pub const ALL: [EventType; 13] = [
        EventType::Created,
        EventType::StatusChanged,
        EventType::PlanProposed,
        EventType::PlanApproved,
        EventType::PlanRejected,
        EventType::TaskStarted,
        EventType::TaskSucceeded,
        EventType::TaskFailed,
        EventType::TaskSkipped,
        EventType::AdaptationRequested,
        EventType::MissionCompleted,
        EventType::MissionFailed,
        EventType::MissionCanceled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Created => "CREATED",
            EventType::StatusChanged => "STATUS_CHANGED",
            EventType::PlanProposed => "PLAN_PROPOSED",
            EventType::PlanApproved => "PLAN_APPROVED",
            EventType::PlanRejected => "PLAN_REJECTED",
            EventType::TaskStarted => "TASK_STARTED",
            EventType::TaskSucceeded => "TASK_SUCCEEDED",
            EventType::TaskFailed => "TASK_FAILED",
            EventType::TaskSkipped => "TASK_SKIPPED",
            EventType::AdaptationRequested => "ADAPTATION_REQUESTED",
            EventType::MissionCompleted => "MISSION_COMPLETED",
            EventType::MissionFailed => "MISSION_FAILED",
            EventType::MissionCanceled => "MISSION_CANCELED",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EventType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventType::ALL
            .into_iter()
            .find(|event| event.as_str() == s)
            .ok_or_else(|| DomainError::UnknownEventType(s.to_string()))
    }
}
