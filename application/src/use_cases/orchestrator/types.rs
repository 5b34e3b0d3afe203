//! Type definitions for the orchestrator use case.

use crate::ports::council::CouncilError;
use crate::ports::mission_repository::RepositoryError;
use crate::resilience::{Classify, FailureClass, ResilienceError};
use overmind_domain::{MissionId, MissionPlan, MissionStatus, TaskId, TaskKey, ToolError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Errors that can occur while driving a mission
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OrchestratorError {
    #[error("Plan rejected: {0}")]
    PlanRejected(String),

    #[error("Task '{task}' failed verification: {reason}")]
    VerificationFailed { task: TaskKey, reason: String },

    #[error("Task '{task}' failed: {error}")]
    Tool {
        task: TaskKey,
        error: ResilienceError<ToolError>,
    },

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Council error: {0}")]
    Council(ResilienceError<CouncilError>),

    #[error("Illegal mission transition: {from} -> {to}")]
    InvalidTransition {
        from: MissionStatus,
        to: MissionStatus,
    },

    #[error("Task '{0}' aborted unexpectedly")]
    TaskAborted(TaskKey),

    #[error("Operation cancelled")]
    Cancelled,
}

impl OrchestratorError {
    /// Check if this error represents a cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, OrchestratorError::Cancelled)
    }
}

impl Classify for OrchestratorError {
    fn failure_class(&self) -> FailureClass {
        match self {
            OrchestratorError::Tool { error, .. } => error.failure_class(),
            OrchestratorError::Council(e) => e.failure_class(),
            OrchestratorError::Cancelled => FailureClass::Rejected,
            _ => FailureClass::Permanent,
        }
    }
}

/// How a mission run ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissionOutcome {
    pub mission_id: MissionId,
    pub status: MissionStatus,
    pub summary: String,
    /// Re-planning rounds used
    pub adaptations: u32,
}

/// Result of one planning pass.
pub(super) enum PlanningOutcome {
    Approved(MissionPlan),
    Rejected { rationale: String },
}

/// Result of running an approved plan to quiescence.
pub(super) enum ExecutionOutcome {
    Completed { succeeded: usize },
    Failed { failures: Vec<(TaskKey, String)> },
}

/// What a spawned task hands back to the admission loop.
pub(super) struct TaskReport {
    pub task_id: TaskId,
    pub task_key: TaskKey,
    pub outcome: Result<TaskSuccess, OrchestratorError>,
}

pub(super) struct TaskSuccess {
    pub output: Value,
    pub verification: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_failure_keeps_class() {
        let err = OrchestratorError::Tool {
            task: TaskKey::new("fetch"),
            error: ResilienceError::Inner(ToolError::timeout("fetch")),
        };
        assert_eq!(err.failure_class(), FailureClass::Timeout);
        assert!(err.to_string().starts_with("Task 'fetch' failed"));
    }

    #[test]
    fn test_verification_is_permanent() {
        let err = OrchestratorError::VerificationFailed {
            task: TaskKey::new("a"),
            reason: "empty output".to_string(),
        };
        assert_eq!(err.failure_class(), FailureClass::Permanent);
        assert!(!err.is_cancelled());
    }
}
