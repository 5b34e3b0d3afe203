//! Council ports
//!
//! The council is a closed set of roles. Each role is a trait so adapters can
//! be swapped, and the orchestrator holds one direct reference per role
//! through [`Council`]; there is no runtime discovery.
//!
//! | Role | Produces |
//! |------|----------|
//! | Planner | [`PlanDraft`] from an objective (and failure feedback when re-planning) |
//! | Architect | [`Blueprint`] elaborating a draft |
//! | Reflector | [`Critique`] of draft + blueprint, [`Verification`] of task results |
//! | Executor | [`ToolInvocation`] for one task |

use crate::resilience::{Classify, FailureClass};
use async_trait::async_trait;
use overmind_domain::{
    Blueprint, Critique, PlanDraft, PlanFeedback, PlanIssue, Task, ToolInvocation, Verification,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CouncilRole {
    Planner,
    Architect,
    Reflector,
    Executor,
}

impl CouncilRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            CouncilRole::Planner => "planner",
            CouncilRole::Architect => "architect",
            CouncilRole::Reflector => "reflector",
            CouncilRole::Executor => "executor",
        }
    }

    /// Name of the circuit breaker guarding calls to this role.
    pub fn breaker_name(&self) -> String {
        format!("council:{}", self.as_str())
    }
}

impl std::fmt::Display for CouncilRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Errors a council member can report.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CouncilError {
    #[error("{role} unavailable: {message}")]
    Unavailable { role: CouncilRole, message: String },

    #[error("{role} produced invalid output: {message}")]
    InvalidOutput { role: CouncilRole, message: String },
}

impl CouncilError {
    pub fn unavailable(role: CouncilRole, message: impl Into<String>) -> Self {
        CouncilError::Unavailable {
            role,
            message: message.into(),
        }
    }

    pub fn invalid_output(role: CouncilRole, message: impl Into<String>) -> Self {
        CouncilError::InvalidOutput {
            role,
            message: message.into(),
        }
    }
}

impl Classify for CouncilError {
    fn failure_class(&self) -> FailureClass {
        match self {
            CouncilError::Unavailable { .. } => FailureClass::Transient,
            CouncilError::InvalidOutput { .. } => FailureClass::Permanent,
        }
    }
}

#[async_trait]
pub trait Planner: Send + Sync {
    /// Propose a plan. `feedback` is set when re-planning after failures.
    async fn propose(
        &self,
        objective: &str,
        feedback: Option<&PlanFeedback>,
    ) -> Result<PlanDraft, CouncilError>;
}

#[async_trait]
pub trait Architect: Send + Sync {
    async fn elaborate(&self, draft: &PlanDraft) -> Result<Blueprint, CouncilError>;
}

#[async_trait]
pub trait Reflector: Send + Sync {
    /// Approve or reject a plan. `issues` are structural problems already
    /// found in the draft's dependency graph.
    async fn critique(
        &self,
        draft: &PlanDraft,
        blueprint: &Blueprint,
        issues: &[PlanIssue],
    ) -> Result<Critique, CouncilError>;

    /// Check a tool result against the task's intent.
    async fn verify(&self, task: &Task, output: &Value) -> Result<Verification, CouncilError>;
}

#[async_trait]
pub trait Executor: Send + Sync {
    /// Carry out one task. Tool failures are reported in the invocation,
    /// not as an error.
    async fn execute(&self, task: &Task, timeout: Duration) -> ToolInvocation;
}

/// The full council, one member per role.
#[derive(Clone)]
pub struct Council {
    pub planner: Arc<dyn Planner>,
    pub architect: Arc<dyn Architect>,
    pub reflector: Arc<dyn Reflector>,
    pub executor: Arc<dyn Executor>,
}

impl Council {
    pub fn new(
        planner: Arc<dyn Planner>,
        architect: Arc<dyn Architect>,
        reflector: Arc<dyn Reflector>,
        executor: Arc<dyn Executor>,
    ) -> Self {
        Self {
            planner,
            architect,
            reflector,
            executor,
        }
    }
}

impl std::fmt::Debug for Council {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Council").finish_non_exhaustive()
    }
}
