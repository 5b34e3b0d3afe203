//! Council artifacts: what the planner, architect and reflector exchange.
//!
//! A [`PlanDraft`] is the planner's proposal, a [`Blueprint`] is the
//! architect's elaboration of it, a [`Critique`] is the reflector's verdict
//! on both, and a [`Verification`] is the reflector's check of one task
//! result against the task's intent.

use super::value_objects::TaskKey;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One proposed unit of work inside a draft plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub key: TaskKey,
    pub description: String,
    pub tool_name: String,
    #[serde(default)]
    pub tool_args: Value,
    #[serde(default)]
    pub dependencies: Vec<TaskKey>,
}

impl TaskSpec {
    pub fn new(
        key: impl Into<TaskKey>,
        description: impl Into<String>,
        tool_name: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            description: description.into(),
            tool_name: tool_name.into(),
            tool_args: Value::Null,
            dependencies: Vec::new(),
        }
    }

    pub fn with_args(mut self, args: Value) -> Self {
        self.tool_args = args;
        self
    }

    pub fn with_dependency(mut self, key: impl Into<TaskKey>) -> Self {
        self.dependencies.push(key.into());
        self
    }
}

/// The planner's candidate plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanDraft {
    pub objective: String,
    pub rationale: String,
    /// Tasks in proposal order
    pub tasks: Vec<TaskSpec>,
}

impl PlanDraft {
    pub fn new(objective: impl Into<String>, rationale: impl Into<String>) -> Self {
        Self {
            objective: objective.into(),
            rationale: rationale.into(),
            tasks: Vec::new(),
        }
    }

    pub fn with_task(mut self, task: TaskSpec) -> Self {
        self.tasks.push(task);
        self
    }

    pub fn task(&self, key: &TaskKey) -> Option<&TaskSpec> {
        self.tasks.iter().find(|t| &t.key == key)
    }

    /// Summary numbers stored alongside the persisted plan.
    pub fn stats(&self) -> Value {
        let dependency_edges: usize = self.tasks.iter().map(|t| t.dependencies.len()).sum();
        let mut tools: Vec<&str> = self.tasks.iter().map(|t| t.tool_name.as_str()).collect();
        tools.sort_unstable();
        tools.dedup();
        serde_json::json!({
            "task_count": self.tasks.len(),
            "dependency_edges": dependency_edges,
            "tools": tools,
        })
    }
}

/// Architect's per-task elaboration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlueprintStep {
    pub key: TaskKey,
    /// Execution wave; tasks in the same wave have no dependency on each other
    pub stage: usize,
    pub notes: String,
}

/// The architect's concrete elaboration of a draft.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Blueprint {
    pub steps: Vec<BlueprintStep>,
    pub warnings: Vec<String>,
}

/// Reflector's verdict on a plan and its blueprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Critique {
    pub approved: bool,
    pub rationale: String,
}

impl Critique {
    pub fn approve(rationale: impl Into<String>) -> Self {
        Self {
            approved: true,
            rationale: rationale.into(),
        }
    }

    pub fn reject(rationale: impl Into<String>) -> Self {
        Self {
            approved: false,
            rationale: rationale.into(),
        }
    }
}

/// Reflector's check of a tool result against the task's intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verification {
    pub verified: bool,
    pub reason: String,
}

impl Verification {
    pub fn verified(reason: impl Into<String>) -> Self {
        Self {
            verified: true,
            reason: reason.into(),
        }
    }

    pub fn unverified(reason: impl Into<String>) -> Self {
        Self {
            verified: false,
            reason: reason.into(),
        }
    }
}

/// What the planner is told when it is asked to re-plan after failures.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PlanFeedback {
    /// 1-based adaptation round
    pub adaptation: u32,
    pub succeeded: Vec<TaskKey>,
    /// (task key, reason) for every failed task of the previous round
    pub failures: Vec<(TaskKey, String)>,
}

impl PlanFeedback {
    pub fn summary(&self) -> String {
        self.failures
            .iter()
            .map(|(key, reason)| format!("{}: {}", key, reason))
            .collect::<Vec<_>>()
            .join("; ")
    }
}
