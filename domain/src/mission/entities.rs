//! Mission domain entities.
//!
//! These are the persisted shapes of the event-sourced mission model. All
//! structured payloads are [`serde_json::Value`] so they travel through the
//! system as native values and are encoded only at the storage boundary.

use super::status::{EventType, MissionStatus, PlanStatus, TaskStatus};
use super::value_objects::{EventId, MissionId, PlanId, TaskId, TaskKey};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Top-level unit of work derived from an objective.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mission {
    pub id: MissionId,
    pub objective: String,
    pub status: MissionStatus,
    pub initiator_id: i64,
    /// The single plan currently driving execution
    pub active_plan_id: Option<PlanId>,
    /// Human-readable outcome, set once the mission is terminal
    pub result_summary: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Mission {
    /// First `max_chars` characters of the objective, with an ellipsis when cut.
    pub fn objective_excerpt(&self, max_chars: usize) -> String {
        excerpt(&self.objective, max_chars)
    }
}

/// Truncates on a character boundary and appends `…` when shortened.
pub fn excerpt(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_string();
    }
    let mut out: String = trimmed.chars().take(max_chars).collect();
    out.push('…');
    out
}

/// A versioned, council-reviewed decomposition of a mission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissionPlan {
    pub id: PlanId,
    pub mission_id: MissionId,
    /// Strictly increasing per mission, starting at 1
    pub version: u32,
    pub status: PlanStatus,
    pub rationale: String,
    pub stats: Value,
    pub warnings: Value,
    pub raw_plan: Value,
    pub telemetry: Value,
    pub created_at: DateTime<Utc>,
}

/// Plan contents before the repository assigns an id and version.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMissionPlan {
    pub mission_id: MissionId,
    pub status: PlanStatus,
    pub rationale: String,
    pub stats: Value,
    pub warnings: Value,
    pub raw_plan: Value,
    pub telemetry: Value,
}

/// An atomic unit of work bound to one tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub mission_id: MissionId,
    pub plan_id: PlanId,
    pub task_key: TaskKey,
    pub description: String,
    pub tool_name: String,
    pub tool_args: Value,
    /// Keys of tasks that must be SUCCESS before this one may run
    pub dependencies: Vec<TaskKey>,
    pub status: TaskStatus,
    pub attempts: u32,
    pub result: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// A pending task is ready once every dependency key is in `succeeded`.
    pub fn is_ready(&self, succeeded: impl Fn(&TaskKey) -> bool) -> bool {
        self.status == TaskStatus::Pending && self.dependencies.iter().all(succeeded)
    }
}

/// Task contents before the repository assigns an id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTask {
    pub mission_id: MissionId,
    pub plan_id: PlanId,
    pub task_key: TaskKey,
    pub description: String,
    pub tool_name: String,
    pub tool_args: Value,
    pub dependencies: Vec<TaskKey>,
}

/// Append-only entry of the mission audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissionEvent {
    pub id: EventId,
    pub mission_id: MissionId,
    pub event_type: EventType,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

/// A mission with its tasks, plans and events attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissionDetails {
    pub mission: Mission,
    pub plans: Vec<MissionPlan>,
    pub tasks: Vec<Task>,
    pub events: Vec<MissionEvent>,
}

impl MissionDetails {
    pub fn active_plan(&self) -> Option<&MissionPlan> {
        let active = self.mission.active_plan_id?;
        self.plans.iter().find(|p| p.id == active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(deps: &[&str], status: TaskStatus) -> Task {
        let now = Utc::now();
        Task {
            id: TaskId::new(1),
            mission_id: MissionId::new(1),
            plan_id: PlanId::new(1),
            task_key: TaskKey::new("b"),
            description: "second".to_string(),
            tool_name: "echo".to_string(),
            tool_args: Value::Null,
            dependencies: deps.iter().map(|d| TaskKey::new(*d)).collect(),
            status,
            attempts: 0,
            result: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_task_readiness() {
        let t = task(&["a"], TaskStatus::Pending);
        assert!(!t.is_ready(|_| false));
        assert!(t.is_ready(|k| k.as_str() == "a"));

        let running = task(&[], TaskStatus::Running);
        assert!(!running.is_ready(|_| true));
    }

    #[test]
    fn test_excerpt() {
        assert_eq!(excerpt("  build X  ", 20), "build X");
        assert_eq!(excerpt("abcdef", 3), "abc…");
        assert_eq!(excerpt("ääää", 2), "ää…");
    }
}
