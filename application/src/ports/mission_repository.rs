//! Mission repository port
//!
//! The repository is the sole writer of persisted mission state. Structured
//! fields (plan stats, warnings, raw plan, telemetry, task args and results,
//! event payloads) cross this boundary as [`serde_json::Value`]; an adapter
//! that persists to text encodes exactly once on write and decodes exactly
//! once on read.

use async_trait::async_trait;
use overmind_domain::{
    EventType, Mission, MissionDetails, MissionEvent, MissionId, MissionPlan, MissionStatus,
    NewMissionPlan, NewTask, PlanId, PlanStatus, Task, TaskId, TaskStatus,
};
use serde_json::{Value, json};
use thiserror::Error;

/// Errors surfaced by repository adapters.
///
/// Persistence failures are fatal to the current operation and never
/// retried implicitly.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RepositoryError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid mission transition: {from} -> {to}")]
    InvalidTransition {
        from: MissionStatus,
        to: MissionStatus,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl RepositoryError {
    pub fn mission_not_found(id: MissionId) -> Self {
        RepositoryError::NotFound {
            entity: "Mission",
            id: id.get(),
        }
    }

    pub fn plan_not_found(id: PlanId) -> Self {
        RepositoryError::NotFound {
            entity: "Plan",
            id: id.get(),
        }
    }

    pub fn task_not_found(id: TaskId) -> Self {
        RepositoryError::NotFound {
            entity: "Task",
            id: id.get(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, RepositoryError::NotFound { .. })
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(e: serde_json::Error) -> Self {
        RepositoryError::Serialization(e.to_string())
    }
}

/// A mission status change as the repository applied it.
#[derive(Debug, Clone)]
pub struct StatusTransition {
    /// The status the mission actually left
    pub from: MissionStatus,
    pub mission: Mission,
    /// STATUS_CHANGED, written together with the change
    pub event: MissionEvent,
}

/// Port for mission persistence
///
/// Implementations (adapters) live in the infrastructure layer.
#[async_trait]
pub trait MissionRepository: Send + Sync {
    /// Create a PENDING mission.
    async fn create_mission(
        &self,
        objective: &str,
        initiator_id: i64,
    ) -> Result<Mission, RepositoryError>;

    /// The mission row alone.
    async fn get_mission(&self, id: MissionId) -> Result<Mission, RepositoryError>;

    /// The mission with plans, tasks and events attached.
    async fn get_mission_by_id(&self, id: MissionId) -> Result<MissionDetails, RepositoryError>;

    /// Most recent missions first.
    async fn list_missions(&self, limit: usize) -> Result<Vec<Mission>, RepositoryError>;

    /// Move a mission along the transition graph and append its
    /// STATUS_CHANGED event in the same atomic step, so the log holds status
    /// changes in the order they were applied. Illegal transitions are
    /// rejected with [`RepositoryError::InvalidTransition`] and leave the
    /// mission and its log untouched.
    async fn update_mission_status(
        &self,
        id: MissionId,
        status: MissionStatus,
        result_summary: Option<String>,
    ) -> Result<StatusTransition, RepositoryError>;

    /// Append to the mission event log.
    async fn create_event(
        &self,
        mission_id: MissionId,
        event_type: EventType,
        payload: Value,
    ) -> Result<MissionEvent, RepositoryError>;

    /// The mission event log in chronological order.
    async fn list_events(&self, mission_id: MissionId) -> Result<Vec<MissionEvent>, RepositoryError>;

    /// Highest plan version for the mission, 0 when it has none.
    async fn get_latest_plan_version(&self, mission_id: MissionId) -> Result<u32, RepositoryError>;

    /// Persist a plan at `latest + 1`, assigned atomically per mission.
    async fn create_mission_plan(&self, plan: NewMissionPlan)
    -> Result<MissionPlan, RepositoryError>;

    async fn update_plan_status(
        &self,
        plan_id: PlanId,
        status: PlanStatus,
    ) -> Result<MissionPlan, RepositoryError>;

    /// Make `plan_id` the mission's active plan; the previously active plan
    /// becomes SUPERSEDED.
    async fn set_active_plan(
        &self,
        mission_id: MissionId,
        plan_id: PlanId,
    ) -> Result<(), RepositoryError>;

    /// Create a PENDING task. A task key already used in the mission is a
    /// [`RepositoryError::Conflict`].
    async fn create_task(&self, task: NewTask) -> Result<Task, RepositoryError>;

    /// Move a task to `status`, optionally storing its result. Entering
    /// RUNNING counts an attempt and requires every dependency to be SUCCESS.
    /// Terminal tasks cannot be modified.
    async fn update_task_status(
        &self,
        task_id: TaskId,
        status: TaskStatus,
        result: Option<Value>,
    ) -> Result<Task, RepositoryError>;

    /// Tasks of the mission in creation order.
    async fn get_tasks_for_mission(&self, mission_id: MissionId)
    -> Result<Vec<Task>, RepositoryError>;
}

/// Rules every adapter applies before changing a task.
///
/// `siblings` are all tasks of the same mission, used to resolve dependency
/// keys.
pub fn check_task_update(
    task: &Task,
    status: TaskStatus,
    siblings: &[Task],
) -> Result<(), RepositoryError> {
    if task.status.is_terminal() {
        return Err(RepositoryError::Conflict(format!(
            "task '{}' is already {}",
            task.task_key, task.status
        )));
    }
    if status == TaskStatus::Running {
        let unmet: Vec<&str> = task
            .dependencies
            .iter()
            .filter(|dep| {
                !siblings
                    .iter()
                    .any(|t| &t.task_key == *dep && t.status == TaskStatus::Success)
            })
            .map(|dep| dep.as_str())
            .collect();
        if !unmet.is_empty() {
            return Err(RepositoryError::Conflict(format!(
                "task '{}' cannot run before {}",
                task.task_key,
                unmet.join(", ")
            )));
        }
    }
    Ok(())
}

/// Transition-graph check shared by adapters.
pub fn check_mission_transition(
    from: MissionStatus,
    to: MissionStatus,
) -> Result<(), RepositoryError> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(RepositoryError::InvalidTransition { from, to })
    }
}

/// Payload of the STATUS_CHANGED event.
pub fn status_changed_payload(from: MissionStatus, to: MissionStatus) -> Value {
    json!({ "from": from, "to": to })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use overmind_domain::TaskKey;

    fn task(id: i64, key: &str, deps: &[&str], status: TaskStatus) -> Task {
        Task {
            id: TaskId::new(id),
            mission_id: MissionId::new(1),
            plan_id: PlanId::new(1),
            task_key: TaskKey::new(key),
            description: String::new(),
            tool_name: "echo".to_string(),
            tool_args: Value::Null,
            dependencies: deps.iter().map(|d| TaskKey::new(*d)).collect(),
            status,
            attempts: 0,
            result: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_terminal_tasks_are_immutable() {
        let done = task(1, "a", &[], TaskStatus::Success);
        let err = check_task_update(&done, TaskStatus::Failed, &[]).unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));
    }

    #[test]
    fn test_running_requires_successful_dependencies() {
        let a = task(1, "a", &[], TaskStatus::Running);
        let b = task(2, "b", &["a"], TaskStatus::Pending);
        assert!(check_task_update(&b, TaskStatus::Running, &[a.clone(), b.clone()]).is_err());

        let a_done = Task {
            status: TaskStatus::Success,
            ..a
        };
        assert!(check_task_update(&b, TaskStatus::Running, &[a_done, b.clone()]).is_ok());
        // Skipping does not need dependencies.
        assert!(check_task_update(&b, TaskStatus::Skipped, &[]).is_ok());
    }

    #[test]
    fn test_mission_transition_check() {
        assert!(check_mission_transition(MissionStatus::Pending, MissionStatus::Planning).is_ok());
        assert_eq!(
            check_mission_transition(MissionStatus::Success, MissionStatus::Running),
            Err(RepositoryError::InvalidTransition {
                from: MissionStatus::Success,
                to: MissionStatus::Running,
            })
        );
    }

    #[test]
    fn test_status_changed_payload_uses_wire_names() {
        let payload = status_changed_payload(MissionStatus::Planning, MissionStatus::Canceled);
        assert_eq!(payload, json!({ "from": "planning", "to": "canceled" }));
    }
}
