//! Process-local mission repository.

use async_trait::async_trait;
use chrono::Utc;
use overmind_application::ports::mission_repository::{
    MissionRepository, RepositoryError, StatusTransition, check_mission_transition,
    check_task_update, status_changed_payload,
};
use overmind_domain::{
    EventId, EventType, Mission, MissionDetails, MissionEvent, MissionId, MissionPlan,
    MissionStatus, NewMissionPlan, NewTask, PlanId, PlanStatus, Task, TaskId, TaskStatus,
};
use serde_json::Value;
use std::collections::BTreeMap;
use tokio::sync::Mutex;

#[derive(Debug, Default)]
struct Store {
    missions: BTreeMap<MissionId, Mission>,
    plans: BTreeMap<PlanId, MissionPlan>,
    tasks: BTreeMap<TaskId, Task>,
    events: Vec<MissionEvent>,
    last_id: i64,
}

impl Store {
    /// One counter for every table keeps ids unique and increasing.
    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }

    fn mission(&self, id: MissionId) -> Result<&Mission, RepositoryError> {
        self.missions
            .get(&id)
            .ok_or_else(|| RepositoryError::mission_not_found(id))
    }

    fn mission_mut(&mut self, id: MissionId) -> Result<&mut Mission, RepositoryError> {
        self.missions
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::mission_not_found(id))
    }

    fn tasks_of(&self, mission_id: MissionId) -> Vec<Task> {
        self.tasks
            .values()
            .filter(|t| t.mission_id == mission_id)
            .cloned()
            .collect()
    }

    fn latest_version(&self, mission_id: MissionId) -> u32 {
        self.plans
            .values()
            .filter(|p| p.mission_id == mission_id)
            .map(|p| p.version)
            .max()
            .unwrap_or(0)
    }
}

/// Mission repository backed by maps behind a Tokio mutex.
///
/// Every operation holds the lock for its whole duration, so version
/// assignment and the task checks are atomic.
#[derive(Debug, Default)]
pub struct InMemoryMissionRepository {
    store: Mutex<Store>,
}

impl InMemoryMissionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MissionRepository for InMemoryMissionRepository {
    async fn create_mission(
        &self,
        objective: &str,
        initiator_id: i64,
    ) -> Result<Mission, RepositoryError> {
        let mut store = self.store.lock().await;
        let now = Utc::now();
        let mission = Mission {
            id: MissionId::new(store.next_id()),
            objective: objective.to_string(),
            status: MissionStatus::Pending,
            initiator_id,
            active_plan_id: None,
            result_summary: None,
            created_at: now,
            updated_at: now,
        };
        store.missions.insert(mission.id, mission.clone());
        Ok(mission)
    }

    async fn get_mission(&self, id: MissionId) -> Result<Mission, RepositoryError> {
        self.store.lock().await.mission(id).cloned()
    }

    async fn get_mission_by_id(&self, id: MissionId) -> Result<MissionDetails, RepositoryError> {
        let store = self.store.lock().await;
        let mission = store.mission(id)?.clone();
        let mut plans: Vec<MissionPlan> = store
            .plans
            .values()
            .filter(|p| p.mission_id == id)
            .cloned()
            .collect();
        plans.sort_by_key(|p| p.version);
        let events = store
            .events
            .iter()
            .filter(|e| e.mission_id == id)
            .cloned()
            .collect();
        Ok(MissionDetails {
            mission,
            plans,
            tasks: store.tasks_of(id),
            events,
        })
    }

    async fn list_missions(&self, limit: usize) -> Result<Vec<Mission>, RepositoryError> {
        let store = self.store.lock().await;
        Ok(store.missions.values().rev().take(limit).cloned().collect())
    }

    async fn update_mission_status(
        &self,
        id: MissionId,
        status: MissionStatus,
        result_summary: Option<String>,
    ) -> Result<StatusTransition, RepositoryError> {
        let mut store = self.store.lock().await;
        let now = Utc::now();
        let mission = store.mission_mut(id)?;
        let from = mission.status;
        check_mission_transition(from, status)?;
        mission.status = status;
        if result_summary.is_some() {
            mission.result_summary = result_summary;
        }
        mission.updated_at = now;
        let mission = mission.clone();

        let event = MissionEvent {
            id: EventId::new(store.next_id()),
            mission_id: id,
            event_type: EventType::StatusChanged,
            payload: status_changed_payload(from, status),
            created_at: now,
        };
        store.events.push(event.clone());
        Ok(StatusTransition {
            from,
            mission,
            event,
        })
    }

    async fn create_event(
        &self,
        mission_id: MissionId,
        event_type: EventType,
        payload: Value,
    ) -> Result<MissionEvent, RepositoryError> {
        let mut store = self.store.lock().await;
        store.mission(mission_id)?;
        let event = MissionEvent {
            id: EventId::new(store.next_id()),
            mission_id,
            event_type,
            payload,
            created_at: Utc::now(),
        };
        store.events.push(event.clone());
        Ok(event)
    }

    async fn list_events(&self, mission_id: MissionId) -> Result<Vec<MissionEvent>, RepositoryError> {
        let store = self.store.lock().await;
        Ok(store
            .events
            .iter()
            .filter(|e| e.mission_id == mission_id)
            .cloned()
            .collect())
    }

    async fn get_latest_plan_version(&self, mission_id: MissionId) -> Result<u32, RepositoryError> {
        Ok(self.store.lock().await.latest_version(mission_id))
    }

    async fn create_mission_plan(
        &self,
        plan: NewMissionPlan,
    ) -> Result<MissionPlan, RepositoryError> {
        let mut store = self.store.lock().await;
        store.mission(plan.mission_id)?;
        let version = store.latest_version(plan.mission_id) + 1;
        let created = MissionPlan {
            id: PlanId::new(store.next_id()),
            mission_id: plan.mission_id,
            version,
            status: plan.status,
            rationale: plan.rationale,
            stats: plan.stats,
            warnings: plan.warnings,
            raw_plan: plan.raw_plan,
            telemetry: plan.telemetry,
            created_at: Utc::now(),
        };
        store.plans.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update_plan_status(
        &self,
        plan_id: PlanId,
        status: PlanStatus,
    ) -> Result<MissionPlan, RepositoryError> {
        let mut store = self.store.lock().await;
        let plan = store
            .plans
            .get_mut(&plan_id)
            .ok_or_else(|| RepositoryError::plan_not_found(plan_id))?;
        plan.status = status;
        Ok(plan.clone())
    }

    async fn set_active_plan(
        &self,
        mission_id: MissionId,
        plan_id: PlanId,
    ) -> Result<(), RepositoryError> {
        let mut store = self.store.lock().await;
        let previous = store.mission(mission_id)?.active_plan_id;
        match store.plans.get(&plan_id) {
            Some(plan) if plan.mission_id == mission_id => {}
            Some(_) => {
                return Err(RepositoryError::Conflict(format!(
                    "plan {} does not belong to mission {}",
                    plan_id, mission_id
                )));
            }
            None => return Err(RepositoryError::plan_not_found(plan_id)),
        }

        if let Some(previous) = previous.filter(|p| *p != plan_id)
            && let Some(old) = store.plans.get_mut(&previous)
        {
            old.status = PlanStatus::Superseded;
        }
        let mission = store.mission_mut(mission_id)?;
        mission.active_plan_id = Some(plan_id);
        mission.updated_at = Utc::now();
        Ok(())
    }

    async fn create_task(&self, task: NewTask) -> Result<Task, RepositoryError> {
        let mut store = self.store.lock().await;
        store.mission(task.mission_id)?;
        if !store.plans.contains_key(&task.plan_id) {
            return Err(RepositoryError::plan_not_found(task.plan_id));
        }
        let duplicate = store
            .tasks
            .values()
            .any(|t| t.mission_id == task.mission_id && t.task_key == task.task_key);
        if duplicate {
            return Err(RepositoryError::Conflict(format!(
                "task key '{}' already exists in mission {}",
                task.task_key, task.mission_id
            )));
        }

        let now = Utc::now();
        let created = Task {
            id: TaskId::new(store.next_id()),
            mission_id: task.mission_id,
            plan_id: task.plan_id,
            task_key: task.task_key,
            description: task.description,
            tool_name: task.tool_name,
            tool_args: task.tool_args,
            dependencies: task.dependencies,
            status: TaskStatus::Pending,
            attempts: 0,
            result: None,
            created_at: now,
            updated_at: now,
        };
        store.tasks.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update_task_status(
        &self,
        task_id: TaskId,
        status: TaskStatus,
        result: Option<Value>,
    ) -> Result<Task, RepositoryError> {
        let mut store = self.store.lock().await;
        let current = store
            .tasks
            .get(&task_id)
            .ok_or_else(|| RepositoryError::task_not_found(task_id))?
            .clone();
        check_task_update(&current, status, &store.tasks_of(current.mission_id))?;

        let task = store
            .tasks
            .get_mut(&task_id)
            .ok_or_else(|| RepositoryError::task_not_found(task_id))?;
        if status == TaskStatus::Running {
            task.attempts += 1;
        }
        task.status = status;
        if result.is_some() {
            task.result = result;
        }
        task.updated_at = Utc::now();
        Ok(task.clone())
    }

    async fn get_tasks_for_mission(
        &self,
        mission_id: MissionId,
    ) -> Result<Vec<Task>, RepositoryError> {
        Ok(self.store.lock().await.tasks_of(mission_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use overmind_domain::TaskKey;
    use serde_json::json;
    use std::sync::Arc;

    fn new_plan(mission_id: MissionId) -> NewMissionPlan {
        NewMissionPlan {
            mission_id,
            status: PlanStatus::Approved,
            rationale: "ok".to_string(),
            stats: json!({}),
            warnings: json!([]),
            raw_plan: json!({}),
            telemetry: json!({}),
        }
    }

    fn new_task(mission_id: MissionId, plan_id: PlanId, key: &str, deps: &[&str]) -> NewTask {
        NewTask {
            mission_id,
            plan_id,
            task_key: TaskKey::new(key),
            description: format!("task {}", key),
            tool_name: "echo".to_string(),
            tool_args: json!({}),
            dependencies: deps.iter().map(|d| TaskKey::new(*d)).collect(),
        }
    }

    #[tokio::test]
    async fn test_mission_lifecycle() {
        let repo = InMemoryMissionRepository::new();
        let mission = repo.create_mission("build X", 42).await.unwrap();
        assert_eq!(mission.status, MissionStatus::Pending);
        assert_eq!(repo.get_latest_plan_version(mission.id).await.unwrap(), 0);

        let planning = repo
            .update_mission_status(mission.id, MissionStatus::Planning, None)
            .await
            .unwrap();
        assert_eq!(planning.from, MissionStatus::Pending);
        assert_eq!(planning.mission.status, MissionStatus::Planning);
        assert_eq!(planning.event.event_type, EventType::StatusChanged);
        assert_eq!(planning.event.payload, json!({"from": "pending", "to": "planning"}));
        let err = repo
            .update_mission_status(mission.id, MissionStatus::Success, None)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            RepositoryError::InvalidTransition {
                from: MissionStatus::Planning,
                to: MissionStatus::Success,
            }
        );
        let canceled = repo
            .update_mission_status(mission.id, MissionStatus::Canceled, Some("stop".into()))
            .await
            .unwrap();
        assert_eq!(canceled.mission.result_summary.as_deref(), Some("stop"));

        // The rejected transition left no event behind.
        let events = repo.list_events(mission.id).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].id, canceled.event.id);
    }

    #[tokio::test]
    async fn test_racing_transitions_chain_in_log() {
        let repo = Arc::new(InMemoryMissionRepository::new());
        let mission = repo.create_mission("build X", 1).await.unwrap();
        repo.update_mission_status(mission.id, MissionStatus::Planning, None)
            .await
            .unwrap();

        let worker = {
            let repo = Arc::clone(&repo);
            tokio::spawn(async move {
                repo.update_mission_status(mission.id, MissionStatus::Planned, None)
                    .await
            })
        };
        let cancel = {
            let repo = Arc::clone(&repo);
            tokio::spawn(async move {
                repo.update_mission_status(mission.id, MissionStatus::Canceled, None)
                    .await
            })
        };
        let worker = worker.await.unwrap();
        let cancel = cancel.await.unwrap().unwrap();

        match worker {
            Ok(planned) => {
                assert_eq!(planned.from, MissionStatus::Planning);
                assert_eq!(cancel.from, MissionStatus::Planned);
            }
            Err(e) => {
                assert_eq!(
                    e,
                    RepositoryError::InvalidTransition {
                        from: MissionStatus::Canceled,
                        to: MissionStatus::Planned,
                    }
                );
                assert_eq!(cancel.from, MissionStatus::Planning);
            }
        }

        let events = repo.list_events(mission.id).await.unwrap();
        assert!(events.windows(2).all(|w| w[0].payload["to"] == w[1].payload["from"]));
        assert_eq!(events.last().unwrap().payload["to"], json!("canceled"));
    }

    #[tokio::test]
    async fn test_unknown_mission() {
        let repo = InMemoryMissionRepository::new();
        let err = repo.get_mission(MissionId::new(99)).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(
            repo.create_event(MissionId::new(99), EventType::Created, json!({}))
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_concurrent_plan_versions_are_unique() {
        let repo = Arc::new(InMemoryMissionRepository::new());
        let mission = repo.create_mission("build X", 1).await.unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let repo = Arc::clone(&repo);
                tokio::spawn(async move { repo.create_mission_plan(new_plan(mission.id)).await })
            })
            .collect();
        let mut versions = Vec::new();
        for handle in handles {
            versions.push(handle.await.unwrap().unwrap().version);
        }
        versions.sort_unstable();
        assert_eq!(versions, (1..=8).collect::<Vec<u32>>());
        assert_eq!(repo.get_latest_plan_version(mission.id).await.unwrap(), 8);
    }

    #[tokio::test]
    async fn test_set_active_plan_supersedes_previous() {
        let repo = InMemoryMissionRepository::new();
        let mission = repo.create_mission("build X", 1).await.unwrap();
        let first = repo.create_mission_plan(new_plan(mission.id)).await.unwrap();
        let second = repo.create_mission_plan(new_plan(mission.id)).await.unwrap();

        repo.set_active_plan(mission.id, first.id).await.unwrap();
        repo.set_active_plan(mission.id, second.id).await.unwrap();

        let details = repo.get_mission_by_id(mission.id).await.unwrap();
        assert_eq!(details.mission.active_plan_id, Some(second.id));
        assert_eq!(details.plans[0].status, PlanStatus::Superseded);
        assert_eq!(details.plans[1].status, PlanStatus::Approved);
        assert_eq!(details.active_plan().map(|p| p.version), Some(2));
    }

    #[tokio::test]
    async fn test_task_rules() {
        let repo = InMemoryMissionRepository::new();
        let mission = repo.create_mission("build X", 1).await.unwrap();
        let plan = repo.create_mission_plan(new_plan(mission.id)).await.unwrap();

        let a = repo
            .create_task(new_task(mission.id, plan.id, "a", &[]))
            .await
            .unwrap();
        let b = repo
            .create_task(new_task(mission.id, plan.id, "b", &["a"]))
            .await
            .unwrap();
        let dup = repo
            .create_task(new_task(mission.id, plan.id, "a", &[]))
            .await
            .unwrap_err();
        assert!(matches!(dup, RepositoryError::Conflict(_)));

        // b cannot start before a succeeded
        assert!(
            repo.update_task_status(b.id, TaskStatus::Running, None)
                .await
                .is_err()
        );

        let running = repo
            .update_task_status(a.id, TaskStatus::Running, None)
            .await
            .unwrap();
        assert_eq!(running.attempts, 1);
        let done = repo
            .update_task_status(a.id, TaskStatus::Success, Some(json!({"detail": "x"})))
            .await
            .unwrap();
        assert_eq!(done.result, Some(json!({"detail": "x"})));

        // terminal tasks are immutable
        assert!(
            repo.update_task_status(a.id, TaskStatus::Failed, None)
                .await
                .is_err()
        );
        repo.update_task_status(b.id, TaskStatus::Running, None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_events_in_append_order() {
        let repo = InMemoryMissionRepository::new();
        let mission = repo.create_mission("build X", 1).await.unwrap();
        for event_type in [EventType::Created, EventType::StatusChanged, EventType::PlanProposed] {
            repo.create_event(mission.id, event_type, json!({"n": 1}))
                .await
                .unwrap();
        }
        let events = repo.list_events(mission.id).await.unwrap();
        let types: Vec<EventType> = events.iter().map(|e| e.event_type).collect();
        assert_eq!(
            types,
            vec![EventType::Created, EventType::StatusChanged, EventType::PlanProposed]
        );
        assert!(events.windows(2).all(|w| w[0].id < w[1].id));
    }
}
