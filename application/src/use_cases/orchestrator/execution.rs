//! Execution phase: dependency-ordered admission of tasks.
//!
//! Admission is decided only by the loop in [`execute_plan`], never by the
//! spawned tasks, so a task cannot start before its dependencies succeeded
//! regardless of how in-flight work interleaves.
//!
//! [`execute_plan`]: OvermindOrchestrator::execute_plan

use super::OvermindOrchestrator;
use super::types::{ExecutionOutcome, OrchestratorError, TaskReport, TaskSuccess};
use crate::ports::council::{CouncilRole, Executor, Reflector};
use crate::resilience::{Classify, CompositeResiliencePolicy, RetryPolicy, TimeoutPolicy};
use futures::FutureExt;
use overmind_domain::{
    EventType, MissionId, MissionPlan, Task, TaskId, TaskKey, TaskStatus, Verification,
};
use serde_json::{Value, json};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{AbortHandle, Id, JoinSet};
use tracing::{debug, info, warn};

impl OvermindOrchestrator {
    /// Runs the plan's tasks until none is left or one has failed. After the
    /// first failure nothing new is admitted and in-flight tasks are drained.
    pub(super) async fn execute_plan(
        &self,
        mission_id: MissionId,
        plan: &MissionPlan,
    ) -> Result<ExecutionOutcome, OrchestratorError> {
        let tasks = self.repository.get_tasks_for_mission(mission_id).await?;
        let mut succeeded: HashSet<TaskKey> = tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Success)
            .map(|t| t.task_key.clone())
            .collect();
        let mut pending: Vec<Task> = tasks
            .into_iter()
            .filter(|t| t.plan_id == plan.id && t.status == TaskStatus::Pending)
            .collect();

        let limit = self.params.max_parallel_tasks.max(1);
        let mut in_flight = InFlight::new();
        let mut completed = 0;
        let mut failures: Vec<(TaskKey, String)> = Vec::new();

        loop {
            if failures.is_empty() {
                while in_flight.len() < limit {
                    let Some(index) = pending
                        .iter()
                        .position(|t| t.is_ready(|key| succeeded.contains(key)))
                    else {
                        break;
                    };
                    let task = pending.remove(index);
                    self.check_cancelled()?;
                    let job = self.start_task(mission_id, task).await?;
                    in_flight.spawn(job.task.id, job.task.task_key.clone(), job.run());
                }
            }

            let next = match &self.cancellation_token {
                Some(token) => tokio::select! {
                    biased;
                    _ = token.cancelled() => return Err(OrchestratorError::Cancelled),
                    next = in_flight.next() => next,
                },
                None => in_flight.next().await,
            };
            let Some(report) = next else {
                break;
            };

            match report.outcome {
                Ok(success) => {
                    self.record_success(mission_id, &report.task_key, report.task_id, success)
                        .await?;
                    succeeded.insert(report.task_key);
                    completed += 1;
                }
                Err(OrchestratorError::Cancelled) => return Err(OrchestratorError::Cancelled),
                Err(error) => {
                    self.record_failure(mission_id, &report.task_key, report.task_id, &error)
                        .await?;
                    failures.push((report.task_key, error.to_string()));
                }
            }
        }

        if !failures.is_empty() {
            return Ok(ExecutionOutcome::Failed { failures });
        }
        if !pending.is_empty() {
            let failures = pending
                .iter()
                .map(|t| {
                    (
                        t.task_key.clone(),
                        "dependencies never succeeded".to_string(),
                    )
                })
                .collect();
            return Ok(ExecutionOutcome::Failed { failures });
        }
        Ok(ExecutionOutcome::Completed {
            succeeded: completed,
        })
    }

    /// PENDING → RUNNING plus TASK_STARTED, then package the task for spawning.
    async fn start_task(
        &self,
        mission_id: MissionId,
        task: Task,
    ) -> Result<TaskJob, OrchestratorError> {
        let task = self
            .repository
            .update_task_status(task.id, TaskStatus::Running, None)
            .await?;
        debug!(
            "Mission {} admitted task '{}' ({})",
            mission_id, task.task_key, task.tool_name
        );
        self.append_event(
            mission_id,
            EventType::TaskStarted,
            json!({
                "task_id": task.id,
                "task_key": task.task_key,
                "tool_name": task.tool_name,
                "attempt": task.attempts,
            }),
        )
        .await?;

        Ok(TaskJob {
            tool_policy: self.tool_policy(&task.tool_name),
            verify_policy: self.council_policy(CouncilRole::Reflector),
            executor: Arc::clone(&self.council.executor),
            reflector: Arc::clone(&self.council.reflector),
            tool_timeout: self.params.tool_timeout,
            task,
        })
    }

    async fn record_success(
        &self,
        mission_id: MissionId,
        task_key: &TaskKey,
        task_id: TaskId,
        success: TaskSuccess,
    ) -> Result<(), OrchestratorError> {
        self.repository
            .update_task_status(task_id, TaskStatus::Success, Some(success.output.clone()))
            .await?;
        info!("Mission {} task '{}' succeeded", mission_id, task_key);
        self.append_event(
            mission_id,
            EventType::TaskSucceeded,
            json!({
                "task_key": task_key,
                "result": success.output,
                "verification": success.verification,
            }),
        )
        .await?;
        Ok(())
    }

    async fn record_failure(
        &self,
        mission_id: MissionId,
        task_key: &TaskKey,
        task_id: TaskId,
        error: &OrchestratorError,
    ) -> Result<(), OrchestratorError> {
        self.repository
            .update_task_status(
                task_id,
                TaskStatus::Failed,
                Some(json!({ "error": error.to_string() })),
            )
            .await?;
        warn!("Mission {} task '{}' failed: {}", mission_id, task_key, error);
        self.append_event(
            mission_id,
            EventType::TaskFailed,
            json!({
                "task_key": task_key,
                "error": error.to_string(),
                "failure_class": error.failure_class(),
            }),
        )
        .await?;
        Ok(())
    }

    /// Retry, `tool:<name>` breaker, deadline and per-tool bulkhead.
    pub(super) fn tool_policy(&self, tool_name: &str) -> CompositeResiliencePolicy<Value> {
        let name = format!("tool:{}", tool_name);
        let policy = CompositeResiliencePolicy::new(name.as_str())
            .with_retry(RetryPolicy::new(self.resilience.retry.clone()))
            .with_circuit_breaker(self.breakers.get_or_create(&name, &self.resilience.breaker))
            .with_timeout(TimeoutPolicy::new(self.resilience.timeout.clone()))
            .with_bulkhead(self.bulkheads.get_or_create(&name, &self.resilience.bulkhead));
        match &self.cancellation_token {
            Some(token) => policy.with_cancellation(token.clone()),
            None => policy,
        }
    }
}

/// Spawned tasks, keyed by runtime task id so that a task which ends without
/// handing back a report still settles as a failure.
struct InFlight {
    set: JoinSet<TaskReport>,
    tasks: HashMap<Id, (TaskId, TaskKey)>,
}

impl InFlight {
    fn new() -> Self {
        Self {
            set: JoinSet::new(),
            tasks: HashMap::new(),
        }
    }

    fn len(&self) -> usize {
        self.set.len()
    }

    fn spawn<F>(&mut self, task_id: TaskId, task_key: TaskKey, work: F) -> AbortHandle
    where
        F: Future<Output = TaskReport> + Send + 'static,
    {
        let handle = self.set.spawn(work);
        self.tasks.insert(handle.id(), (task_id, task_key));
        handle
    }

    /// The next finished task, `None` once nothing is in flight. Cancel safe.
    async fn next(&mut self) -> Option<TaskReport> {
        loop {
            match self.set.join_next_with_id().await? {
                Ok((id, report)) => {
                    self.tasks.remove(&id);
                    return Some(report);
                }
                Err(e) => {
                    let Some((task_id, task_key)) = self.tasks.remove(&e.id()) else {
                        warn!("Untracked task ended abnormally: {}", e);
                        continue;
                    };
                    warn!("Task '{}' ended without a report: {}", task_key, e);
                    return Some(TaskReport {
                        task_id,
                        task_key: task_key.clone(),
                        outcome: Err(OrchestratorError::TaskAborted(task_key)),
                    });
                }
            }
        }
    }
}

/// Everything one spawned task needs, owned.
struct TaskJob {
    task: Task,
    executor: Arc<dyn Executor>,
    reflector: Arc<dyn Reflector>,
    tool_policy: CompositeResiliencePolicy<Value>,
    verify_policy: CompositeResiliencePolicy<Verification>,
    tool_timeout: Duration,
}

impl TaskJob {
    async fn run(self) -> TaskReport {
        let task_id = self.task.id;
        let task_key = self.task.task_key.clone();
        let outcome = match AssertUnwindSafe(self.attempt()).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!("Task '{}' panicked", task_key);
                Err(OrchestratorError::TaskAborted(task_key.clone()))
            }
        };
        TaskReport {
            task_id,
            task_key,
            outcome,
        }
    }

    /// Tool call through the resilience pipeline, then verification. Only a
    /// verified result is a success.
    async fn attempt(&self) -> Result<TaskSuccess, OrchestratorError> {
        let task = &self.task;
        let executor = &self.executor;
        let timeout = self.tool_timeout;

        let output = self
            .tool_policy
            .execute(|| async move { executor.execute(task, timeout).await.into_result() })
            .await
            .map_err(|error| {
                if error.is_cancelled() {
                    OrchestratorError::Cancelled
                } else {
                    OrchestratorError::Tool {
                        task: task.task_key.clone(),
                        error,
                    }
                }
            })?;

        let reflector = &self.reflector;
        let verification = self
            .verify_policy
            .execute(|| reflector.verify(task, &output))
            .await
            .map_err(|error| {
                if error.is_cancelled() {
                    OrchestratorError::Cancelled
                } else {
                    OrchestratorError::VerificationFailed {
                        task: task.task_key.clone(),
                        reason: format!("reflector unavailable: {}", error),
                    }
                }
            })?;

        if !verification.verified {
            return Err(OrchestratorError::VerificationFailed {
                task: task.task_key.clone(),
                reason: verification.reason,
            });
        }
        Ok(TaskSuccess {
            output,
            verification: verification.reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(id: i64, key: &str) -> TaskReport {
        TaskReport {
            task_id: TaskId::new(id),
            task_key: TaskKey::new(key),
            outcome: Ok(TaskSuccess {
                output: json!({ "message": key }),
                verification: "ok".to_string(),
            }),
        }
    }

    #[tokio::test]
    async fn test_aborted_task_settles_as_failure() {
        let mut in_flight = InFlight::new();
        let stuck = in_flight.spawn(TaskId::new(7), TaskKey::new("stuck"), async {
            std::future::pending::<TaskReport>().await
        });
        stuck.abort();

        let settled = in_flight.next().await.unwrap();
        assert_eq!(settled.task_id, TaskId::new(7));
        assert!(matches!(
            settled.outcome,
            Err(OrchestratorError::TaskAborted(ref key)) if key.as_str() == "stuck"
        ));
        assert!(in_flight.next().await.is_none());
        assert!(in_flight.tasks.is_empty());
    }

    #[tokio::test]
    async fn test_finished_tasks_hand_back_their_report() {
        let mut in_flight = InFlight::new();
        in_flight.spawn(TaskId::new(1), TaskKey::new("a"), async { report(1, "a") });
        in_flight.spawn(TaskId::new(2), TaskKey::new("b"), async { report(2, "b") });
        assert_eq!(in_flight.len(), 2);

        let mut keys = Vec::new();
        while let Some(settled) = in_flight.next().await {
            assert!(settled.outcome.is_ok());
            keys.push(settled.task_key.as_str().to_string());
        }
        keys.sort();
        assert_eq!(keys, ["a", "b"]);
        assert!(in_flight.tasks.is_empty());
    }
}
