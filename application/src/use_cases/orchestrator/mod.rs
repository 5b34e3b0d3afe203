//! Overmind orchestrator use case
//!
//! Drives one mission through its state machine:
//!
//! | Phase | Mission status | Council role |
//! |-------|----------------|--------------|
//! | 1. Planning | PLANNING → PLANNED / FAILED | Planner, Architect, Reflector (critique) |
//! | 2. Execution | PLANNED → RUNNING | Executor, Reflector (verify) |
//! | 3. Outcome | RUNNING → SUCCESS / FAILED / ADAPTING | - |
//! | 3b. Adaptation | ADAPTING → PLANNING / FAILED | Planner (with feedback) |
//!
//! The repository is the only writer of mission state and every state change
//! is followed by its event before the next transition is attempted, so the
//! event log replays the run in order.

mod execution;
mod planning;
mod types;

pub use types::{MissionOutcome, OrchestratorError};

use types::{ExecutionOutcome, PlanningOutcome};

use crate::config::{OrchestratorParams, ResilienceConfig};
use crate::ports::council::{Council, CouncilError, CouncilRole};
use crate::ports::event_sink::{MissionEventSink, NoEventSink};
use crate::ports::mission_repository::{MissionRepository, RepositoryError};
use crate::resilience::{
    BulkheadRegistry, CircuitBreakerRegistry, CompositeResiliencePolicy, RetryPolicy,
    TimeoutConfig, TimeoutPolicy,
};
use overmind_domain::{
    EventType, MissionEvent, MissionId, MissionStatus, PlanFeedback, TaskKey, TaskStatus,
};
use serde_json::{Value, json};
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Use case for running a mission end to end
#[derive(Clone)]
pub struct OvermindOrchestrator {
    pub(super) repository: Arc<dyn MissionRepository>,
    pub(super) council: Council,
    pub(super) breakers: Arc<CircuitBreakerRegistry>,
    pub(super) bulkheads: Arc<BulkheadRegistry>,
    pub(super) resilience: ResilienceConfig,
    pub(super) params: OrchestratorParams,
    pub(super) event_sink: Arc<dyn MissionEventSink>,
    pub(super) cancellation_token: Option<CancellationToken>,
}

impl OvermindOrchestrator {
    pub fn new(
        repository: Arc<dyn MissionRepository>,
        council: Council,
        breakers: Arc<CircuitBreakerRegistry>,
    ) -> Self {
        Self {
            repository,
            council,
            breakers,
            bulkheads: Arc::new(BulkheadRegistry::new()),
            resilience: ResilienceConfig::default(),
            params: OrchestratorParams::default(),
            event_sink: Arc::new(NoEventSink),
            cancellation_token: None,
        }
    }

    pub fn with_params(mut self, params: OrchestratorParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_resilience(mut self, resilience: ResilienceConfig) -> Self {
        self.resilience = resilience;
        self
    }

    /// Share per-tool bulkheads with other orchestrators
    pub fn with_bulkheads(mut self, bulkheads: Arc<BulkheadRegistry>) -> Self {
        self.bulkheads = bulkheads;
        self
    }

    /// Mirror every appended event to `sink`
    pub fn with_event_sink(mut self, sink: Arc<dyn MissionEventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Set a cancellation token for graceful interruption
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = Some(token);
        self
    }

    pub fn params(&self) -> &OrchestratorParams {
        &self.params
    }

    pub fn breakers(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.breakers
    }

    /// Run a PENDING mission until it is terminal.
    ///
    /// Mission-level failures (rejected plan, exhausted adaptations) are an
    /// `Ok` outcome with status FAILED. `Err` means the run itself broke; in
    /// that case the mission is failed with the error as rationale when the
    /// state machine allows it.
    pub async fn run(&self, mission_id: MissionId) -> Result<MissionOutcome, OrchestratorError> {
        match self.drive(mission_id).await {
            Ok(outcome) => Ok(outcome),
            Err(OrchestratorError::Cancelled) => {
                info!("Mission {} cancelled", mission_id);
                self.skip_open_tasks(mission_id, "mission canceled").await;
                Err(OrchestratorError::Cancelled)
            }
            Err(e) => {
                warn!("Mission {} aborted: {}", mission_id, e);
                self.abort_mission(mission_id, &e).await;
                Err(e)
            }
        }
    }

    async fn drive(&self, mission_id: MissionId) -> Result<MissionOutcome, OrchestratorError> {
        self.check_cancelled()?;

        let mission = self.repository.get_mission(mission_id).await?;
        if mission.status.is_terminal() {
            debug!("Mission {} already {}", mission_id, mission.status);
            return Ok(MissionOutcome {
                mission_id,
                status: mission.status,
                summary: mission.result_summary.unwrap_or_default(),
                adaptations: 0,
            });
        }

        info!("Starting mission {}: {}", mission_id, mission.objective);
        self.transition(mission_id, MissionStatus::Planning, None)
            .await?;

        let mut adaptations = 0;
        let mut feedback: Option<PlanFeedback> = None;

        loop {
            // ==================== Phase 1: Planning ====================
            let plan = match self
                .plan_mission(&mission.objective, mission_id, feedback.as_ref())
                .await?
            {
                PlanningOutcome::Approved(plan) => plan,
                PlanningOutcome::Rejected { rationale } => {
                    let summary = format!("Plan rejected: {}", rationale);
                    return self
                        .fail_mission(mission_id, summary, &[], adaptations)
                        .await;
                }
            };

            // ==================== Phase 2: Execution ====================
            self.transition(mission_id, MissionStatus::Running, None)
                .await?;

            let failures = match self.execute_plan(mission_id, &plan).await? {
                ExecutionOutcome::Completed { succeeded } => {
                    return self.complete_mission(mission_id, succeeded, adaptations).await;
                }
                ExecutionOutcome::Failed { failures } => failures,
            };

            // ==================== Phase 3: Adaptation ====================
            if adaptations >= self.params.max_adaptations {
                self.skip_open_tasks(mission_id, "mission failed").await;
                let summary = format!(
                    "{} task(s) failed after {} adaptation(s): {}",
                    failures.len(),
                    adaptations,
                    PlanFeedback {
                        failures: failures.clone(),
                        ..Default::default()
                    }
                    .summary()
                );
                return self
                    .fail_mission(mission_id, summary, &failures, adaptations)
                    .await;
            }

            adaptations += 1;
            feedback = Some(self.adapt(mission_id, adaptations, failures).await?);
        }
    }

    /// RUNNING → ADAPTING → PLANNING, returning what the planner should know.
    async fn adapt(
        &self,
        mission_id: MissionId,
        adaptation: u32,
        failures: Vec<(TaskKey, String)>,
    ) -> Result<PlanFeedback, OrchestratorError> {
        info!(
            "Mission {} adapting (round {}/{}) after {} failure(s)",
            mission_id,
            adaptation,
            self.params.max_adaptations,
            failures.len()
        );
        self.transition(mission_id, MissionStatus::Adapting, None)
            .await?;
        self.skip_open_tasks(mission_id, "superseded by re-planning")
            .await;

        let succeeded: Vec<TaskKey> = self
            .repository
            .get_tasks_for_mission(mission_id)
            .await?
            .into_iter()
            .filter(|t| t.status == TaskStatus::Success)
            .map(|t| t.task_key)
            .collect();

        let feedback = PlanFeedback {
            adaptation,
            succeeded,
            failures,
        };
        self.append_event(
            mission_id,
            EventType::AdaptationRequested,
            json!({
                "adaptation": adaptation,
                "max_adaptations": self.params.max_adaptations,
                "failures": feedback
                    .failures
                    .iter()
                    .map(|(key, reason)| json!({ "task_key": key, "reason": reason }))
                    .collect::<Vec<_>>(),
            }),
        )
        .await?;
        self.transition(mission_id, MissionStatus::Planning, None)
            .await?;
        Ok(feedback)
    }

    async fn complete_mission(
        &self,
        mission_id: MissionId,
        succeeded: usize,
        adaptations: u32,
    ) -> Result<MissionOutcome, OrchestratorError> {
        let summary = format!("{} task(s) succeeded", succeeded);
        self.transition(mission_id, MissionStatus::Success, Some(summary.clone()))
            .await?;
        self.append_event(
            mission_id,
            EventType::MissionCompleted,
            json!({ "summary": summary, "adaptations": adaptations }),
        )
        .await?;
        info!("Mission {} succeeded: {}", mission_id, summary);
        Ok(MissionOutcome {
            mission_id,
            status: MissionStatus::Success,
            summary,
            adaptations,
        })
    }

    async fn fail_mission(
        &self,
        mission_id: MissionId,
        summary: String,
        failures: &[(TaskKey, String)],
        adaptations: u32,
    ) -> Result<MissionOutcome, OrchestratorError> {
        self.transition(mission_id, MissionStatus::Failed, Some(summary.clone()))
            .await?;
        self.append_event(
            mission_id,
            EventType::MissionFailed,
            json!({
                "rationale": summary,
                "adaptations": adaptations,
                "failures": failures
                    .iter()
                    .map(|(key, reason)| json!({ "task_key": key, "reason": reason }))
                    .collect::<Vec<_>>(),
            }),
        )
        .await?;
        warn!("Mission {} failed: {}", mission_id, summary);
        Ok(MissionOutcome {
            mission_id,
            status: MissionStatus::Failed,
            summary,
            adaptations,
        })
    }

    /// Best-effort FAILED after the run itself broke.
    async fn abort_mission(&self, mission_id: MissionId, error: &OrchestratorError) {
        let Ok(mission) = self.repository.get_mission(mission_id).await else {
            return;
        };
        if !mission.status.can_transition_to(MissionStatus::Failed) {
            return;
        }
        self.skip_open_tasks(mission_id, "mission failed").await;
        let summary = error.to_string();
        if let Err(e) = self
            .fail_mission(mission_id, summary, &[], 0)
            .await
        {
            warn!("Could not record failure of mission {}: {}", mission_id, e);
        }
    }

    /// Moves the mission; the repository records STATUS_CHANGED with it.
    ///
    /// A rejected transition on a mission that was canceled concurrently is
    /// reported as cancellation.
    pub(super) async fn transition(
        &self,
        mission_id: MissionId,
        to: MissionStatus,
        summary: Option<String>,
    ) -> Result<(), OrchestratorError> {
        self.check_cancelled()?;
        let applied = match self
            .repository
            .update_mission_status(mission_id, to, summary)
            .await
        {
            Ok(applied) => applied,
            Err(RepositoryError::InvalidTransition { from: actual, to }) => {
                if actual == MissionStatus::Canceled {
                    return Err(OrchestratorError::Cancelled);
                }
                return Err(OrchestratorError::InvalidTransition { from: actual, to });
            }
            Err(e) => return Err(e.into()),
        };

        info!("Mission {}: {} -> {}", mission_id, applied.from, to);
        self.event_sink.record(&applied.event);
        Ok(())
    }

    /// Appends to the event log and mirrors to the sink.
    pub(super) async fn append_event(
        &self,
        mission_id: MissionId,
        event_type: EventType,
        payload: Value,
    ) -> Result<MissionEvent, OrchestratorError> {
        let event = self
            .repository
            .create_event(mission_id, event_type, payload)
            .await?;
        self.event_sink.record(&event);
        Ok(event)
    }

    /// Marks every PENDING, RETRY or RUNNING task SKIPPED. Failures are logged:
    /// this runs on paths that are already winding down.
    pub(super) async fn skip_open_tasks(&self, mission_id: MissionId, reason: &str) {
        let tasks = match self.repository.get_tasks_for_mission(mission_id).await {
            Ok(tasks) => tasks,
            Err(e) => {
                warn!("Could not list tasks of mission {}: {}", mission_id, e);
                return;
            }
        };

        for task in tasks.into_iter().filter(|t| !t.status.is_terminal()) {
            match self
                .repository
                .update_task_status(task.id, TaskStatus::Skipped, None)
                .await
            {
                Ok(_) => {
                    let payload = json!({ "task_key": task.task_key, "reason": reason });
                    if let Err(e) = self
                        .append_event(mission_id, EventType::TaskSkipped, payload)
                        .await
                    {
                        warn!("Could not record skip of '{}': {}", task.task_key, e);
                    }
                }
                // Already terminal: someone else got there first.
                Err(RepositoryError::Conflict(_)) => {}
                Err(e) => warn!("Could not skip task '{}': {}", task.task_key, e),
            }
        }
    }

    /// Runs a council call through retry, the role's breaker and the council
    /// deadline.
    pub(super) async fn council_call<T, F, Fut>(
        &self,
        role: CouncilRole,
        work: F,
    ) -> Result<T, OrchestratorError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CouncilError>>,
    {
        self.council_policy(role)
            .execute(work)
            .await
            .map_err(|e| {
                if e.is_cancelled() {
                    OrchestratorError::Cancelled
                } else {
                    OrchestratorError::Council(e)
                }
            })
    }

    pub(super) fn council_policy<T>(&self, role: CouncilRole) -> CompositeResiliencePolicy<T> {
        let name = role.breaker_name();
        let policy = CompositeResiliencePolicy::new(name.as_str())
            .with_retry(RetryPolicy::new(self.resilience.retry.clone()))
            .with_circuit_breaker(self.breakers.get_or_create(&name, &self.resilience.breaker))
            .with_timeout(TimeoutPolicy::new(TimeoutConfig {
                timeout: self.params.council_timeout,
            }));
        match &self.cancellation_token {
            Some(token) => policy.with_cancellation(token.clone()),
            None => policy,
        }
    }

    pub(super) fn check_cancelled(&self) -> Result<(), OrchestratorError> {
        if let Some(token) = &self.cancellation_token
            && token.is_cancelled()
        {
            return Err(OrchestratorError::Cancelled);
        }
        Ok(())
    }
}
