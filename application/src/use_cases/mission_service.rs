//! Mission service: the request-side facade.
//!
//! Request handlers call this from their own runtime. It only creates the
//! mission row, hands the mission to the [`MissionRunner`] and returns; all
//! reads afterwards go through repository calls bounded by
//! `RunnerParams::bridge_timeout`.

use super::mission_runner::{MissionJob, MissionRunner, RunnerError};
use super::mission_status::{MissionStatusSnapshot, ProgressLine};
use crate::config::RunnerParams;
use crate::ports::event_sink::{MissionEventSink, NoEventSink};
use crate::ports::mission_repository::{MissionRepository, RepositoryError};
use futures::stream::{self, BoxStream, StreamExt};
use overmind_domain::{
    DomainError, EventType, MissionEvent, MissionId, MissionStatus, Objective, TaskStatus,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Characters of the objective echoed back by `start_mission`.
const OBJECTIVE_EXCERPT_CHARS: usize = 80;

#[derive(Error, Debug)]
pub enum MissionServiceError {
    #[error("Invalid objective: {0}")]
    InvalidObjective(String),

    #[error("Mission queue is full")]
    QueueFull,

    #[error("Mission runner is stopped")]
    RunnerStopped,

    #[error("Storage did not answer within {}ms", .0.as_millis())]
    BridgeTimeout(Duration),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
}

impl From<DomainError> for MissionServiceError {
    fn from(e: DomainError) -> Self {
        match e {
            DomainError::InvalidObjective(msg) => MissionServiceError::InvalidObjective(msg),
            other => MissionServiceError::InvalidObjective(other.to_string()),
        }
    }
}

/// Returned to the caller as soon as the mission is queued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartMissionOutput {
    pub mission_id: MissionId,
    pub status: MissionStatus,
    pub objective_excerpt: String,
}

#[derive(Clone)]
pub struct MissionService {
    repository: Arc<dyn MissionRepository>,
    runner: Option<Arc<MissionRunner>>,
    params: RunnerParams,
    event_sink: Arc<dyn MissionEventSink>,
}

impl MissionService {
    pub fn new(
        repository: Arc<dyn MissionRepository>,
        runner: Arc<MissionRunner>,
        params: RunnerParams,
    ) -> Self {
        Self {
            repository,
            runner: Some(runner),
            params,
            event_sink: Arc::new(NoEventSink),
        }
    }

    /// A service that can inspect and cancel missions but not start them,
    /// for processes that only read a shared store.
    pub fn read_only(repository: Arc<dyn MissionRepository>, params: RunnerParams) -> Self {
        Self {
            repository,
            runner: None,
            params,
            event_sink: Arc::new(NoEventSink),
        }
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn MissionEventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Creates a PENDING mission and queues it. Returns without waiting for
    /// planning to start.
    pub async fn start_mission(
        &self,
        objective: &str,
        initiator_id: i64,
    ) -> Result<StartMissionOutput, MissionServiceError> {
        let objective = Objective::parse(objective)?;
        let runner = self
            .runner
            .as_ref()
            .ok_or(MissionServiceError::RunnerStopped)?;

        let mission = self
            .bridge(self.repository.create_mission(objective.as_str(), initiator_id))
            .await?;
        self.record(
            mission.id,
            EventType::Created,
            json!({
                "objective": mission.objective,
                "initiator_id": initiator_id,
            }),
        )
        .await?;

        if let Err(e) = runner.submit(MissionJob {
            mission_id: mission.id,
        }) {
            warn!("Mission {} not queued: {}", mission.id, e);
            self.close_unqueued(mission.id, &e).await;
            return Err(match e {
                RunnerError::QueueFull(_) => MissionServiceError::QueueFull,
                RunnerError::Stopped | RunnerError::Spawn(_) => MissionServiceError::RunnerStopped,
            });
        }

        info!("Mission {} started by {}", mission.id, initiator_id);
        Ok(StartMissionOutput {
            mission_id: mission.id,
            status: mission.status,
            objective_excerpt: mission.objective_excerpt(OBJECTIVE_EXCERPT_CHARS),
        })
    }

    pub async fn get_mission_status(
        &self,
        mission_id: MissionId,
    ) -> Result<MissionStatusSnapshot, MissionServiceError> {
        let mission = self.bridge(self.repository.get_mission(mission_id)).await?;
        let tasks = self
            .bridge(self.repository.get_tasks_for_mission(mission_id))
            .await?;
        Ok(MissionStatusSnapshot::new(&mission, &tasks))
    }

    /// Stops scheduling for the mission and marks it CANCELED. Terminal
    /// missions are returned unchanged.
    pub async fn cancel_mission(
        &self,
        mission_id: MissionId,
    ) -> Result<MissionStatusSnapshot, MissionServiceError> {
        if let Some(runner) = &self.runner {
            runner.cancel(mission_id);
        }

        let mission = self.bridge(self.repository.get_mission(mission_id)).await?;
        if !mission.status.is_terminal() {
            match self
                .bridge(self.repository.update_mission_status(
                    mission_id,
                    MissionStatus::Canceled,
                    Some("canceled by request".to_string()),
                ))
                .await
            {
                Ok(applied) => {
                    self.event_sink.record(&applied.event);
                    self.record(
                        mission_id,
                        EventType::MissionCanceled,
                        json!({ "reason": "canceled by request" }),
                    )
                    .await?;
                    self.skip_pending(mission_id).await?;
                    info!("Mission {} canceled", mission_id);
                }
                // Reached a terminal status in the meantime.
                Err(MissionServiceError::Repository(RepositoryError::InvalidTransition {
                    ..
                })) => debug!("Mission {} finished before cancel", mission_id),
                Err(e) => return Err(e),
            }
        }

        self.get_mission_status(mission_id).await
    }

    /// The mission event log, oldest first.
    pub async fn event_log(
        &self,
        mission_id: MissionId,
    ) -> Result<Vec<MissionEvent>, MissionServiceError> {
        self.bridge(self.repository.get_mission(mission_id)).await?;
        self.bridge(self.repository.list_events(mission_id)).await
    }

    /// Polls the mission every `poll_interval` and yields a line whenever
    /// its status or task counts change. The stream ends after the terminal
    /// summary, or after `max_polls` polls with a line saying the mission
    /// continues in the background.
    pub fn stream_progress(&self, mission_id: MissionId) -> BoxStream<'static, ProgressLine> {
        struct PollState {
            service: MissionService,
            polls: u32,
            last: Option<MissionStatusSnapshot>,
            done: bool,
        }

        let state = PollState {
            service: self.clone(),
            polls: 0,
            last: None,
            done: false,
        };

        stream::unfold(state, move |mut state| async move {
            loop {
                if state.done {
                    return None;
                }
                if state.polls >= state.service.params.max_polls {
                    state.done = true;
                    let status = state.last.as_ref().map(|s| s.status);
                    return Some((ProgressLine::background(mission_id, status), state));
                }
                if state.polls > 0 {
                    tokio::time::sleep(state.service.params.poll_interval).await;
                }
                state.polls += 1;

                let snapshot = match state.service.get_mission_status(mission_id).await {
                    Ok(snapshot) => snapshot,
                    Err(e) => {
                        state.done = true;
                        return Some((ProgressLine::unavailable(mission_id, e), state));
                    }
                };

                if snapshot.is_terminal {
                    state.done = true;
                    return Some((ProgressLine::terminal(&snapshot), state));
                }
                let changed = state
                    .last
                    .as_ref()
                    .is_none_or(|last| snapshot.differs_from(last));
                if changed {
                    let line = ProgressLine::update(&snapshot);
                    state.last = Some(snapshot);
                    return Some((line, state));
                }
            }
        })
        .boxed()
    }

    /// Runs a repository call under the bridge deadline.
    async fn bridge<T, Fut>(&self, call: Fut) -> Result<T, MissionServiceError>
    where
        Fut: Future<Output = Result<T, RepositoryError>>,
    {
        match tokio::time::timeout(self.params.bridge_timeout, call).await {
            Ok(result) => result.map_err(MissionServiceError::from),
            Err(_) => Err(MissionServiceError::BridgeTimeout(self.params.bridge_timeout)),
        }
    }

    async fn record(
        &self,
        mission_id: MissionId,
        event_type: EventType,
        payload: Value,
    ) -> Result<(), MissionServiceError> {
        let event = self
            .bridge(self.repository.create_event(mission_id, event_type, payload))
            .await?;
        self.event_sink.record(&event);
        Ok(())
    }

    async fn skip_pending(&self, mission_id: MissionId) -> Result<(), MissionServiceError> {
        let tasks = self
            .bridge(self.repository.get_tasks_for_mission(mission_id))
            .await?;
        for task in tasks.into_iter().filter(|t| t.status == TaskStatus::Pending) {
            match self
                .bridge(
                    self.repository
                        .update_task_status(task.id, TaskStatus::Skipped, None),
                )
                .await
            {
                Ok(_) => {
                    self.record(
                        mission_id,
                        EventType::TaskSkipped,
                        json!({ "task_key": task.task_key, "reason": "mission canceled" }),
                    )
                    .await?
                }
                Err(MissionServiceError::Repository(RepositoryError::Conflict(_))) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// A mission that never reached the queue is canceled so it does not sit
    /// in PENDING forever.
    async fn close_unqueued(&self, mission_id: MissionId, reason: &RunnerError) {
        let summary = format!("not started: {}", reason);
        let result = self
            .bridge(self.repository.update_mission_status(
                mission_id,
                MissionStatus::Canceled,
                Some(summary.clone()),
            ))
            .await;
        match result {
            Ok(applied) => self.event_sink.record(&applied.event),
            Err(e) => {
                warn!("Could not close mission {}: {}", mission_id, e);
                return;
            }
        }
        let payload = json!({ "reason": summary });
        if let Err(e) = self
            .record(mission_id, EventType::MissionCanceled, payload)
            .await
        {
            warn!("Could not record cancel of mission {}: {}", mission_id, e);
        }
    }
}
