//! Mission runner: a bounded job queue drained by a pool of worker threads.
//!
//! Each worker owns a current-thread Tokio runtime, so a long mission never
//! occupies the caller's scheduler and a failing request cannot abort an
//! in-flight mission. Only [`MissionJob`] values cross the queue.

use super::orchestrator::{OrchestratorError, OvermindOrchestrator};
use crate::config::RunnerParams;
use overmind_domain::MissionId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Request to run one mission end to end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissionJob {
    pub mission_id: MissionId,
}

#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Mission queue is full ({0} waiting)")]
    QueueFull(usize),

    #[error("Mission runner is stopped")]
    Stopped,

    #[error("Failed to start worker: {0}")]
    Spawn(#[from] std::io::Error),
}

type TokenMap = Arc<Mutex<HashMap<MissionId, CancellationToken>>>;

pub struct MissionRunner {
    sender: Mutex<Option<mpsc::Sender<MissionJob>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    tokens: TokenMap,
    queue_capacity: usize,
}

impl MissionRunner {
    /// Spawns `params.workers` threads that run jobs with `orchestrator`.
    pub fn start(
        orchestrator: OvermindOrchestrator,
        params: &RunnerParams,
    ) -> Result<Self, RunnerError> {
        let queue_capacity = params.queue_capacity.max(1);
        let (sender, receiver) = mpsc::channel::<MissionJob>(queue_capacity);
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let tokens: TokenMap = Arc::new(Mutex::new(HashMap::new()));

        let worker_count = params.workers.max(1);
        let mut workers = Vec::with_capacity(worker_count);
        for index in 0..worker_count {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;
            let orchestrator = orchestrator.clone();
            let receiver = Arc::clone(&receiver);
            let tokens = Arc::clone(&tokens);
            let handle = std::thread::Builder::new()
                .name(format!("overmind-runner-{}", index))
                .spawn(move || {
                    runtime.block_on(worker_loop(index, orchestrator, receiver, tokens));
                })?;
            workers.push(handle);
        }

        info!(
            "Mission runner started with {} worker(s), queue capacity {}",
            worker_count, queue_capacity
        );
        Ok(Self {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
            tokens,
            queue_capacity,
        })
    }

    /// Enqueues a mission without waiting. The mission's cancellation token
    /// exists from this point on, so a cancel can land before a worker picks
    /// the job up.
    pub fn submit(&self, job: MissionJob) -> Result<(), RunnerError> {
        let sender = lock(&self.sender).clone().ok_or(RunnerError::Stopped)?;
        let mission_id = job.mission_id;
        lock(&self.tokens).insert(mission_id, CancellationToken::new());

        match sender.try_send(job) {
            Ok(()) => {
                debug!("Mission {} queued", mission_id);
                Ok(())
            }
            Err(e) => {
                lock(&self.tokens).remove(&mission_id);
                match e {
                    TrySendError::Full(_) => Err(RunnerError::QueueFull(self.queue_capacity)),
                    TrySendError::Closed(_) => Err(RunnerError::Stopped),
                }
            }
        }
    }

    /// Cancels a queued or running mission. Returns `false` when this runner
    /// does not know the mission.
    pub fn cancel(&self, mission_id: MissionId) -> bool {
        match lock(&self.tokens).get(&mission_id) {
            Some(token) => {
                info!("Cancelling mission {}", mission_id);
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Whether the mission is queued or running here.
    pub fn is_active(&self, mission_id: MissionId) -> bool {
        lock(&self.tokens).contains_key(&mission_id)
    }

    pub fn active_missions(&self) -> Vec<MissionId> {
        let mut ids: Vec<MissionId> = lock(&self.tokens).keys().copied().collect();
        ids.sort();
        ids
    }

    /// Closes the queue and waits for workers to finish the jobs already
    /// queued.
    pub fn shutdown(&self) {
        lock(&self.sender).take();
        let workers: Vec<JoinHandle<()>> = lock(&self.workers).drain(..).collect();
        for worker in workers {
            let name = worker.thread().name().unwrap_or("worker").to_string();
            if worker.join().is_err() {
                warn!("Mission runner thread {} panicked", name);
            }
        }
        info!("Mission runner stopped");
    }
}

async fn worker_loop(
    index: usize,
    orchestrator: OvermindOrchestrator,
    receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<MissionJob>>>,
    tokens: TokenMap,
) {
    loop {
        let job = {
            let mut receiver = receiver.lock().await;
            receiver.recv().await
        };
        let Some(job) = job else {
            debug!("Runner worker {} exiting", index);
            break;
        };

        let mission_id = job.mission_id;
        let token = lock(&tokens).get(&mission_id).cloned().unwrap_or_default();
        if token.is_cancelled() {
            debug!("Mission {} cancelled before start", mission_id);
            lock(&tokens).remove(&mission_id);
            continue;
        }

        debug!("Runner worker {} picked up mission {}", index, mission_id);
        let result = orchestrator
            .clone()
            .with_cancellation(token)
            .run(mission_id)
            .await;
        match result {
            Ok(outcome) => info!(
                "Mission {} finished {}: {}",
                mission_id, outcome.status, outcome.summary
            ),
            Err(OrchestratorError::Cancelled) => info!("Mission {} stopped by cancel", mission_id),
            Err(e) => error!("Mission {} run failed: {}", mission_id, e),
        }
        lock(&tokens).remove(&mission_id);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
