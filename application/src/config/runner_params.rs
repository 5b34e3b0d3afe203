//! Mission runner and progress bridge parameters.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerParams {
    /// Worker threads, each with its own runtime.
    pub workers: usize,
    /// Missions that may wait for a worker.
    pub queue_capacity: usize,
    /// Progress stream polling interval.
    pub poll_interval: Duration,
    /// Polls before the progress stream reports the mission as continuing in
    /// the background.
    pub max_polls: u32,
    /// Deadline on every repository call made from the request side.
    pub bridge_timeout: Duration,
}

impl Default for RunnerParams {
    fn default() -> Self {
        Self {
            workers: 2,
            queue_capacity: 64,
            poll_interval: Duration::from_millis(500),
            max_polls: 240,
            bridge_timeout: Duration::from_secs(5),
        }
    }
}

impl RunnerParams {
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_max_polls(mut self, max: u32) -> Self {
        self.max_polls = max;
        self
    }

    pub fn with_bridge_timeout(mut self, timeout: Duration) -> Self {
        self.bridge_timeout = timeout;
        self
    }
}
