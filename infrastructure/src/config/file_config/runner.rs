//! Runner configuration from TOML (`[runner]` section)

use super::ConfigIssue;
use overmind_application::RunnerParams;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Raw runner configuration from TOML
///
/// # Example
///
/// ```toml
/// [runner]
/// workers = 2
/// queue_capacity = 64
/// poll_interval_ms = 500
/// max_polls = 240
/// bridge_timeout_ms = 5000
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileRunnerConfig {
    pub workers: usize,
    pub queue_capacity: usize,
    pub poll_interval_ms: u64,
    pub max_polls: u32,
    pub bridge_timeout_ms: u64,
}

impl Default for FileRunnerConfig {
    fn default() -> Self {
        let params = RunnerParams::default();
        Self {
            workers: params.workers,
            queue_capacity: params.queue_capacity,
            poll_interval_ms: millis(params.poll_interval),
            max_polls: params.max_polls,
            bridge_timeout_ms: millis(params.bridge_timeout),
        }
    }
}

impl FileRunnerConfig {
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();
        if self.workers == 0 {
            issues.push(ConfigIssue::error("runner.workers", "must be at least 1"));
        }
        if self.queue_capacity == 0 {
            issues.push(ConfigIssue::error(
                "runner.queue_capacity",
                "must be at least 1",
            ));
        }
        if self.poll_interval_ms == 0 {
            issues.push(ConfigIssue::warning(
                "runner.poll_interval_ms",
                "0 makes progress streams poll without pause",
            ));
        }
        if self.bridge_timeout_ms == 0 {
            issues.push(ConfigIssue::error(
                "runner.bridge_timeout_ms",
                "cannot be 0",
            ));
        }
        issues
    }

    pub fn to_params(&self) -> RunnerParams {
        RunnerParams::default()
            .with_workers(self.workers)
            .with_queue_capacity(self.queue_capacity)
            .with_poll_interval(Duration::from_millis(self.poll_interval_ms))
            .with_max_polls(self.max_polls)
            .with_bridge_timeout(Duration::from_millis(self.bridge_timeout_ms))
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
