//! Orchestrator configuration from TOML (`[orchestrator]` section)

use super::ConfigIssue;
use overmind_application::OrchestratorParams;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Raw orchestrator configuration from TOML
///
/// # Example
///
/// ```toml
/// [orchestrator]
/// max_adaptations = 1        # re-plans after failures; 0 disables adaptation
/// max_parallel_tasks = 4
/// tool_timeout_secs = 8
/// council_timeout_secs = 60
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileOrchestratorConfig {
    pub max_adaptations: u32,
    pub max_parallel_tasks: usize,
    pub tool_timeout_secs: u64,
    pub council_timeout_secs: u64,
}

impl Default for FileOrchestratorConfig {
    fn default() -> Self {
        let params = OrchestratorParams::default();
        Self {
            max_adaptations: params.max_adaptations,
            max_parallel_tasks: params.max_parallel_tasks,
            tool_timeout_secs: params.tool_timeout.as_secs(),
            council_timeout_secs: params.council_timeout.as_secs(),
        }
    }
}

impl FileOrchestratorConfig {
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();
        if self.max_parallel_tasks == 0 {
            issues.push(ConfigIssue::error(
                "orchestrator.max_parallel_tasks",
                "must be at least 1",
            ));
        }
        if self.tool_timeout_secs == 0 {
            issues.push(ConfigIssue::error(
                "orchestrator.tool_timeout_secs",
                "cannot be 0",
            ));
        }
        if self.council_timeout_secs == 0 {
            issues.push(ConfigIssue::error(
                "orchestrator.council_timeout_secs",
                "cannot be 0",
            ));
        }
        issues
    }

    pub fn to_params(&self) -> OrchestratorParams {
        OrchestratorParams::default()
            .with_max_adaptations(self.max_adaptations)
            .with_max_parallel_tasks(self.max_parallel_tasks)
            .with_tool_timeout(Duration::from_secs(self.tool_timeout_secs))
            .with_council_timeout(Duration::from_secs(self.council_timeout_secs))
    }
}
