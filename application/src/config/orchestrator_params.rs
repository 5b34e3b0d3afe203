//! Orchestrator parameters: mission loop control.
//!
//! [`OrchestratorParams`] groups the static parameters that bound one mission
//! run in [`OvermindOrchestrator`](crate::use_cases::orchestrator::OvermindOrchestrator).

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorParams {
    /// Re-planning rounds permitted after task failures before the mission
    /// fails. 0 disables adaptation.
    pub max_adaptations: u32,
    /// Tasks in flight at once.
    pub max_parallel_tasks: usize,
    /// Deadline handed to each tool invocation. Every retry of the call has to
    /// fit inside the resilience timeout.
    pub tool_timeout: Duration,
    /// Deadline for one council call, retries included.
    pub council_timeout: Duration,
}

impl Default for OrchestratorParams {
    fn default() -> Self {
        Self {
            max_adaptations: 1,
            max_parallel_tasks: 4,
            tool_timeout: Duration::from_secs(8),
            council_timeout: Duration::from_secs(60),
        }
    }
}

impl OrchestratorParams {
    // ==================== Builder Methods ====================

    pub fn with_max_adaptations(mut self, max: u32) -> Self {
        self.max_adaptations = max;
        self
    }

    pub fn with_max_parallel_tasks(mut self, max: usize) -> Self {
        self.max_parallel_tasks = max;
        self
    }

    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    pub fn with_council_timeout(mut self, timeout: Duration) -> Self {
        self.council_timeout = timeout;
        self
    }
}
