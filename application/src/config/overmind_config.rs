//! Overmind configuration container.
//!
//! [`OvermindConfig`] groups the split configuration types. Use cases receive
//! only the slices they need; the entrypoint holds the full container to wire
//! them.
//!
//! | Type | Orchestrator | Runner | Service |
//! |------|--------------|--------|---------|
//! | `OrchestratorParams` | Yes | No | No |
//! | `ResilienceConfig` | Yes | No | No |
//! | `RunnerParams` | No | Yes | Yes |

use super::{OrchestratorParams, ResilienceConfig, RunnerParams};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OvermindConfig {
    orchestrator: OrchestratorParams,
    resilience: ResilienceConfig,
    runner: RunnerParams,
}

impl OvermindConfig {
    pub fn new(
        orchestrator: OrchestratorParams,
        resilience: ResilienceConfig,
        runner: RunnerParams,
    ) -> Self {
        Self {
            orchestrator,
            resilience,
            runner,
        }
    }

    // ==================== Accessors ====================

    pub fn orchestrator(&self) -> &OrchestratorParams {
        &self.orchestrator
    }

    pub fn resilience(&self) -> &ResilienceConfig {
        &self.resilience
    }

    pub fn runner(&self) -> &RunnerParams {
        &self.runner
    }
}
