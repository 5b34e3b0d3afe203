//! Application-level configuration.
//!
//! This module provides configuration types that control how use cases behave:
//!
//! - [`OrchestratorParams`]: mission loop control (adaptations, parallelism, deadlines)
//! - [`ResilienceConfig`]: breaker, retry, timeout and bulkhead settings
//! - [`RunnerParams`]: worker pool, queue and progress polling
//! - [`OvermindConfig`]: container for the above

pub mod orchestrator_params;
pub mod overmind_config;
pub mod resilience_config;
pub mod runner_params;

pub use orchestrator_params::OrchestratorParams;
pub use overmind_config::OvermindConfig;
pub use resilience_config::ResilienceConfig;
pub use runner_params::RunnerParams;
