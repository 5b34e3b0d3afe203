//! Application layer for overmind
//!
//! This crate contains the mission orchestrator, the resilience layer, port
//! definitions and application configuration. It depends only on the domain
//! layer.

pub mod config;
pub mod ports;
pub mod resilience;
pub mod use_cases;

// Re-export commonly used types
pub use config::{OrchestratorParams, OvermindConfig, ResilienceConfig, RunnerParams};
pub use ports::{
    council::{Architect, Council, CouncilError, CouncilRole, Executor, Planner, Reflector},
    event_sink::{MissionEventSink, NoEventSink},
    mission_repository::{MissionRepository, RepositoryError, StatusTransition},
    tool_invoker::ToolInvoker,
};
pub use resilience::{
    BulkheadRegistry, CircuitBreakerRegistry, CircuitState, Classify, FailureClass,
    ResilienceError,
};
pub use use_cases::mission_runner::{MissionJob, MissionRunner, RunnerError};
pub use use_cases::mission_service::{MissionService, MissionServiceError, StartMissionOutput};
pub use use_cases::mission_status::{
    MissionStatusSnapshot, ProgressKind, ProgressLine, TaskCounts,
};
pub use use_cases::orchestrator::{MissionOutcome, OrchestratorError, OvermindOrchestrator};
