//! Mission domain module
//!
//! Missions, their versioned plans, tasks and the append-only event log,
//! plus the council artifacts exchanged while planning and verifying.

pub mod entities;
pub mod graph;
pub mod objective;
pub mod plan;
pub mod status;
pub mod value_objects;

pub use entities::{
    Mission, MissionDetails, MissionEvent, MissionPlan, NewMissionPlan, NewTask, Task, excerpt,
};
pub use graph::{PlanIssue, execution_stages, validate_draft};
pub use objective::{MAX_OBJECTIVE_CHARS, Objective};
pub use plan::{
    Blueprint, BlueprintStep, Critique, PlanDraft, PlanFeedback, TaskSpec, Verification,
};
pub use status::{EventType, MissionStatus, PlanStatus, TaskStatus};
pub use value_objects::{EventId, MissionId, PlanId, TaskId, TaskKey};
