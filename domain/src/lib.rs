//! Domain layer for overmind
//!
//! This crate contains the mission model: entities, status machines, council
//! artifacts and dependency-graph validation. It performs no I/O and has no
//! dependencies on infrastructure or presentation concerns.
//!
//! # Core Concepts
//!
//! ## Mission
//!
//! A mission is derived from a free-text objective and tracked to a terminal
//! outcome through a fixed transition graph (see [`MissionStatus`]).
//!
//! ## Plan / Task
//!
//! - **Plan**: a versioned, council-approved decomposition of a mission
//! - **Task**: one tool invocation, gated by its dependencies reaching SUCCESS
//!
//! ## Council
//!
//! Planner, Architect and Reflector exchange [`PlanDraft`], [`Blueprint`],
//! [`Critique`] and [`Verification`] values.

pub mod core;
pub mod mission;
pub mod tool;

// Re-export commonly used types
pub use core::error::DomainError;
pub use mission::{
    Blueprint, BlueprintStep, Critique, EventId, EventType, Mission, MissionDetails, MissionEvent,
    MissionId, MissionPlan, MissionStatus, NewMissionPlan, NewTask, Objective, PlanDraft,
    PlanFeedback, PlanId, PlanIssue, PlanStatus, Task, TaskId, TaskKey, TaskSpec, TaskStatus,
    Verification, excerpt, execution_stages, validate_draft,
};
pub use tool::{ToolError, ToolInvocation};
