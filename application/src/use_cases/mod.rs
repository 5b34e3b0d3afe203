//! Use cases
//!
//! Application-level operations that drive missions through their lifecycle.

pub mod mission_runner;
pub mod mission_service;
pub mod mission_status;
pub mod orchestrator;
