//! Port definitions (interfaces for external adapters)
//!
//! Ports define the contracts that infrastructure adapters must implement.

pub mod council;
pub mod event_sink;
pub mod mission_repository;
pub mod tool_invoker;
