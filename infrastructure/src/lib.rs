//! Infrastructure layer for overmind
//!
//! This crate contains adapters that implement the ports defined in the
//! application layer: mission storage, the JSONL event exporter, rule-based
//! council members and the tool registry, plus configuration file loading.

pub mod config;
pub mod council;
pub mod logging;
pub mod persistence;
pub mod tools;

// Re-export commonly used types
pub use config::{
    ConfigError, ConfigIssue, ConfigLoader, FileConfig, Severity, StorageBackend,
};
pub use council::{
    BlueprintArchitect, PolicyReflector, RulePlanner, ToolOperator, rule_based_council,
};
pub use logging::JsonlEventExporter;
pub use persistence::{InMemoryMissionRepository, SqliteMissionRepository};
pub use tools::{Tool, ToolRegistry};
