//! Logging configuration from TOML (`[logging]` section)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw logging configuration from TOML
///
/// # Example
///
/// ```toml
/// [logging]
/// event_log = "missions.events.jsonl"   # JSONL mirror of the mission event log
/// log_dir = "~/.local/state/overmind"   # daily-rolling diagnostic logs
/// ```
///
/// Both are off when unset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileLoggingConfig {
    pub event_log: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
}
