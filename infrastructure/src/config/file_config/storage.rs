//! Storage configuration from TOML (`[storage]` section)

use super::ConfigIssue;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Which mission repository the binary wires in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Process-local; missions vanish on exit
    #[default]
    Memory,
    /// SQLite file shared between invocations
    Sqlite,
}

/// Raw storage configuration from TOML
///
/// # Example
///
/// ```toml
/// [storage]
/// backend = "sqlite"                       # "memory" or "sqlite"
/// path = "~/.local/share/overmind/missions.db"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileStorageConfig {
    pub backend: StorageBackend,
    pub path: Option<PathBuf>,
}

impl FileStorageConfig {
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();
        if self.backend == StorageBackend::Memory && self.path.is_some() {
            issues.push(ConfigIssue::warning(
                "storage.path",
                "ignored by the memory backend",
            ));
        }
        if self.backend == StorageBackend::Sqlite && self.resolved_path().is_none() {
            issues.push(ConfigIssue::error(
                "storage.path",
                "no path given and no data directory found",
            ));
        }
        issues
    }

    /// The database file: the configured path with `~` expanded, otherwise
    /// `<data dir>/overmind/missions.db`.
    pub fn resolved_path(&self) -> Option<PathBuf> {
        match &self.path {
            Some(path) => Some(expand_home(path)),
            None => dirs::data_dir().map(|d| d.join("overmind").join("missions.db")),
        }
    }
}

fn expand_home(path: &std::path::Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    path.to_path_buf()
}
