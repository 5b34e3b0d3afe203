//! Configuration file loading for overmind
//!
//! This module handles file I/O and merging of configuration from multiple sources.
//! The priority order (highest to lowest):
//!
//! 1. `OVERMIND_*` environment variables (`__` separates sections)
//! 2. `--config <path>` specified file
//! 3. Project root: `./overmind.toml`
//! 4. Global: `$XDG_CONFIG_HOME/overmind/config.toml` (or `~/.config/overmind/config.toml`)
//! 5. Default values

mod file_config;
mod loader;

pub use file_config::{
    ConfigIssue, FileBreakerConfig, FileBulkheadConfig, FileConfig, FileLoggingConfig,
    FileOrchestratorConfig, FileResilienceConfig, FileRetryConfig, FileRunnerConfig,
    FileStorageConfig, FileTimeoutConfig, Severity, StorageBackend,
};
pub use loader::{ConfigError, ConfigLoader};
