//! Raw TOML configuration data types
//!
//! These structs represent the exact structure of the TOML config file.
//! Durations are plain integers with the unit in the field name; the
//! conversion methods turn them into application parameters.

mod logging;
mod orchestrator;
mod resilience;
mod runner;
mod storage;

pub use logging::FileLoggingConfig;
pub use orchestrator::FileOrchestratorConfig;
pub use resilience::{
    FileBreakerConfig, FileBulkheadConfig, FileResilienceConfig, FileRetryConfig,
    FileTimeoutConfig,
};
pub use runner::FileRunnerConfig;
pub use storage::{FileStorageConfig, StorageBackend};

use overmind_application::OvermindConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Severity level of a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The configuration cannot work as written.
    Error,
    /// The configuration works, but a value was adjusted or ignored.
    Warning,
}

/// A problem detected by [`FileConfig::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigIssue {
    pub severity: Severity,
    /// Dotted path of the offending key, e.g. `runner.workers`
    pub field: String,
    pub message: String,
}

impl ConfigIssue {
    pub fn error(field: &str, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            field: field.to_string(),
            message: message.into(),
        }
    }

    pub fn warning(field: &str, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Complete file configuration (raw TOML structure)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    /// Mission loop settings
    pub orchestrator: FileOrchestratorConfig,
    /// Breaker, retry, timeout and bulkhead settings
    pub resilience: FileResilienceConfig,
    /// Worker pool and progress polling
    pub runner: FileRunnerConfig,
    /// Mission store
    pub storage: FileStorageConfig,
    /// Event log and diagnostic log locations
    pub logging: FileLoggingConfig,
}

impl FileConfig {
    /// Validate the entire configuration, returning all detected issues.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();
        issues.extend(self.orchestrator.validate());
        issues.extend(self.resilience.validate());
        issues.extend(self.runner.validate());
        issues.extend(self.storage.validate());
        issues.extend(self.validate_tool_budget());
        issues
    }

    /// A tool call's retries all run under one resilience timeout. When the
    /// attempts and their backoff outlast it, the outer deadline fires first
    /// and the later attempts never get their full tool timeout.
    fn validate_tool_budget(&self) -> Option<ConfigIssue> {
        let resilience = self.resilience.to_config();
        let retry = &resilience.retry;
        let attempts = retry.max_attempts.max(1);
        let jitter = if retry.jitter { 1.5 } else { 1.0 };

        let backoff = (1..attempts)
            .map(|attempt| retry.delay_for_attempt(attempt).mul_f64(jitter))
            .fold(Duration::ZERO, Duration::saturating_add);
        let budget = Duration::from_secs(self.orchestrator.tool_timeout_secs)
            .saturating_mul(attempts)
            .saturating_add(backoff);

        (budget >= resilience.timeout.timeout).then(|| {
            ConfigIssue::warning(
                "orchestrator.tool_timeout_secs",
                format!(
                    "{} attempts of {}s plus up to {:?} backoff do not fit in \
                     resilience.timeout.timeout_secs ({}s)",
                    attempts,
                    self.orchestrator.tool_timeout_secs,
                    backoff,
                    resilience.timeout.timeout.as_secs()
                ),
            )
        })
    }

    /// Whether any issue is fatal.
    pub fn has_errors(issues: &[ConfigIssue]) -> bool {
        issues.iter().any(|i| i.severity == Severity::Error)
    }

    pub fn to_overmind_config(&self) -> OvermindConfig {
        OvermindConfig::new(
            self.orchestrator.to_params(),
            self.resilience.to_config(),
            self.runner.to_params(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_full_config() {
        let toml_str = r#"
[orchestrator]
max_adaptations = 2
max_parallel_tasks = 8
tool_timeout_secs = 10

[resilience.breaker]
failure_threshold = 3

[resilience.retry]
max_attempts = 5
jitter = false

[runner]
workers = 4
poll_interval_ms = 250

[storage]
backend = "sqlite"
path = "/tmp/overmind.db"

[logging]
event_log = "/tmp/events.jsonl"
"#;

        let config: FileConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.orchestrator.max_adaptations, 2);
        assert_eq!(config.orchestrator.max_parallel_tasks, 8);
        assert_eq!(config.resilience.breaker.failure_threshold, 3);
        assert_eq!(config.resilience.retry.max_attempts, 5);
        assert!(!config.resilience.retry.jitter);
        assert_eq!(config.runner.workers, 4);
        assert_eq!(config.storage.backend, StorageBackend::Sqlite);
        assert!(config.logging.event_log.is_some());

        let overmind = config.to_overmind_config();
        assert_eq!(overmind.orchestrator().tool_timeout, Duration::from_secs(10));
        assert_eq!(overmind.runner().poll_interval, Duration::from_millis(250));
        assert_eq!(overmind.resilience().retry.max_attempts, 5);
    }

    #[test]
    fn test_deserialize_partial_config() {
        let toml_str = r#"
[orchestrator]
max_adaptations = 0
"#;

        let config: FileConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.orchestrator.max_adaptations, 0);
        // Defaults should apply
        assert_eq!(config.orchestrator.max_parallel_tasks, 4);
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.runner, FileRunnerConfig::default());
    }

    #[test]
    fn test_default_config_matches_application_defaults() {
        let config = FileConfig::default().to_overmind_config();
        assert_eq!(config, OvermindConfig::default());
    }

    #[test]
    fn test_validate_valid_config() {
        let config = FileConfig::default();
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_validate_collects_issues_from_every_section() {
        let mut config = FileConfig::default();
        config.orchestrator.max_parallel_tasks = 0;
        config.runner.workers = 0;
        config.resilience.bulkhead.max_queue = 1;

        let issues = config.validate();
        let fields: Vec<&str> = issues.iter().map(|i| i.field.as_str()).collect();
        assert!(fields.contains(&"orchestrator.max_parallel_tasks"));
        assert!(fields.contains(&"runner.workers"));
        assert!(fields.contains(&"resilience.bulkhead.max_queue"));
        assert!(FileConfig::has_errors(&issues));
    }

    #[test]
    fn test_tool_retries_must_fit_resilience_timeout() {
        let mut config = FileConfig::default();
        config.orchestrator.tool_timeout_secs = 30;

        let issues = config.validate();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].field, "orchestrator.tool_timeout_secs");
        assert_eq!(issues[0].severity, Severity::Warning);

        config.resilience.retry.max_attempts = 1;
        config.orchestrator.tool_timeout_secs = 29;
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_tool_budget_counts_backoff() {
        let mut config = FileConfig::default();
        config.orchestrator.tool_timeout_secs = 9;
        config.resilience.retry.jitter = false;
        config.resilience.retry.initial_delay_ms = 1_000;
        config.resilience.retry.max_delay_ms = 1_000;

        // 3 x 9s with two 1s delays fits in 30s; two 2s delays do not.
        assert_eq!(config.validate().len(), 0);
        config.resilience.retry.initial_delay_ms = 2_000;
        config.resilience.retry.max_delay_ms = 2_000;
        assert_eq!(config.validate().len(), 1);
    }
}
