//! Resilience configuration from TOML (`[resilience.*]` sections)
//!
//! ```toml
//! [resilience.breaker]
//! failure_threshold = 5
//! success_threshold = 2
//! open_timeout_secs = 30
//! half_open_max_calls = 3
//!
//! [resilience.retry]
//! max_attempts = 3
//! initial_delay_ms = 500
//! max_delay_ms = 30000
//! exponential_base = 2.0
//! jitter = true
//! retry_on = ["transient", "timeout"]
//!
//! [resilience.timeout]
//! timeout_secs = 30
//!
//! [resilience.bulkhead]
//! max_concurrent = 10
//! max_queue = 20
//! ```

use super::ConfigIssue;
use overmind_application::ResilienceConfig;
use overmind_application::resilience::{
    BulkheadConfig, CircuitBreakerConfig, FailureClass, RetryConfig, TimeoutConfig,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileResilienceConfig {
    pub breaker: FileBreakerConfig,
    pub retry: FileRetryConfig,
    pub timeout: FileTimeoutConfig,
    pub bulkhead: FileBulkheadConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileBreakerConfig {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub open_timeout_secs: u64,
    pub half_open_max_calls: u32,
}

impl Default for FileBreakerConfig {
    fn default() -> Self {
        let config = CircuitBreakerConfig::default();
        Self {
            failure_threshold: config.failure_threshold,
            success_threshold: config.success_threshold,
            open_timeout_secs: config.timeout.as_secs(),
            half_open_max_calls: config.half_open_max_calls,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileRetryConfig {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub exponential_base: f64,
    pub jitter: bool,
    pub retry_on: Vec<FailureClass>,
}

impl Default for FileRetryConfig {
    fn default() -> Self {
        let config = RetryConfig::default();
        Self {
            max_attempts: config.max_attempts,
            initial_delay_ms: duration_ms(config.initial_delay),
            max_delay_ms: duration_ms(config.max_delay),
            exponential_base: config.exponential_base,
            jitter: config.jitter,
            retry_on: config.retry_on,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileTimeoutConfig {
    pub timeout_secs: u64,
}

impl Default for FileTimeoutConfig {
    fn default() -> Self {
        Self {
            timeout_secs: TimeoutConfig::default().timeout.as_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileBulkheadConfig {
    pub max_concurrent: usize,
    pub max_queue: usize,
}

impl Default for FileBulkheadConfig {
    fn default() -> Self {
        let config = BulkheadConfig::default();
        Self {
            max_concurrent: config.max_concurrent,
            max_queue: config.max_queue,
        }
    }
}

impl FileResilienceConfig {
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        if self.breaker.failure_threshold == 0 {
            issues.push(ConfigIssue::error(
                "resilience.breaker.failure_threshold",
                "must be at least 1",
            ));
        }
        if self.breaker.success_threshold == 0 {
            issues.push(ConfigIssue::error(
                "resilience.breaker.success_threshold",
                "must be at least 1",
            ));
        }
        if self.breaker.half_open_max_calls < self.breaker.success_threshold {
            issues.push(ConfigIssue::warning(
                "resilience.breaker.half_open_max_calls",
                format!(
                    "{} trial calls can never reach success_threshold {}",
                    self.breaker.half_open_max_calls, self.breaker.success_threshold
                ),
            ));
        }

        if self.retry.max_attempts == 0 {
            issues.push(ConfigIssue::error(
                "resilience.retry.max_attempts",
                "must be at least 1 (the first attempt counts)",
            ));
        }
        if self.retry.exponential_base < 1.0 {
            issues.push(ConfigIssue::warning(
                "resilience.retry.exponential_base",
                format!(
                    "{} shrinks delays between attempts",
                    self.retry.exponential_base
                ),
            ));
        }
        if self.retry.initial_delay_ms > self.retry.max_delay_ms {
            issues.push(ConfigIssue::warning(
                "resilience.retry.initial_delay_ms",
                "exceeds max_delay_ms; every delay is capped",
            ));
        }

        if self.timeout.timeout_secs == 0 {
            issues.push(ConfigIssue::error(
                "resilience.timeout.timeout_secs",
                "cannot be 0",
            ));
        }

        if self.bulkhead.max_concurrent == 0 {
            issues.push(ConfigIssue::error(
                "resilience.bulkhead.max_concurrent",
                "must be at least 1",
            ));
        }
        if self.bulkhead.max_queue < self.bulkhead.max_concurrent {
            issues.push(ConfigIssue::warning(
                "resilience.bulkhead.max_queue",
                format!(
                    "smaller than max_concurrent ({}); raised to match",
                    self.bulkhead.max_concurrent
                ),
            ));
        }

        issues
    }

    pub fn to_config(&self) -> ResilienceConfig {
        ResilienceConfig::default()
            .with_breaker(CircuitBreakerConfig {
                failure_threshold: self.breaker.failure_threshold,
                success_threshold: self.breaker.success_threshold,
                timeout: Duration::from_secs(self.breaker.open_timeout_secs),
                half_open_max_calls: self.breaker.half_open_max_calls,
            })
            .with_retry(RetryConfig {
                max_attempts: self.retry.max_attempts,
                initial_delay: Duration::from_millis(self.retry.initial_delay_ms),
                max_delay: Duration::from_millis(self.retry.max_delay_ms),
                exponential_base: self.retry.exponential_base,
                jitter: self.retry.jitter,
                retry_on: self.retry.retry_on.clone(),
            })
            .with_timeout(TimeoutConfig {
                timeout: Duration::from_secs(self.timeout.timeout_secs),
            })
            .with_bulkhead(BulkheadConfig {
                max_concurrent: self.bulkhead.max_concurrent,
                max_queue: self.bulkhead.max_queue,
            })
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
