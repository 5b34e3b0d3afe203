//! Retry with capped exponential backoff.

use super::error::{Classify, FailureClass};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub exponential_base: f64,
    /// Scale each delay by a random factor in [0.5, 1.5]
    pub jitter: bool,
    /// Failure classes that consume a retry; anything else propagates at once
    pub retry_on: Vec<FailureClass>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            exponential_base: 2.0,
            jitter: true,
            retry_on: vec![FailureClass::Transient, FailureClass::Timeout],
        }
    }
}

impl RetryConfig {
    /// Un-jittered delay before attempt `attempt + 1` (1-based `attempt`):
    /// `min(initial_delay × base^(attempt-1), max_delay)`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        #[allow(clippy::cast_possible_wrap)]
        let exponent = attempt.saturating_sub(1) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.exponential_base.powi(exponent);
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(secs.max(0.0))
    }

    pub fn retries(&self, class: FailureClass) -> bool {
        self.retry_on.contains(&class)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Runs `work` until it succeeds, fails with a class outside `retry_on`,
    /// or `max_attempts` is exhausted. The last failure is returned as is.
    pub async fn execute<T, E, F, Fut>(&self, name: &str, work: F) -> Result<T, E>
    where
        E: Classify + std::fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.execute_gated(name, || true, work).await
    }

    /// Like [`execute`](Self::execute), but `proceed` is consulted before
    /// every inter-attempt delay; when it returns `false` the last failure is
    /// returned immediately instead of sleeping.
    pub async fn execute_gated<T, E, G, F, Fut>(
        &self,
        name: &str,
        proceed: G,
        mut work: F,
    ) -> Result<T, E>
    where
        E: Classify + std::fmt::Display,
        G: Fn() -> bool,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let error = match work().await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            let class = error.failure_class();
            if !self.config.retries(class) {
                debug!("'{}' failed with non-retryable {:?}: {}", name, class, error);
                return Err(error);
            }
            if attempt >= max_attempts {
                warn!(
                    "'{}' failed after {} attempts: {}",
                    name, max_attempts, error
                );
                return Err(error);
            }
            if !proceed() {
                debug!("'{}' retry suppressed by gate: {}", name, error);
                return Err(error);
            }

            let delay = self.jittered(self.config.delay_for_attempt(attempt));
            debug!(
                "'{}' attempt {}/{} failed ({}), retrying in {:?}",
                name, attempt, max_attempts, error, delay
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if !self.config.jitter || delay.is_zero() {
            return delay;
        }
        let factor = rand::thread_rng().gen_range(0.5..=1.5);
        delay.mul_f64(factor)
    }
}
