//! Deadline enforcement.

use super::error::ResilienceError;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeoutConfig {
    pub timeout: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TimeoutPolicy {
    config: TimeoutConfig,
}

impl TimeoutPolicy {
    pub fn new(config: TimeoutConfig) -> Self {
        Self { config }
    }

    pub fn deadline(&self) -> Duration {
        self.config.timeout
    }

    /// Races `work` against the deadline. On expiry `work` is dropped, which
    /// cancels it at its current suspension point.
    pub async fn execute<T, E, Fut>(&self, name: &str, work: Fut) -> Result<T, ResilienceError<E>>
    where
        Fut: Future<Output = Result<T, E>>,
    {
        self.guard(name, async { work.await.map_err(ResilienceError::Inner) })
            .await
    }

    /// Same as [`execute`](Self::execute) for work already speaking
    /// [`ResilienceError`].
    pub async fn guard<T, E, Fut>(&self, name: &str, work: Fut) -> Result<T, ResilienceError<E>>
    where
        Fut: Future<Output = Result<T, ResilienceError<E>>>,
    {
        match tokio::time::timeout(self.config.timeout, work).await {
            Ok(result) => result,
            Err(_) => {
                warn!("'{}' exceeded deadline of {:?}", name, self.config.timeout);
                Err(ResilienceError::Timeout {
                    name: name.to_string(),
                    deadline: self.config.timeout,
                })
            }
        }
    }
}
