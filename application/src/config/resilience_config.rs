//! Resilience configuration surface.
//!
//! One set of layer configs shared by every guarded call. Tool calls and
//! council calls build their own [`CompositeResiliencePolicy`] from it, each
//! with a breaker named after the dependency.
//!
//! [`CompositeResiliencePolicy`]: crate::resilience::CompositeResiliencePolicy

use crate::resilience::{BulkheadConfig, CircuitBreakerConfig, RetryConfig, TimeoutConfig};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ResilienceConfig {
    pub breaker: CircuitBreakerConfig,
    pub retry: RetryConfig,
    pub timeout: TimeoutConfig,
    pub bulkhead: BulkheadConfig,
}

impl ResilienceConfig {
    pub fn with_breaker(mut self, breaker: CircuitBreakerConfig) -> Self {
        self.breaker = breaker;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeout(mut self, timeout: TimeoutConfig) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_bulkhead(mut self, bulkhead: BulkheadConfig) -> Self {
        self.bulkhead = bulkhead;
        self
    }
}
