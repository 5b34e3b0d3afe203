//! Fault-tolerance primitives shared by tool and council calls.

pub mod bulkhead;
pub mod circuit_breaker;
pub mod composite;
pub mod error;
pub mod fallback;
pub mod registry;
pub mod retry;
pub mod timeout;

pub use bulkhead::{
    AdmissionGuard, BulkheadConfig, BulkheadExecutor, BulkheadRegistry, BulkheadStats,
};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats, CircuitState};
pub use composite::{CompositeResiliencePolicy, ResilienceStats};
pub use error::{Classify, FailureClass, ResilienceError};
pub use fallback::{FallbackContext, FallbackPolicy};
pub use registry::CircuitBreakerRegistry;
pub use retry::{RetryConfig, RetryPolicy};
pub use timeout::{TimeoutConfig, TimeoutPolicy};
