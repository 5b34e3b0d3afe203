//! Failure taxonomy shared by every resilience layer.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Coarse classification of a failure, used by retry to decide whether an
/// error may consume another attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    /// Temporary condition (dependency unavailable, admission rejected)
    Transient,
    /// Deadline exceeded
    Timeout,
    /// Retrying cannot help (bad input, unknown resource, verification veto)
    Permanent,
    /// Short-circuited by a guard (open breaker, cancellation); never retried
    Rejected,
}

/// Errors that know their own [`FailureClass`].
pub trait Classify {
    fn failure_class(&self) -> FailureClass;
}

/// Terminal failure surfaced by a resilience layer.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResilienceError<E> {
    #[error("Circuit '{name}' is open")]
    CircuitOpen { name: String },

    #[error("Bulkhead '{name}' is full ({capacity} callers admitted)")]
    BulkheadFull { name: String, capacity: usize },

    #[error("'{name}' timed out after {}ms", .deadline.as_millis())]
    Timeout { name: String, deadline: Duration },

    #[error("'{name}' was cancelled")]
    Cancelled { name: String },

    #[error("{0}")]
    Inner(E),
}

impl<E> ResilienceError<E> {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ResilienceError::Cancelled { .. })
    }

    /// The wrapped work error, if the failure came from the work itself.
    pub fn inner(&self) -> Option<&E> {
        match self {
            ResilienceError::Inner(e) => Some(e),
            _ => None,
        }
    }
}

impl<E: Classify> Classify for ResilienceError<E> {
    fn failure_class(&self) -> FailureClass {
        match self {
            ResilienceError::CircuitOpen { .. } | ResilienceError::Cancelled { .. } => {
                FailureClass::Rejected
            }
            ResilienceError::BulkheadFull { .. } => FailureClass::Transient,
            ResilienceError::Timeout { .. } => FailureClass::Timeout,
            ResilienceError::Inner(e) => e.failure_class(),
        }
    }
}
