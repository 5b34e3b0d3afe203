//! Last-resort value producer.

use super::error::ResilienceError;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// What the producer gets to see about the failure it replaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackContext {
    pub name: String,
    pub error: String,
}

type Producer<T> = Arc<dyn Fn(&FallbackContext) -> T + Send + Sync>;

pub struct FallbackPolicy<T> {
    producer: Option<Producer<T>>,
}

impl<T> Clone for FallbackPolicy<T> {
    fn clone(&self) -> Self {
        Self {
            producer: self.producer.clone(),
        }
    }
}

impl<T> fmt::Debug for FallbackPolicy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FallbackPolicy")
            .field("has_producer", &self.producer.is_some())
            .finish()
    }
}

impl<T> Default for FallbackPolicy<T> {
    fn default() -> Self {
        Self { producer: None }
    }
}

impl<T> FallbackPolicy<T> {
    pub fn new(producer: impl Fn(&FallbackContext) -> T + Send + Sync + 'static) -> Self {
        Self {
            producer: Some(Arc::new(producer)),
        }
    }

    /// A fallback that always yields a clone of `value`.
    pub fn value(value: T) -> Self
    where
        T: Clone + Send + Sync + 'static,
    {
        Self::new(move |_| value.clone())
    }

    pub fn has_producer(&self) -> bool {
        self.producer.is_some()
    }

    /// Replaces any failure except cancellation with the producer's value.
    /// Without a producer the failure is re-raised unchanged.
    pub fn recover<E: fmt::Display>(
        &self,
        name: &str,
        result: Result<T, ResilienceError<E>>,
    ) -> Result<T, ResilienceError<E>> {
        let error = match result {
            Ok(value) => return Ok(value),
            Err(error) if error.is_cancelled() => return Err(error),
            Err(error) => error,
        };
        let Some(producer) = &self.producer else {
            return Err(error);
        };

        warn!("'{}' falling back after: {}", name, error);
        let context = FallbackContext {
            name: name.to_string(),
            error: error.to_string(),
        };
        Ok(producer(&context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_producer_sees_failure() {
        let policy = FallbackPolicy::new(|ctx: &FallbackContext| format!("{} -> {}", ctx.name, ctx.error));
        let result = policy.recover("council:planner", Err(ResilienceError::Inner("offline")));
        assert_eq!(result.unwrap(), "council:planner -> offline");
    }

    #[test]
    fn test_without_producer_reraises() {
        let policy = FallbackPolicy::<u32>::default();
        let result = policy.recover("x", Err(ResilienceError::Inner("offline")));
        assert_eq!(result, Err(ResilienceError::Inner("offline")));
    }

    #[test]
    fn test_never_swallows_cancellation() {
        let policy = FallbackPolicy::value(0u32);
        let result: Result<u32, ResilienceError<&str>> = policy.recover(
            "x",
            Err(ResilienceError::Cancelled {
                name: "x".to_string(),
            }),
        );
        assert!(result.unwrap_err().is_cancelled());
    }
}
