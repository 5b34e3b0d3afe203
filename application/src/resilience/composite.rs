//! Ordered resilience pipeline around one unit of work.
//!
//! Layers, innermost first: retry, circuit breaker, timeout, bulkhead,
//! cancellation, fallback. The breaker is consulted before every attempt and
//! observes every attempt's outcome, including attempts the timeout or
//! cancellation layer cut short; retry checks it again before sleeping so
//! an opened circuit stops the retry loop without waiting out a delay.
//! Layers that were not configured are transparent.

use super::bulkhead::{BulkheadExecutor, BulkheadStats};
use super::circuit_breaker::{CircuitBreaker, CircuitBreakerStats};
use super::error::{Classify, ResilienceError};
use super::fallback::FallbackPolicy;
use super::retry::RetryPolicy;
use super::timeout::TimeoutPolicy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResilienceStats {
    pub name: String,
    pub circuit_breaker: Option<CircuitBreakerStats>,
    pub bulkhead: Option<BulkheadStats>,
}

pub struct CompositeResiliencePolicy<T> {
    name: String,
    retry: Option<RetryPolicy>,
    breaker: Option<Arc<CircuitBreaker>>,
    timeout: Option<TimeoutPolicy>,
    bulkhead: Option<Arc<BulkheadExecutor>>,
    fallback: Option<FallbackPolicy<T>>,
    cancellation: Option<CancellationToken>,
}

impl<T> Clone for CompositeResiliencePolicy<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            retry: self.retry.clone(),
            breaker: self.breaker.clone(),
            timeout: self.timeout.clone(),
            bulkhead: self.bulkhead.clone(),
            fallback: self.fallback.clone(),
            cancellation: self.cancellation.clone(),
        }
    }
}

impl<T> fmt::Debug for CompositeResiliencePolicy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeResiliencePolicy")
            .field("name", &self.name)
            .field("retry", &self.retry.is_some())
            .field("breaker", &self.breaker.as_ref().map(|b| b.name()))
            .field("timeout", &self.timeout.as_ref().map(|t| t.deadline()))
            .field("bulkhead", &self.bulkhead.as_ref().map(|b| b.name()))
            .field("fallback", &self.fallback.is_some())
            .finish()
    }
}

impl<T> CompositeResiliencePolicy<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            retry: None,
            breaker: None,
            timeout: None,
            bulkhead: None,
            fallback: None,
            cancellation: None,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn with_circuit_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = Some(breaker);
        self
    }

    pub fn with_timeout(mut self, timeout: TimeoutPolicy) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_bulkhead(mut self, bulkhead: Arc<BulkheadExecutor>) -> Self {
        self.bulkhead = Some(bulkhead);
        self
    }

    pub fn with_fallback(mut self, fallback: FallbackPolicy<T>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stats(&self) -> ResilienceStats {
        ResilienceStats {
            name: self.name.clone(),
            circuit_breaker: self.breaker.as_ref().map(|b| b.get_stats()),
            bulkhead: self.bulkhead.as_ref().map(|b| b.stats()),
        }
    }

    /// Runs `work` through every configured layer. `work` is called once per
    /// attempt.
    pub async fn execute<E, F, Fut>(&self, mut work: F) -> Result<T, ResilienceError<E>>
    where
        E: Classify + fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let name = self.name.as_str();
        let breaker = self.breaker.as_deref();

        let mut attempt = || {
            let (admitted, permit) = match breaker {
                Some(b) => {
                    let permit = BreakerPermit::acquire(b);
                    (permit.is_some(), permit)
                }
                None => (true, None),
            };
            let call = if admitted { Some(work()) } else { None };
            async move {
                let Some(call) = call else {
                    debug!("'{}' short-circuited by open breaker", name);
                    return Err(ResilienceError::CircuitOpen {
                        name: name.to_string(),
                    });
                };
                let result = call.await;
                if let Some(permit) = permit {
                    permit.settle(result.is_ok());
                }
                result.map_err(ResilienceError::Inner)
            }
        };

        let retried = async {
            match &self.retry {
                Some(retry) => {
                    let gate = || breaker.is_none_or(|b| !b.is_open());
                    retry.execute_gated(name, gate, &mut attempt).await
                }
                None => attempt().await,
            }
        };

        let timed = async {
            match &self.timeout {
                Some(timeout) => timeout.guard(name, retried).await,
                None => retried.await,
            }
        };

        let bounded = async {
            match &self.bulkhead {
                Some(bulkhead) => bulkhead.guard(timed).await,
                None => timed.await,
            }
        };

        let result = match &self.cancellation {
            Some(token) => {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => Err(ResilienceError::Cancelled {
                        name: name.to_string(),
                    }),
                    result = bounded => result,
                }
            }
            None => bounded.await,
        };

        match &self.fallback {
            Some(fallback) => fallback.recover(name, result),
            None => result,
        }
    }
}

/// A call the breaker admitted. Dropping it unsettled, as the timeout and
/// cancellation layers do with an attempt still in flight, records a failure
/// so the breaker never loses track of a HALF_OPEN trial call.
struct BreakerPermit<'a> {
    breaker: &'a CircuitBreaker,
    settled: bool,
}

impl<'a> BreakerPermit<'a> {
    fn acquire(breaker: &'a CircuitBreaker) -> Option<Self> {
        breaker.allow_request().then_some(Self {
            breaker,
            settled: false,
        })
    }

    fn settle(mut self, ok: bool) {
        self.settled = true;
        if ok {
            self.breaker.record_success();
        } else {
            self.breaker.record_failure();
        }
    }
}

impl Drop for BreakerPermit<'_> {
    fn drop(&mut self) {
        if !self.settled {
            debug!("'{}' call abandoned before completing", self.breaker.name());
            self.breaker.record_failure();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::{
        CircuitBreakerConfig, CircuitState, FailureClass, RetryConfig, TimeoutConfig,
    };
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[derive(Debug)]
    struct Unavailable;

    impl fmt::Display for Unavailable {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "unavailable")
        }
    }

    impl Classify for Unavailable {
        fn failure_class(&self) -> FailureClass {
            FailureClass::Transient
        }
    }

    fn fast_retry(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(RetryConfig {
            max_attempts,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            jitter: false,
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_retry_exhausted_then_fallback() {
        let policy = CompositeResiliencePolicy::new("tool:flaky")
            .with_retry(fast_retry(3))
            .with_fallback(FallbackPolicy::value("fallback".to_string()));
        let calls = AtomicU32::new(0);

        let result = policy
            .execute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<String, _>(Unavailable)
            })
            .await;

        assert_eq!(result.unwrap(), "fallback");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_open_breaker_cuts_retries_short() {
        let breaker = Arc::new(CircuitBreaker::new(
            "tool:down",
            CircuitBreakerConfig {
                failure_threshold: 2,
                timeout: Duration::from_secs(60),
                ..Default::default()
            },
        ));
        let policy = CompositeResiliencePolicy::<()>::new("tool:down")
            .with_retry(fast_retry(5))
            .with_circuit_breaker(Arc::clone(&breaker));
        let calls = AtomicU32::new(0);

        let first = policy
            .execute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(Unavailable)
            })
            .await;
        assert!(matches!(first, Err(ResilienceError::Inner(Unavailable))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(breaker.state(), CircuitState::Open);

        let second = policy
            .execute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(Unavailable)
            })
            .await;
        assert!(matches!(second, Err(ResilienceError::CircuitOpen { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(policy.stats().circuit_breaker.unwrap().rejected_calls, 1);
    }

    #[tokio::test]
    async fn test_cancellation_is_not_swallowed_by_fallback() {
        let token = CancellationToken::new();
        let policy = CompositeResiliencePolicy::new("tool:hang")
            .with_fallback(FallbackPolicy::value(0u32))
            .with_cancellation(token.clone());
        token.cancel();

        let result = policy
            .execute(|| async {
                std::future::pending::<()>().await;
                Ok::<u32, Unavailable>(1)
            })
            .await;

        assert!(result.unwrap_err().is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_wraps_whole_attempt_chain() {
        let policy = CompositeResiliencePolicy::<u32>::new("council:planner")
            .with_retry(fast_retry(3))
            .with_timeout(TimeoutPolicy::new(TimeoutConfig {
                timeout: Duration::from_millis(50),
            }));

        let result = policy
            .execute(|| async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok::<u32, Unavailable>(1)
            })
            .await;

        assert!(matches!(result, Err(ResilienceError::Timeout { .. })));
    }

    #[tokio::test]
    async fn test_transparent_without_layers() {
        let policy = CompositeResiliencePolicy::<u32>::new("plain");
        let result = policy.execute(|| async { Ok::<_, Unavailable>(42) }).await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(policy.stats().circuit_breaker, None);
    }

    fn hanging_breaker(failure_threshold: u32) -> Arc<CircuitBreaker> {
        Arc::new(CircuitBreaker::new(
            "tool:hang",
            CircuitBreakerConfig {
                failure_threshold,
                success_threshold: 1,
                timeout: Duration::from_millis(100),
                half_open_max_calls: 3,
            },
        ))
    }

    fn short_timeout() -> TimeoutPolicy {
        TimeoutPolicy::new(TimeoutConfig {
            timeout: Duration::from_millis(50),
        })
    }

    // Real time: the breaker measures its cool-down with `Instant`.
    #[tokio::test]
    async fn test_timed_out_calls_open_the_breaker() {
        let breaker = hanging_breaker(2);
        let policy = CompositeResiliencePolicy::<u32>::new("tool:hang")
            .with_circuit_breaker(Arc::clone(&breaker))
            .with_timeout(short_timeout());
        let calls = AtomicU32::new(0);

        for _ in 0..2 {
            let result = policy
                .execute(|| async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    std::future::pending::<Result<u32, Unavailable>>().await
                })
                .await;
            assert!(matches!(result, Err(ResilienceError::Timeout { .. })));
        }
        assert_eq!(breaker.state(), CircuitState::Open);
        assert_eq!(breaker.get_stats().failure_count, 2);

        let rejected = policy
            .execute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<u32, Unavailable>(1)
            })
            .await;
        assert!(matches!(rejected, Err(ResilienceError::CircuitOpen { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_timed_out_trial_calls_do_not_wedge_half_open() {
        let breaker = hanging_breaker(1);
        let policy = CompositeResiliencePolicy::<u32>::new("tool:hang")
            .with_circuit_breaker(Arc::clone(&breaker))
            .with_timeout(short_timeout());
        let hang = || async { std::future::pending::<Result<u32, Unavailable>>().await };

        assert!(matches!(
            policy.execute(hang).await,
            Err(ResilienceError::Timeout { .. })
        ));
        assert_eq!(breaker.state(), CircuitState::Open);

        // Each cool-down admits one trial call that hangs and times out.
        for _ in 0..3 {
            tokio::time::sleep(Duration::from_millis(150)).await;
            assert!(matches!(
                policy.execute(hang).await,
                Err(ResilienceError::Timeout { .. })
            ));
            let stats = breaker.get_stats();
            assert_eq!(stats.state, CircuitState::Open);
            assert_eq!(stats.half_open_call_count, 0);
        }

        tokio::time::sleep(Duration::from_millis(150)).await;
        let healthy = policy.execute(|| async { Ok::<u32, Unavailable>(7) }).await;
        assert_eq!(healthy.unwrap(), 7);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_cancelled_call_is_recorded_by_breaker() {
        let breaker = hanging_breaker(1);
        let token = CancellationToken::new();
        let policy = CompositeResiliencePolicy::<u32>::new("tool:hang")
            .with_circuit_breaker(Arc::clone(&breaker))
            .with_cancellation(token.clone());

        let canceller = {
            let token = token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                token.cancel();
            })
        };
        let result = policy
            .execute(|| async { std::future::pending::<Result<u32, Unavailable>>().await })
            .await;
        canceller.await.unwrap();

        assert!(result.unwrap_err().is_cancelled());
        assert_eq!(breaker.state(), CircuitState::Open);
    }
}
