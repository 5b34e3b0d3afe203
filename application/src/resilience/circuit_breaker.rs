//! Per-dependency circuit breaker.
//!
//! ```text
//!          failure_threshold consecutive failures
//!   CLOSED ───────────────────────────────────────▶ OPEN
//!     ▲                                              │ timeout since last failure,
//!     │ success_threshold consecutive successes      │ next allow_request()
//!     │                                              ▼
//!     └──────────────────────────────────────── HALF_OPEN ──any failure──▶ OPEN
//! ```
//!
//! The breaker is a synchronous gate: it never suspends and performs no I/O.
//! Counters live behind a `std::sync::Mutex` held only for the update.

use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Breaker thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures in CLOSED that open the circuit
    pub failure_threshold: u32,
    /// Consecutive successes in HALF_OPEN that close the circuit
    pub success_threshold: u32,
    /// How long the circuit stays OPEN after the last failure
    pub timeout: Duration,
    /// Trial calls admitted while HALF_OPEN
    pub half_open_max_calls: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            timeout: Duration::from_secs(30),
            half_open_max_calls: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "CLOSED",
            CircuitState::Open => "OPEN",
            CircuitState::HalfOpen => "HALF_OPEN",
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Point-in-time view of a breaker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerStats {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    pub half_open_call_count: u32,
    pub total_calls: u64,
    pub rejected_calls: u64,
    /// Time since the last recorded failure
    pub since_last_failure: Option<Duration>,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    last_failure_time: Option<Instant>,
    half_open_call_count: u32,
    total_calls: u64,
    rejected_calls: u64,
}

impl BreakerState {
    fn closed() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            last_failure_time: None,
            half_open_call_count: 0,
            total_calls: 0,
            rejected_calls: 0,
        }
    }
}

/// Failure isolator for one named dependency.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerState::closed()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Whether a call may proceed right now.
    pub fn allow_request(&self) -> bool {
        self.allow_request_at(Instant::now())
    }

    pub fn record_success(&self) {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => inner.failure_count = 0,
            CircuitState::HalfOpen => {
                inner.success_count += 1;
                if inner.success_count >= self.config.success_threshold {
                    info!("Circuit '{}' closed after successful trial calls", self.name);
                    let (total, rejected) = (inner.total_calls, inner.rejected_calls);
                    *inner = BreakerState::closed();
                    inner.total_calls = total;
                    inner.rejected_calls = rejected;
                }
            }
            // A late result from a call admitted before the circuit opened.
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        self.record_failure_at(Instant::now());
    }

    /// Current state without triggering the OPEN → HALF_OPEN check.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn is_open(&self) -> bool {
        self.state() == CircuitState::Open
    }

    pub fn get_stats(&self) -> CircuitBreakerStats {
        let inner = self.lock();
        CircuitBreakerStats {
            name: self.name.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            success_count: inner.success_count,
            half_open_call_count: inner.half_open_call_count,
            total_calls: inner.total_calls,
            rejected_calls: inner.rejected_calls,
            since_last_failure: inner.last_failure_time.map(|t| t.elapsed()),
        }
    }

    /// Administrative reset back to CLOSED with all counters cleared.
    pub fn reset(&self) {
        info!("Circuit '{}' reset", self.name);
        *self.lock() = BreakerState::closed();
    }

    pub(crate) fn allow_request_at(&self, now: Instant) -> bool {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.total_calls += 1;
                true
            }
            CircuitState::Open => {
                let cooled_down = inner
                    .last_failure_time
                    .is_none_or(|t| now.saturating_duration_since(t) >= self.config.timeout);
                if cooled_down {
                    info!("Circuit '{}' half-open, admitting a trial call", self.name);
                    inner.state = CircuitState::HalfOpen;
                    inner.success_count = 0;
                    inner.half_open_call_count = 1;
                    inner.total_calls += 1;
                    true
                } else {
                    inner.rejected_calls += 1;
                    false
                }
            }
            CircuitState::HalfOpen => {
                if inner.half_open_call_count < self.config.half_open_max_calls {
                    inner.half_open_call_count += 1;
                    inner.total_calls += 1;
                    true
                } else {
                    inner.rejected_calls += 1;
                    false
                }
            }
        }
    }

    pub(crate) fn record_failure_at(&self, now: Instant) {
        let mut inner = self.lock();
        inner.last_failure_time = Some(now);
        match inner.state {
            CircuitState::Closed => {
                inner.failure_count += 1;
                if inner.failure_count >= self.config.failure_threshold {
                    warn!(
                        "Circuit '{}' opened after {} consecutive failures",
                        self.name, inner.failure_count
                    );
                    inner.state = CircuitState::Open;
                }
            }
            CircuitState::HalfOpen => {
                warn!("Circuit '{}' re-opened by a failed trial call", self.name);
                inner.state = CircuitState::Open;
                inner.failure_count += 1;
                inner.success_count = 0;
                inner.half_open_call_count = 0;
            }
            CircuitState::Open => inner.failure_count += 1,
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(failure_threshold: u32, success_threshold: u32) -> CircuitBreaker {
        CircuitBreaker::new(
            "test",
            CircuitBreakerConfig {
                failure_threshold,
                success_threshold,
                timeout: Duration::from_secs(10),
                half_open_max_calls: 3,
            },
        )
    }

    #[test]
    fn test_opens_exactly_on_nth_failure() {
        let cb = breaker(3, 1);
        let now = Instant::now();

        for _ in 0..2 {
            assert!(cb.allow_request_at(now));
            cb.record_failure_at(now);
            assert_eq!(cb.state(), CircuitState::Closed);
        }
        assert!(cb.allow_request_at(now));
        cb.record_failure_at(now);
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.allow_request_at(now));
        assert_eq!(cb.get_stats().rejected_calls, 1);
    }

    #[test]
    fn test_success_resets_consecutive_failures() {
        let cb = breaker(2, 1);
        let now = Instant::now();

        cb.record_failure_at(now);
        cb.record_success();
        cb.record_failure_at(now);
        assert_eq!(cb.state(), CircuitState::Closed);
        cb.record_failure_at(now);
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn test_half_open_after_timeout_then_closes() {
        let cb = breaker(1, 2);
        let start = Instant::now();
        cb.record_failure_at(start);
        assert!(!cb.allow_request_at(start + Duration::from_secs(9)));

        assert!(cb.allow_request_at(start + Duration::from_secs(10)));
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        cb.record_success();
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);

        let stats = cb.get_stats();
        assert_eq!(stats.failure_count, 0);
        assert_eq!(stats.success_count, 0);
        assert_eq!(stats.half_open_call_count, 0);
    }

    #[test]
    fn test_half_open_failure_reopens() {
        let cb = breaker(1, 2);
        let start = Instant::now();
        cb.record_failure_at(start);

        let trial_at = start + Duration::from_secs(11);
        assert!(cb.allow_request_at(trial_at));
        cb.record_failure_at(trial_at);
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.allow_request_at(trial_at + Duration::from_secs(1)));
    }

    #[test]
    fn test_half_open_call_limit() {
        let cb = breaker(1, 5);
        let start = Instant::now();
        cb.record_failure_at(start);

        let later = start + Duration::from_secs(10);
        assert!(cb.allow_request_at(later));
        assert!(cb.allow_request_at(later));
        assert!(cb.allow_request_at(later));
        assert!(!cb.allow_request_at(later));
    }

    #[test]
    fn test_reset() {
        let cb = breaker(1, 1);
        cb.record_failure();
        assert!(cb.is_open());
        cb.reset();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.allow_request());
    }
}
