//! Named breaker cache.
//!
//! One registry is constructed at startup and handed to every component that
//! guards a dependency, so "one breaker per dependency name" holds without a
//! global static.

use super::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

#[derive(Debug, Default)]
pub struct CircuitBreakerRegistry {
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
}

impl CircuitBreakerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the breaker registered under `name`, creating it with `config`
    /// on first use. Concurrent first calls all receive the same instance.
    pub fn get_or_create(&self, name: &str, config: &CircuitBreakerConfig) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.get(name) {
            return existing;
        }

        let mut breakers = self.breakers.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(breakers.entry(name.to_string()).or_insert_with(|| {
            debug!("Creating circuit breaker '{}'", name);
            Arc::new(CircuitBreaker::new(name, config.clone()))
        }))
    }

    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Resets one breaker. Returns `false` if no breaker has that name.
    pub fn reset(&self, name: &str) -> bool {
        match self.get(name) {
            Some(breaker) => {
                breaker.reset();
                true
            }
            None => false,
        }
    }

    pub fn reset_all(&self) {
        for breaker in self.snapshot() {
            breaker.reset();
        }
    }

    /// Stats for every breaker, sorted by name.
    pub fn all_stats(&self) -> Vec<CircuitBreakerStats> {
        let mut stats: Vec<_> = self.snapshot().iter().map(|b| b.get_stats()).collect();
        stats.sort_by(|a, b| a.name.cmp(&b.name));
        stats
    }

    pub fn len(&self) -> usize {
        self.breakers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot(&self) -> Vec<Arc<CircuitBreaker>> {
        self.breakers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::circuit_breaker::CircuitState;

    #[test]
    fn test_same_name_same_instance() {
        let registry = CircuitBreakerRegistry::new();
        let config = CircuitBreakerConfig::default();
        let a = registry.get_or_create("tool:echo", &config);
        let b = registry.get_or_create("tool:echo", &config);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_first_config_wins() {
        let registry = CircuitBreakerRegistry::new();
        let first = CircuitBreakerConfig {
            failure_threshold: 1,
            ..Default::default()
        };
        registry.get_or_create("db", &first);
        let again = registry.get_or_create("db", &CircuitBreakerConfig::default());
        assert_eq!(again.config().failure_threshold, 1);
    }

    #[test]
    fn test_concurrent_first_creation_yields_one_instance() {
        let registry = Arc::new(CircuitBreakerRegistry::new());
        let config = CircuitBreakerConfig::default();

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let config = config.clone();
                std::thread::spawn(move || registry.get_or_create("shared", &config))
            })
            .collect();
        let breakers: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(registry.len(), 1);
        assert!(breakers.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[test]
    fn test_breakers_are_isolated_and_resettable() {
        let registry = CircuitBreakerRegistry::new();
        let config = CircuitBreakerConfig {
            failure_threshold: 1,
            ..Default::default()
        };
        let failing = registry.get_or_create("tool:flaky", &config);
        let healthy = registry.get_or_create("tool:echo", &config);

        failing.record_failure();
        assert_eq!(failing.state(), CircuitState::Open);
        assert_eq!(healthy.state(), CircuitState::Closed);

        let names: Vec<_> = registry.all_stats().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["tool:echo", "tool:flaky"]);

        assert!(registry.reset("tool:flaky"));
        assert_eq!(failing.state(), CircuitState::Closed);
        assert!(!registry.reset("missing"));
    }
}
