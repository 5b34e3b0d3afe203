//! Admission control for one resource.
//!
//! `max_queue` bounds every admitted caller (running plus waiting for a
//! permit); `max_concurrent` bounds how many of them run at once. Admission is
//! decided under a mutex held only for the counter update, and the RAII
//! [`AdmissionGuard`] gives the slot back on every exit path, including the
//! guarded future being dropped mid-flight.

use super::error::ResilienceError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use tokio::sync::Semaphore;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkheadConfig {
    pub max_concurrent: usize,
    pub max_queue: usize,
}

impl Default for BulkheadConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 10,
            max_queue: 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkheadStats {
    pub name: String,
    pub max_concurrent: usize,
    pub max_queue: usize,
    /// Callers currently holding an admission slot
    pub admitted: usize,
    /// Callers currently holding a concurrency permit
    pub running: usize,
    pub total_admitted: u64,
    pub rejected: u64,
}

#[derive(Debug, Default)]
struct Counters {
    admitted: usize,
    total_admitted: u64,
    rejected: u64,
}

#[derive(Debug)]
pub struct BulkheadExecutor {
    name: String,
    config: BulkheadConfig,
    permits: Semaphore,
    counters: Mutex<Counters>,
}

/// Holds one admission slot until dropped.
pub struct AdmissionGuard<'a> {
    counters: &'a Mutex<Counters>,
}

impl Drop for AdmissionGuard<'_> {
    fn drop(&mut self) {
        let mut counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        counters.admitted = counters.admitted.saturating_sub(1);
    }
}

impl BulkheadExecutor {
    pub fn new(name: impl Into<String>, config: BulkheadConfig) -> Self {
        // Zero capacities are reported by config validation; clamp here.
        let max_concurrent = config.max_concurrent.max(1);
        let config = BulkheadConfig {
            max_concurrent,
            max_queue: config.max_queue.max(max_concurrent),
        };
        Self {
            name: name.into(),
            permits: Semaphore::new(max_concurrent),
            config,
            counters: Mutex::new(Counters::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &BulkheadConfig {
        &self.config
    }

    /// Claims an admission slot or fails immediately at capacity.
    pub fn try_admit<E>(&self) -> Result<AdmissionGuard<'_>, ResilienceError<E>> {
        let mut counters = self.lock();
        if counters.admitted >= self.config.max_queue {
            counters.rejected += 1;
            warn!(
                "Bulkhead '{}' rejected caller ({} admitted)",
                self.name, counters.admitted
            );
            return Err(ResilienceError::BulkheadFull {
                name: self.name.clone(),
                capacity: self.config.max_queue,
            });
        }
        counters.admitted += 1;
        counters.total_admitted += 1;
        Ok(AdmissionGuard {
            counters: &self.counters,
        })
    }

    pub async fn execute<T, E, Fut>(&self, work: Fut) -> Result<T, ResilienceError<E>>
    where
        Fut: Future<Output = Result<T, E>>,
    {
        self.guard(async { work.await.map_err(ResilienceError::Inner) })
            .await
    }

    /// Runs work that already speaks [`ResilienceError`] inside the bulkhead.
    pub async fn guard<T, E, Fut>(&self, work: Fut) -> Result<T, ResilienceError<E>>
    where
        Fut: Future<Output = Result<T, ResilienceError<E>>>,
    {
        let _slot = self.try_admit()?;
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| ResilienceError::BulkheadFull {
                name: self.name.clone(),
                capacity: self.config.max_queue,
            })?;
        debug!("Bulkhead '{}' running caller", self.name);
        work.await
    }

    pub fn stats(&self) -> BulkheadStats {
        let counters = self.lock();
        BulkheadStats {
            name: self.name.clone(),
            max_concurrent: self.config.max_concurrent,
            max_queue: self.config.max_queue,
            admitted: counters.admitted,
            running: self.config.max_concurrent - self.permits.available_permits(),
            total_admitted: counters.total_admitted,
            rejected: counters.rejected,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Counters> {
        self.counters.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// One bulkhead per guarded resource, shared by every caller of it.
#[derive(Debug, Default)]
pub struct BulkheadRegistry {
    bulkheads: RwLock<HashMap<String, Arc<BulkheadExecutor>>>,
}

impl BulkheadRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The bulkhead for `name`, created with `config` on first use.
    pub fn get_or_create(&self, name: &str, config: &BulkheadConfig) -> Arc<BulkheadExecutor> {
        if let Some(existing) = self.get(name) {
            return existing;
        }

        let mut bulkheads = self.bulkheads.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            bulkheads
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(BulkheadExecutor::new(name, config.clone()))),
        )
    }

    pub fn get(&self, name: &str) -> Option<Arc<BulkheadExecutor>> {
        self.bulkheads
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn all_stats(&self) -> Vec<BulkheadStats> {
        let mut stats: Vec<BulkheadStats> = self
            .bulkheads
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|b| b.stats())
            .collect();
        stats.sort_by(|a, b| a.name.cmp(&b.name));
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::sync::oneshot;
    use tokio::task::JoinHandle;

    fn spawn_held(
        bulkhead: &Arc<BulkheadExecutor>,
    ) -> (oneshot::Sender<()>, JoinHandle<Result<(), ResilienceError<String>>>) {
        let (tx, rx) = oneshot::channel::<()>();
        let bulkhead = Arc::clone(bulkhead);
        let handle = tokio::spawn(async move {
            bulkhead
                .execute(async move {
                    let _ = rx.await;
                    Ok::<_, String>(())
                })
                .await
        });
        (tx, handle)
    }

    async fn wait_for_admitted(bulkhead: &BulkheadExecutor, expected: usize) {
        for _ in 0..1000 {
            if bulkhead.stats().admitted == expected {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("bulkhead never reached {} admitted callers", expected);
    }

    #[tokio::test]
    async fn test_admits_running_plus_queued_then_rejects() {
        let bulkhead = Arc::new(BulkheadExecutor::new(
            "tool:echo",
            BulkheadConfig {
                max_concurrent: 2,
                max_queue: 3,
            },
        ));

        let held: Vec<_> = (0..3).map(|_| spawn_held(&bulkhead)).collect();
        wait_for_admitted(&bulkhead, 3).await;
        assert_eq!(bulkhead.stats().running, 2);

        let rejected: Result<(), ResilienceError<String>> =
            bulkhead.execute(async { Ok(()) }).await;
        assert!(matches!(
            rejected,
            Err(ResilienceError::BulkheadFull { capacity: 3, .. })
        ));

        let mut held = held.into_iter();
        let (first_tx, first_handle) = held.next().unwrap();
        first_tx.send(()).unwrap();
        first_handle.await.unwrap().unwrap();
        wait_for_admitted(&bulkhead, 2).await;

        let (late_tx, late_handle) = spawn_held(&bulkhead);
        wait_for_admitted(&bulkhead, 3).await;

        for (tx, handle) in held {
            tx.send(()).unwrap();
            handle.await.unwrap().unwrap();
        }
        late_tx.send(()).unwrap();
        late_handle.await.unwrap().unwrap();

        let stats = bulkhead.stats();
        assert_eq!(stats.admitted, 0);
        assert_eq!(stats.total_admitted, 4);
        assert_eq!(stats.rejected, 1);
    }

    #[test]
    fn test_registry_shares_instances() {
        let registry = BulkheadRegistry::new();
        let a = registry.get_or_create("tool:echo", &BulkheadConfig::default());
        let b = registry.get_or_create(
            "tool:echo",
            &BulkheadConfig {
                max_concurrent: 1,
                max_queue: 1,
            },
        );
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(b.config().max_concurrent, 10);
        registry.get_or_create("tool:read_file", &BulkheadConfig::default());
        let names: Vec<String> = registry.all_stats().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["tool:echo", "tool:read_file"]);
    }

    #[tokio::test]
    async fn test_dropped_caller_releases_slot() {
        let bulkhead = Arc::new(BulkheadExecutor::new(
            "tool:slow",
            BulkheadConfig {
                max_concurrent: 1,
                max_queue: 1,
            },
        ));
        let (_tx, handle) = spawn_held(&bulkhead);
        wait_for_admitted(&bulkhead, 1).await;

        handle.abort();
        let _ = handle.await;
        assert_eq!(bulkhead.stats().admitted, 0);

        let ok: Result<u8, ResilienceError<String>> = bulkhead.execute(async { Ok(1) }).await;
        assert_eq!(ok.unwrap(), 1);
    }
}
