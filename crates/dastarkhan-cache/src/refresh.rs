//! Bounded scheduler for refresh-ahead tasks.
//!
//! Refreshes run detached from the request that triggered them. The
//! scheduler caps how many run at once, releases the refresh lock after the
//! task ends (including when it panics) and exposes [`RefreshScheduler::wait_idle`]
//! so tests and shutdown can wait for in-flight work.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{Semaphore, watch};
use tracing::{debug, error};

use crate::lock::RefreshLock;
use crate::stats::{RefreshOutcome, record_refresh};

/// Decrements the in-flight counter when the task wrapper ends.
struct InFlight(Arc<watch::Sender<usize>>);

impl InFlight {
    fn enter(counter: &Arc<watch::Sender<usize>>) -> Self {
        counter.send_modify(|n| *n += 1);
        Self(Arc::clone(counter))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.send_modify(|n| *n = n.saturating_sub(1));
    }
}

#[derive(Clone)]
pub struct RefreshScheduler {
    permits: Arc<Semaphore>,
    in_flight: Arc<watch::Sender<usize>>,
}

impl RefreshScheduler {
    pub fn new(max_concurrent: usize) -> Self {
        let (in_flight, _) = watch::channel(0);
        Self {
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            in_flight: Arc::new(in_flight),
        }
    }

    /// Number of refreshes currently running.
    pub fn in_flight(&self) -> usize {
        *self.in_flight.borrow()
    }

    /// Runs `task` in the background while holding `lock`.
    ///
    /// Returns `false` (and releases the lock right away) when every worker
    /// permit is taken; the refresh is skipped, not queued.
    pub async fn spawn<F>(&self, cache: &'static str, lock: RefreshLock, task: F) -> bool
    where
        F: Future<Output = RefreshOutcome> + Send + 'static,
    {
        let permit = match Arc::clone(&self.permits).try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                debug!(cache, key = %lock.key(), "refresh pool saturated, skipping");
                record_refresh(cache, RefreshOutcome::Skipped);
                lock.release().await;
                return false;
            }
        };
        let guard = InFlight::enter(&self.in_flight);

        tokio::spawn(async move {
            let _permit = permit;
            let _guard = guard;
            let key = lock.key().to_string();

            // Nested task so a panic surfaces as a JoinError here
            let outcome = match tokio::spawn(task).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(cache, key = %key, error = %e, "refresh task panicked");
                    RefreshOutcome::Panicked
                }
            };
            record_refresh(cache, outcome);
            lock.release().await;
        });
        true
    }

    /// Waits until no refresh is running.
    pub async fn wait_idle(&self) {
        let mut rx = self.in_flight.subscribe();
        // The sender lives as long as self, so this cannot fail
        let _ = rx.wait_for(|n| *n == 0).await;
    }
}

impl std::fmt::Debug for RefreshScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshScheduler")
            .field("available_permits", &self.permits.available_permits())
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::{KeyValueStore, MemoryStore};
    use std::time::Duration;

    async fn lock(kv: &Arc<MemoryStore>, id: &str) -> RefreshLock {
        RefreshLock::acquire(kv.clone(), "menu:detail", id, Duration::from_secs(30))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_lock_released_after_task() {
        let kv = Arc::new(MemoryStore::new());
        let scheduler = RefreshScheduler::new(2);

        let started = scheduler
            .spawn("menu:detail", lock(&kv, "osh").await, async {
                RefreshOutcome::Refreshed
            })
            .await;
        assert!(started);

        scheduler.wait_idle().await;
        assert_eq!(scheduler.in_flight(), 0);
        assert!(kv.peek("menu:detail:refreshing:osh").is_none());
    }

    #[tokio::test]
    async fn test_panicking_task_still_releases_lock() {
        let kv = Arc::new(MemoryStore::new());
        let scheduler = RefreshScheduler::new(1);

        scheduler
            .spawn("menu:detail", lock(&kv, "osh").await, async {
                let explode = true;
                if explode {
                    panic!("store exploded");
                }
                RefreshOutcome::Refreshed
            })
            .await;

        scheduler.wait_idle().await;
        assert!(kv.peek("menu:detail:refreshing:osh").is_none());
        assert_eq!(
            kv.ttl("menu:detail:refreshing:osh").await.unwrap(),
            crate::kv::KeyTtl::Missing
        );
    }

    #[tokio::test]
    async fn test_saturated_pool_skips_and_releases() {
        let kv = Arc::new(MemoryStore::new());
        let scheduler = RefreshScheduler::new(1);
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        assert!(
            scheduler
                .spawn("menu:detail", lock(&kv, "osh").await, async move {
                    let _ = rx.await;
                    RefreshOutcome::Refreshed
                })
                .await
        );
        assert!(
            !scheduler
                .spawn("menu:detail", lock(&kv, "somsa").await, async {
                    RefreshOutcome::Refreshed
                })
                .await
        );
        assert!(kv.peek("menu:detail:refreshing:somsa").is_none());
        assert!(kv.peek("menu:detail:refreshing:osh").is_some());

        tx.send(()).unwrap();
        scheduler.wait_idle().await;
        assert!(kv.peek("menu:detail:refreshing:osh").is_none());
    }
}
