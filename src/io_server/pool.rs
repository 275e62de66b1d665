//! Worker pool (C9).
//!
//! Bounded concurrency via `tokio::sync::Semaphore`. Grounded on
//! `original_source/.../worker_pool.py`'s thread-pool-with-a-max-worker-count
//! shape, translated to Tokio tasks since the Rust server is single-process,
//! async, not thread-per-request.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

/// Caps the number of concurrently-running request handlers at
/// `server.max_worker` (default 1000, `SPEC_FULL.md` §6).
pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
}

impl WorkerPool {
    pub fn new(max_worker: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_worker.max(1))),
        }
    }

    /// Current number of free permits, exposed for health/diagnostics.
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Acquire a permit and spawn `task` on the Tokio runtime. The permit is
    /// held until `task` completes, then dropped, freeing a worker slot. A
    /// saturated pool makes new `spawn` calls wait for a permit rather than
    /// rejecting work outright (`SPEC_FULL.md` §4.9).
    pub fn spawn<F>(&self, task: F) -> JoinHandle<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let semaphore = Arc::clone(&self.semaphore);
        tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore never closed");
            task.await;
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn respects_max_worker_bound() {
        let pool = WorkerPool::new(2);
        let concurrent = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..6 {
            let concurrent = Arc::clone(&concurrent);
            let max_seen = Arc::clone(&max_seen);
            handles.push(pool.spawn(async move {
                let now = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(30)).await;
                concurrent.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        assert!(max_seen.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn available_permits_recovers_after_completion() {
        let pool = WorkerPool::new(3);
        assert_eq!(pool.available_permits(), 3);
        pool.spawn(async {}).await.unwrap();
        tokio::task::yield_now().await;
        assert_eq!(pool.available_permits(), 3);
    }
}
