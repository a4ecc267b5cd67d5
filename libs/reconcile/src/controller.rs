//! Worker pool driving a reconciler from a work queue.

use std::fmt::Display;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::{Action, WorkQueue, DEFAULT_RECONCILE_TIMEOUT, DEFAULT_WORKERS};

/// Converges one object identified by a key.
///
/// Implementations must be idempotent: the same key may be reconciled any
/// number of times, and a reconcile may be cancelled at any await point.
#[async_trait]
pub trait Reconciler: Send + Sync + 'static {
    type Key: Clone + Eq + Hash + Send + Sync + Display + 'static;
    type Error: Display + Send + 'static;

    async fn reconcile(&self, key: &Self::Key) -> Result<Action, Self::Error>;
}

/// Worker pool configuration.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Number of concurrent workers.
    pub workers: usize,

    /// Upper bound for a single reconcile; exceeding it counts as a failure.
    pub reconcile_timeout: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            reconcile_timeout: DEFAULT_RECONCILE_TIMEOUT,
        }
    }
}

/// Counters for reconcile outcomes.
#[derive(Debug, Default)]
pub struct ControllerStats {
    pub reconciled: AtomicU64,
    pub requeued: AtomicU64,
    pub failed: AtomicU64,
    pub timed_out: AtomicU64,
}

impl ControllerStats {
    /// Snapshot as (reconciled, requeued, failed, timed_out).
    pub fn snapshot(&self) -> (u64, u64, u64, u64) {
        (
            self.reconciled.load(Ordering::Relaxed),
            self.requeued.load(Ordering::Relaxed),
            self.failed.load(Ordering::Relaxed),
            self.timed_out.load(Ordering::Relaxed),
        )
    }
}

/// Runs a reconciler over the keys of a work queue.
pub struct Controller<R: Reconciler> {
    reconciler: Arc<R>,
    queue: Arc<WorkQueue<R::Key>>,
    config: ControllerConfig,
    stats: Arc<ControllerStats>,
}

impl<R: Reconciler> Controller<R> {
    pub fn new(reconciler: Arc<R>, queue: Arc<WorkQueue<R::Key>>, config: ControllerConfig) -> Self {
        Self {
            reconciler,
            queue,
            config,
            stats: Arc::new(ControllerStats::default()),
        }
    }

    pub fn queue(&self) -> &Arc<WorkQueue<R::Key>> {
        &self.queue
    }

    pub fn stats(&self) -> Arc<ControllerStats> {
        Arc::clone(&self.stats)
    }

    /// Run the workers until shutdown is signalled.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let workers = self.config.workers.max(1);
        info!(
            workers,
            reconcile_timeout_secs = self.config.reconcile_timeout.as_secs(),
            "Starting controller"
        );

        let mut handles = Vec::with_capacity(workers);
        for worker_id in 0..workers {
            let reconciler = Arc::clone(&self.reconciler);
            let queue = Arc::clone(&self.queue);
            let stats = Arc::clone(&self.stats);
            let timeout = self.config.reconcile_timeout;
            handles.push(tokio::spawn(async move {
                run_worker(worker_id, reconciler, queue, stats, timeout).await;
            }));
        }

        loop {
            if *shutdown.borrow() {
                break;
            }
            if shutdown.changed().await.is_err() {
                break;
            }
        }

        info!("Controller shutting down");
        self.queue.shut_down().await;
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Worker task panicked");
            }
        }
    }
}

async fn run_worker<R: Reconciler>(
    worker_id: usize,
    reconciler: Arc<R>,
    queue: Arc<WorkQueue<R::Key>>,
    stats: Arc<ControllerStats>,
    timeout: Duration,
) {
    debug!(worker_id, "Worker started");

    while let Some(key) = queue.get().await {
        match tokio::time::timeout(timeout, reconciler.reconcile(&key)).await {
            Ok(Ok(action)) => {
                stats.reconciled.fetch_add(1, Ordering::Relaxed);
                match action {
                    Action::Done => queue.forget(&key).await,
                    Action::Requeue => {
                        stats.requeued.fetch_add(1, Ordering::Relaxed);
                        queue.add_rate_limited(key.clone()).await;
                    }
                    Action::RequeueAfter(delay) => {
                        stats.requeued.fetch_add(1, Ordering::Relaxed);
                        queue.forget(&key).await;
                        queue.add_after(key.clone(), delay);
                    }
                }
            }
            Ok(Err(e)) => {
                stats.failed.fetch_add(1, Ordering::Relaxed);
                warn!(key = %key, error = %e, "Reconcile failed");
                queue.add_rate_limited(key.clone()).await;
            }
            Err(_) => {
                stats.timed_out.fetch_add(1, Ordering::Relaxed);
                warn!(key = %key, timeout_secs = timeout.as_secs(), "Reconcile timed out");
                queue.add_rate_limited(key.clone()).await;
            }
        }
        queue.done(&key).await;
    }

    debug!(worker_id, "Worker stopped");
}
