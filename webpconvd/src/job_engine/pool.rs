// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use serde::Serialize;

use crate::job_engine::dispatcher::Dispatcher;
use crate::job_engine::job::{ErrorKind, JobError, Outcome, Processor};
use crate::job_engine::queue::BoundedQueue;
use crate::job_engine::shutdown::{ShutdownCoordinator, ShutdownError};
use crate::job_engine::worker::{spawn_worker, WorkerContext};

/// Sizing and timeouts of a worker pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Maximum number of queued jobs.
    pub capacity: usize,
    pub workers: usize,
    /// Deadline horizon of a job, and how long the dispatcher waits for its outcome.
    pub job_timeout: Duration,
    /// How long a submission waits for queue space.
    pub admission_timeout: Duration,
    /// How long a worker tries to hand over an outcome.
    pub delivery_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            workers: 5,
            job_timeout: Duration::from_secs(30),
            admission_timeout: Duration::from_millis(100),
            delivery_timeout: Duration::from_secs(1),
        }
    }
}

/// Counters shared by the dispatcher and all workers.
#[derive(Debug, Default)]
pub struct PoolStats {
    pub(crate) submitted: AtomicU64,
    pub(crate) rejected: AtomicU64,
    pub(crate) expired: AtomicU64,
    pub(crate) succeeded: AtomicU64,
    pub(crate) failed: AtomicU64,
    pub(crate) delivered: AtomicU64,
    pub(crate) abandoned: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub submitted: u64,
    pub rejected: u64,
    pub expired: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub delivered: u64,
    pub abandoned: u64,
    pub queued: usize,
}

impl PoolStats {
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, queued: usize) -> StatsSnapshot {
        StatsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            abandoned: self.abandoned.load(Ordering::Relaxed),
            queued,
        }
    }
}

/// The queue, its workers and the shutdown coordination, constructed once at startup.
///
/// Requests reach the pool through [`Dispatcher`] handles obtained from
/// [`WorkerPool::dispatcher`]. Dropping the pool without calling
/// [`shutdown`](WorkerPool::shutdown) still stops the workers, but does not wait for them.
#[derive(Debug)]
pub struct WorkerPool {
    config: PoolConfig,
    queue: BoundedQueue,
    coordinator: ShutdownCoordinator,
    stats: Arc<PoolStats>,
    next_id: Arc<AtomicU64>,
}

impl WorkerPool {
    /// Starts `config.workers` worker threads that all run `processor`.
    pub fn start(config: PoolConfig, processor: Arc<dyn Processor>) -> io::Result<Self> {
        let queue = BoundedQueue::new(config.capacity);
        let mut coordinator = ShutdownCoordinator::new();
        let stats = Arc::new(PoolStats::default());

        info!(
            "Starting worker pool: num_workers={} queue_size={} processor=\"{}\"",
            config.workers,
            config.capacity,
            processor.desc()
        );
        for index in 0..config.workers {
            let ctx = WorkerContext {
                index,
                queue: queue.clone(),
                signal: coordinator.signal(),
                processor: processor.clone(),
                delivery_timeout: config.delivery_timeout,
                stats: stats.clone(),
            };
            let handle = spawn_worker(ctx, coordinator.completion_token())?;
            coordinator.register(handle);
        }

        Ok(Self {
            config,
            queue,
            coordinator,
            stats,
            next_id: Arc::new(AtomicU64::new(1)),
        })
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn queue(&self) -> &BoundedQueue {
        &self.queue
    }

    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(
            self.queue.clone(),
            &self.config,
            self.next_id.clone(),
            self.stats.clone(),
        )
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot(self.queue.len())
    }

    /// Graceful drain: stop admission, raise the signal, wait for the workers, and fail every
    /// job that was still queued with [`ErrorKind::ShuttingDown`].
    pub async fn shutdown(mut self, grace: Duration) -> Result<(), ShutdownError> {
        info!("Waiting for workers to finish...");
        self.queue.close();
        self.coordinator.raise();
        let result = self.coordinator.wait(grace).await;

        let leftovers = self.queue.drain();
        if !leftovers.is_empty() {
            warn!("Failing {} queued job(s) on shutdown", leftovers.len());
        }
        for job in leftovers {
            let outcome = Outcome::Failure(JobError::new(
                ErrorKind::ShuttingDown,
                "server is shutting down",
            ));
            // The requester may already be gone, which is fine here.
            let _ = job
                .writer
                .deliver(outcome, self.config.delivery_timeout)
                .await;
        }

        if result.is_ok() {
            info!("Worker pool shutdown complete");
        }
        result
    }
}
