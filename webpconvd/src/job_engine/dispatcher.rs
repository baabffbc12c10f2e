// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{error, info, warn};

use crate::job_engine::job::{
    Converted, ErrorKind, Job, JobError, JobId, Metrics, Outcome, Payload, WaitError,
};
use crate::job_engine::pool::{PoolConfig, PoolStats, StatsSnapshot};
use crate::job_engine::queue::{BoundedQueue, SubmitError};

/// A successfully converted upload, ready to be written to the response.
#[derive(Debug)]
pub struct Completed {
    pub job_id: JobId,
    pub output: Converted,
    pub metrics: Metrics,
}

/// Admission and completion boundary of the pool. Cheap to clone; every request handler
/// gets its own handle.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    queue: BoundedQueue,
    job_timeout: Duration,
    admission_timeout: Duration,
    next_id: Arc<AtomicU64>,
    stats: Arc<PoolStats>,
}

impl Dispatcher {
    pub(crate) fn new(
        queue: BoundedQueue,
        config: &PoolConfig,
        next_id: Arc<AtomicU64>,
        stats: Arc<PoolStats>,
    ) -> Self {
        Self {
            queue,
            job_timeout: config.job_timeout,
            admission_timeout: config.admission_timeout,
            next_id,
            stats,
        }
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot(self.queue.len())
    }

    fn next_job_id(&self) -> JobId {
        JobId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Runs one upload through the pool: submit under the admission timeout, then wait for
    /// the outcome until the job's deadline. Neither wait extends past the deadline. Nothing
    /// is retried here.
    pub async fn handle(&self, payload: Payload) -> Result<Completed, JobError> {
        validate(&payload)?;

        let deadline = Instant::now().checked_add(self.job_timeout).ok_or_else(|| {
            JobError::new(
                ErrorKind::InvalidInput,
                format!("job timeout {:?} is out of range", self.job_timeout),
            )
        })?;

        let id = self.next_job_id();
        let filename = payload.filename.clone();
        let (job, reader) = Job::new(id, payload, deadline);

        let admission = self.admission_timeout.min(self.job_timeout);
        match self.queue.submit(job, admission).await {
            Ok(()) => {
                PoolStats::bump(&self.stats.submitted);
                info!("job_id={id} filename={filename} Job submitted to worker pool");
            }
            Err(SubmitError::QueueFull) => {
                PoolStats::bump(&self.stats.rejected);
                warn!("job_id={id} Job queue full - server busy");
                return Err(JobError::new(
                    ErrorKind::QueueFull,
                    "Server busy, please try again later",
                ));
            }
            Err(SubmitError::Closed) => {
                PoolStats::bump(&self.stats.rejected);
                warn!("job_id={id} Job queue closed - server shutting down");
                return Err(JobError::new(
                    ErrorKind::ShuttingDown,
                    "server is shutting down",
                ));
            }
        }

        // The reader is dropped on every path below, so a late worker sees an abandoned slot.
        match reader
            .wait(deadline.saturating_duration_since(Instant::now()))
            .await
        {
            Ok(Outcome::Success { output, metrics }) => {
                info!(
                    "job_id={id} original_size=\"{:.2} MB ({} bytes)\" converted_size=\"{:.2} MB ({} bytes)\" conversion_time={:?} File conversion completed",
                    metrics.input_mb(),
                    metrics.input_bytes,
                    metrics.output_mb(),
                    metrics.output_bytes,
                    metrics.duration
                );
                Ok(Completed {
                    job_id: id,
                    output,
                    metrics,
                })
            }
            Ok(Outcome::Failure(err)) => {
                error!("job_id={id} Conversion failed: {err}");
                Err(err)
            }
            Err(WaitError::TimedOut) => {
                error!("job_id={id} Conversion timeout");
                Err(JobError::new(ErrorKind::ResultTimeout, "Request timeout"))
            }
            Err(WaitError::Closed) => {
                error!("job_id={id} Result slot closed without an outcome");
                Err(JobError::new(
                    ErrorKind::ShuttingDown,
                    "server is shutting down",
                ))
            }
        }
    }
}

/// Preconditions the processor cannot check itself.
fn validate(payload: &Payload) -> Result<(), JobError> {
    if payload.filename.trim().is_empty() {
        return Err(JobError::new(ErrorKind::InvalidInput, "missing filename"));
    }
    if payload.data.is_empty() {
        return Err(JobError::new(ErrorKind::InvalidInput, "empty file"));
    }
    Ok(())
}
