// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::time::Duration;

use async_channel::{Receiver, Sender};
use async_io::Timer;
use futures::FutureExt;

use crate::job_engine::job::Job;
use crate::job_engine::shutdown::ShutdownSignal;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    #[error("job queue full")]
    QueueFull,
    #[error("job queue closed")]
    Closed,
}

/// What a worker gets back from [`BoundedQueue::take`].
#[derive(Debug)]
pub enum Take {
    Job(Job),
    Cancelled,
}

/// Fixed-capacity FIFO shared by the dispatcher (producer side) and the workers (consumer
/// side). All coordination happens inside the channel; callers never take a lock.
#[derive(Debug, Clone)]
pub struct BoundedQueue {
    tx: Sender<Job>,
    rx: Receiver<Job>,
}

impl BoundedQueue {
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "queue capacity must be at least 1");
        let (tx, rx) = async_channel::bounded(capacity);
        Self { tx, rx }
    }

    pub fn capacity(&self) -> usize {
        self.tx.capacity().unwrap_or(usize::MAX)
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Admits `job` once there is room, or rejects it when `timeout` elapses first. A rejected
    /// job is dropped and never becomes visible to a worker.
    pub async fn submit(&self, job: Job, timeout: Duration) -> Result<(), SubmitError> {
        futures::select_biased! {
            sent = self.tx.send(job).fuse() => sent.map_err(|_| SubmitError::Closed),
            _ = Timer::after(timeout).fuse() => Err(SubmitError::QueueFull),
        }
    }

    /// Waits for the next job. Returns [`Take::Cancelled`] without removing anything once the
    /// shutdown signal is raised or the queue is closed and empty.
    pub async fn take(&self, shutdown: &ShutdownSignal) -> Take {
        if shutdown.is_raised() {
            return Take::Cancelled;
        }
        futures::select_biased! {
            _ = shutdown.raised().fuse() => Take::Cancelled,
            received = self.rx.recv().fuse() => match received {
                Ok(job) => Take::Job(job),
                Err(_) => Take::Cancelled,
            },
        }
    }

    /// Stops admission. Jobs already queued stay until taken or drained.
    pub fn close(&self) -> bool {
        self.tx.close()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Removes every job that is still queued.
    pub fn drain(&self) -> Vec<Job> {
        let mut jobs = Vec::with_capacity(self.len());
        while let Ok(job) = self.rx.try_recv() {
            jobs.push(job);
        }
        jobs
    }
}
