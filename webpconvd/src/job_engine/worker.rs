// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::any::Any;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::job_engine::job::{
    Delivery, ErrorKind, Job, JobError, Metrics, Outcome, Payload, Processor,
};
use crate::job_engine::pool::PoolStats;
use crate::job_engine::queue::{BoundedQueue, Take};
use crate::job_engine::shutdown::{CompletionToken, ShutdownSignal};

/// Everything one worker needs. Each worker owns its own copy.
pub(crate) struct WorkerContext {
    pub index: usize,
    pub queue: BoundedQueue,
    pub signal: ShutdownSignal,
    pub processor: Arc<dyn Processor>,
    pub delivery_timeout: Duration,
    pub stats: Arc<PoolStats>,
}

/// Runs the worker loop on a dedicated thread. The token is dropped when the loop ends.
pub(crate) fn spawn_worker(
    ctx: WorkerContext,
    token: CompletionToken,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("webpconv-worker-{}", ctx.index))
        .spawn(move || {
            futures::executor::block_on(worker_loop(ctx));
            drop(token);
        })
}

pub(crate) async fn worker_loop(ctx: WorkerContext) {
    info!("Worker {} started ({})", ctx.index, ctx.processor.desc());
    loop {
        let job = match ctx.queue.take(&ctx.signal).await {
            Take::Job(job) => job,
            Take::Cancelled => break,
        };
        run_job(&ctx, job).await;
    }
    info!("Worker {} shutting down", ctx.index);
}

async fn run_job(ctx: &WorkerContext, job: Job) {
    let expired = job.is_expired(Instant::now());
    let Job {
        id,
        payload,
        writer,
        ..
    } = job;

    let outcome = if expired {
        PoolStats::bump(&ctx.stats.expired);
        warn!("job_id={id} expired before processing");
        Outcome::Failure(JobError::new(ErrorKind::Expired, "job expired"))
    } else {
        debug!("job_id={id} processing on worker {}", ctx.index);
        let outcome = process(ctx.processor.as_ref(), &payload);
        match &outcome {
            Outcome::Success { .. } => PoolStats::bump(&ctx.stats.succeeded),
            Outcome::Failure(_) => PoolStats::bump(&ctx.stats.failed),
        }
        outcome
    };

    match writer.deliver(outcome, ctx.delivery_timeout).await {
        Delivery::Delivered => PoolStats::bump(&ctx.stats.delivered),
        Delivery::Abandoned => {
            PoolStats::bump(&ctx.stats.abandoned);
            warn!("job_id={id} Failed to send result - client timeout");
        }
    }
}

/// Invokes the processor and measures it. A panic becomes a codec failure so the worker
/// survives it.
pub(crate) fn process(processor: &dyn Processor, payload: &Payload) -> Outcome {
    let started = Instant::now();
    let result = panic::catch_unwind(AssertUnwindSafe(|| processor.process(payload)))
        .unwrap_or_else(|panic| {
            Err(JobError::new(
                ErrorKind::Codec,
                format!("worker panicked: {}", panic_message(panic.as_ref())),
            ))
        });

    match result {
        Ok(output) => {
            let metrics = Metrics {
                duration: started.elapsed(),
                input_bytes: payload.declared_size,
                output_bytes: output.data.len() as u64,
            };
            Outcome::Success { output, metrics }
        }
        Err(err) => Outcome::Failure(err),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        *msg
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "unknown panic"
    }
}
