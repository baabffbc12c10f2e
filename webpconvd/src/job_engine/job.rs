// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::fmt;
use std::time::{Duration, Instant};

use async_channel::{Receiver, Sender};
use async_io::Timer;
use futures::FutureExt;

/// Identity of a job. Unique among the jobs of one pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobId(pub u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conversion-{}", self.0)
    }
}

/// The uploaded file a job works on.
#[derive(Debug, Clone)]
pub struct Payload {
    pub filename: String,
    pub data: Vec<u8>,
    /// Size announced by the transport. Reported as the input size in the metrics.
    pub declared_size: u64,
}

impl Payload {
    pub fn new(filename: impl Into<String>, data: Vec<u8>) -> Self {
        let declared_size = data.len() as u64;
        Self {
            filename: filename.into(),
            data,
            declared_size,
        }
    }
}

/// What a processor hands back on success.
#[derive(Debug, Clone)]
pub struct Converted {
    pub data: Vec<u8>,
    pub output_name: String,
    pub content_type: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Metrics {
    pub duration: Duration,
    pub input_bytes: u64,
    pub output_bytes: u64,
}

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

impl Metrics {
    pub fn input_mb(&self) -> f64 {
        self.input_bytes as f64 / BYTES_PER_MB
    }

    pub fn output_mb(&self) -> f64 {
        self.output_bytes as f64 / BYTES_PER_MB
    }
}

/// Classification of everything that can go wrong with a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Wrong extension or missing fields. Terminal.
    InvalidInput,
    /// The deadline passed before a worker picked the job up. Terminal.
    Expired,
    /// Decoding or encoding failed, or the processor panicked. Terminal.
    Codec,
    /// No queue space within the admission timeout. Transient.
    QueueFull,
    /// No outcome within the job timeout. Transient.
    ResultTimeout,
    /// The pool stopped admitting or processing jobs. Transient.
    ShuttingDown,
}

impl ErrorKind {
    /// Transient failures may succeed if the caller tries again later.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            ErrorKind::QueueFull | ErrorKind::ResultTimeout | ErrorKind::ShuttingDown
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{detail}")]
pub struct JobError {
    pub kind: ErrorKind,
    pub detail: String,
}

impl JobError {
    pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }
}

#[derive(Debug)]
pub enum Outcome {
    Success { output: Converted, metrics: Metrics },
    Failure(JobError),
}

/// The processing function a worker runs for every job that is still within its deadline.
///
/// Implementations are shared by all workers and run on the worker threads, so they may
/// block. A panic is caught by the worker and reported as a codec failure.
pub trait Processor: Send + Sync + 'static {
    /// Free-form description, used for logging
    fn desc(&self) -> &str;

    fn process(&self, payload: &Payload) -> Result<Converted, JobError>;
}

/// Result of a worker's attempt to hand an outcome to the requester.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    /// The requester stopped waiting. The outcome is dropped.
    Abandoned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum WaitError {
    #[error("no outcome within the job timeout")]
    TimedOut,
    #[error("result slot closed without an outcome")]
    Closed,
}

/// Write half of a job's result slot. Consumed by the single write.
#[derive(Debug)]
pub struct ResultWriter {
    tx: Sender<Outcome>,
}

/// Read half of a job's result slot. Consumed by the single read.
#[derive(Debug)]
pub struct ResultReader {
    rx: Receiver<Outcome>,
}

/// Creates a single-write single-read slot for one outcome.
pub fn result_slot() -> (ResultWriter, ResultReader) {
    // One buffered outcome, so a write never waits for the reader to be scheduled.
    let (tx, rx) = async_channel::bounded(1);
    (ResultWriter { tx }, ResultReader { rx })
}

impl ResultWriter {
    /// Writes the outcome, giving up after `timeout` or as soon as the reader is gone.
    ///
    /// The slot buffers its single outcome, so the write completes at once while a reader is
    /// still waiting. `timeout` caps the write, it does not delay it.
    pub async fn deliver(self, outcome: Outcome, timeout: Duration) -> Delivery {
        futures::select_biased! {
            sent = self.tx.send(outcome).fuse() => match sent {
                Ok(()) => Delivery::Delivered,
                Err(_) => Delivery::Abandoned,
            },
            _ = Timer::after(timeout).fuse() => Delivery::Abandoned,
        }
    }
}

impl ResultReader {
    /// Waits up to `timeout` for the outcome.
    ///
    /// On timeout the slot is closed before giving up. An outcome that was buffered before
    /// the close is still returned, any later write sees [`Delivery::Abandoned`]. A writer
    /// reports `Delivered` only for outcomes the reader actually returns.
    pub async fn wait(self, timeout: Duration) -> Result<Outcome, WaitError> {
        let received = futures::select_biased! {
            received = self.rx.recv().fuse() => Some(received),
            _ = Timer::after(timeout).fuse() => None,
        };
        match received {
            Some(received) => received.map_err(|_| WaitError::Closed),
            None => {
                self.rx.close();
                self.rx.try_recv().map_err(|_| WaitError::TimedOut)
            }
        }
    }
}

/// One unit of conversion work.
#[derive(Debug)]
pub struct Job {
    pub id: JobId,
    pub payload: Payload,
    pub deadline: Instant,
    pub(crate) writer: ResultWriter,
}

impl Job {
    /// Builds a job together with the reader the requester waits on.
    pub fn new(id: JobId, payload: Payload, deadline: Instant) -> (Self, ResultReader) {
        let (writer, reader) = result_slot();
        let job = Self {
            id,
            payload,
            deadline,
            writer,
        };
        (job, reader)
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now > self.deadline
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;

    fn converted() -> Converted {
        Converted {
            data: vec![1, 2, 3],
            output_name: "out.jpg".into(),
            content_type: "image/jpeg",
        }
    }

    #[test]
    fn test_job_id_display() {
        assert_eq!(JobId(42).to_string(), "conversion-42");
    }

    #[test]
    fn test_transient_kinds() {
        assert!(ErrorKind::QueueFull.is_transient());
        assert!(ErrorKind::ResultTimeout.is_transient());
        assert!(ErrorKind::ShuttingDown.is_transient());
        assert!(!ErrorKind::InvalidInput.is_transient());
        assert!(!ErrorKind::Expired.is_transient());
        assert!(!ErrorKind::Codec.is_transient());
    }

    #[test]
    fn test_slot_delivers_to_waiting_reader() {
        let (writer, reader) = result_slot();
        block_on(async {
            let delivery = writer
                .deliver(
                    Outcome::Failure(JobError::new(ErrorKind::Codec, "broken")),
                    Duration::from_millis(100),
                )
                .await;
            assert_eq!(delivery, Delivery::Delivered);

            match reader.wait(Duration::from_millis(100)).await {
                Ok(Outcome::Failure(err)) => assert_eq!(err.kind, ErrorKind::Codec),
                other => panic!("unexpected {other:?}"),
            }
        });
    }

    #[test]
    fn test_delivery_to_dropped_reader_is_abandoned() {
        let (writer, reader) = result_slot();
        drop(reader);
        let outcome = Outcome::Success {
            output: converted(),
            metrics: Metrics {
                duration: Duration::ZERO,
                input_bytes: 1,
                output_bytes: 3,
            },
        };
        let delivery = block_on(writer.deliver(outcome, Duration::from_secs(5)));
        assert_eq!(delivery, Delivery::Abandoned);
    }

    #[test]
    fn test_reader_times_out() {
        let (_writer, reader) = result_slot();
        let started = Instant::now();
        let result = block_on(reader.wait(Duration::from_millis(50)));
        assert_eq!(result.unwrap_err(), WaitError::TimedOut);
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn test_reader_sees_closed_slot() {
        let (writer, reader) = result_slot();
        drop(writer);
        let result = block_on(reader.wait(Duration::from_secs(5)));
        assert_eq!(result.unwrap_err(), WaitError::Closed);
    }

    #[test]
    fn test_delivery_does_not_wait_for_the_reader() {
        let (writer, reader) = result_slot();
        let started = Instant::now();
        let delivery = block_on(writer.deliver(
            Outcome::Failure(JobError::new(ErrorKind::Codec, "broken")),
            Duration::from_secs(5),
        ));
        assert_eq!(delivery, Delivery::Delivered);
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(block_on(reader.wait(Duration::ZERO)).is_ok());
    }

    #[test]
    fn test_delivery_after_timeout_is_abandoned_while_reader_alive() {
        let (writer, reader) = result_slot();
        // keep the receiving half alive past the timeout
        let rx = reader.rx.clone();
        let result = block_on(reader.wait(Duration::from_millis(10)));
        assert_eq!(result.unwrap_err(), WaitError::TimedOut);

        let delivery = block_on(writer.deliver(
            Outcome::Failure(JobError::new(ErrorKind::Codec, "late")),
            Duration::from_millis(100),
        ));
        assert_eq!(delivery, Delivery::Abandoned);
        assert!(rx.is_empty());
    }

    #[test]
    fn test_delivered_only_when_reader_returns_the_outcome() {
        // Races the write against the reader's timeout. Whichever side wins, both must agree.
        for i in 0..200u64 {
            let (writer, reader) = result_slot();
            let delay = Duration::from_micros((i % 10) * 100);
            let worker = std::thread::spawn(move || {
                std::thread::sleep(delay);
                block_on(writer.deliver(
                    Outcome::Failure(JobError::new(ErrorKind::Codec, "raced")),
                    Duration::from_millis(100),
                ))
            });
            let received = block_on(reader.wait(Duration::from_micros(500)));
            let delivery = worker.join().unwrap();
            assert_eq!(
                received.is_ok(),
                delivery == Delivery::Delivered,
                "iteration {i}: reader {received:?}, writer {delivery:?}"
            );
        }
    }

    #[test]
    fn test_metrics_in_megabytes() {
        let metrics = Metrics {
            duration: Duration::from_millis(5),
            input_bytes: 2 * 1024 * 1024,
            output_bytes: 512 * 1024,
        };
        assert_eq!(metrics.input_mb(), 2.0);
        assert_eq!(metrics.output_mb(), 0.5);
    }
}
