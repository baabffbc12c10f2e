// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::thread::JoinHandle;
use std::time::Duration;

use async_channel::{Receiver, Sender};
use async_io::Timer;
use futures::FutureExt;
use log::{debug, info, warn};

// Both the signal and the completion tracking are plain channels that never carry a message.
// Closing a channel wakes every receiver, which gives us a broadcast that is not consumed by
// the first observer. Dropping the last sender closes it as well.

/// Broadcast cancellation signal observed by every worker.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: Receiver<()>,
}

impl ShutdownSignal {
    pub fn is_raised(&self) -> bool {
        self.rx.is_closed()
    }

    /// Resolves once the signal is raised.
    pub async fn raised(&self) {
        // Nothing is ever sent, so recv only returns when the channel is closed.
        let _ = self.rx.recv().await;
    }
}

/// Held by a worker for as long as it runs. Dropping it reports completion.
#[derive(Debug)]
pub struct CompletionToken {
    _tx: Sender<()>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ShutdownError {
    #[error("{running} worker(s) still running after a grace period of {grace:?}")]
    GracePeriodElapsed { running: usize, grace: Duration },
}

#[derive(Debug)]
pub struct ShutdownCoordinator {
    signal_tx: Sender<()>,
    signal: ShutdownSignal,
    done_tx: Option<Sender<()>>,
    done_rx: Receiver<()>,
    handles: Vec<JoinHandle<()>>,
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (signal_tx, signal_rx) = async_channel::bounded(1);
        let (done_tx, done_rx) = async_channel::bounded(1);
        Self {
            signal_tx,
            signal: ShutdownSignal { rx: signal_rx },
            done_tx: Some(done_tx),
            done_rx,
            handles: Vec::new(),
        }
    }

    pub fn signal(&self) -> ShutdownSignal {
        self.signal.clone()
    }

    /// Hands out a token for one more worker. Panics once [`wait`](Self::wait) has started.
    pub fn completion_token(&self) -> CompletionToken {
        let tx = self
            .done_tx
            .as_ref()
            .expect("completion tokens must be handed out before waiting")
            .clone();
        CompletionToken { _tx: tx }
    }

    /// Keeps the thread handle so it can be joined after the worker reported completion.
    pub fn register(&mut self, handle: JoinHandle<()>) {
        self.handles.push(handle);
    }

    /// Number of workers that have not dropped their token yet.
    pub fn running(&self) -> usize {
        let own = usize::from(self.done_tx.is_some());
        self.done_rx.sender_count().saturating_sub(own)
    }

    pub fn raise(&self) {
        if self.signal_tx.close() {
            info!("Shutdown signal raised");
        }
    }

    /// Waits until every worker has reported completion or `grace` has elapsed.
    ///
    /// Workers that are still running after the grace period stay detached.
    pub async fn wait(&mut self, grace: Duration) -> Result<(), ShutdownError> {
        self.done_tx = None;

        let finished = futures::select_biased! {
            _ = self.done_rx.recv().fuse() => true,
            _ = Timer::after(grace).fuse() => false,
        };

        if !finished {
            let running = self.running();
            warn!("{running} worker(s) did not finish within {grace:?}");
            return Err(ShutdownError::GracePeriodElapsed { running, grace });
        }

        // Tokens are dropped as the last statement of each worker thread, so every thread is
        // already exiting here and the blocking joins return at once.
        for handle in self.handles.drain(..) {
            let name = handle.thread().name().unwrap_or("worker").to_string();
            if handle.join().is_err() {
                warn!("{name} terminated with a panic");
            } else {
                debug!("{name} joined");
            }
        }
        Ok(())
    }
}
