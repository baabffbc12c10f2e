// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>
//! # Design: Bounded, Deadline-Aware Worker Pool
//!
//! ## Overview
//! A fixed set of worker threads consumes jobs from one bounded queue.
//!
//! - The dispatcher builds a job per request and submits it under an admission timeout.
//!   A full queue rejects instead of growing (backpressure).
//! - Every job carries an absolute deadline. A worker that dequeues an expired job reports
//!   it as expired without running the processor.
//! - The outcome travels back through a one-shot result slot. The dispatcher waits for it
//!   under the job timeout, the worker writes it under its own delivery timeout, so a
//!   requester that gave up never blocks a worker.
//! - Shutdown is a broadcast signal (a closed channel) observed at every blocking point of
//!   a worker. The coordinator then waits for all workers and fails what is left queued.
//!
//! ```text
//!         +-------------+   submit (admission timeout)   +----------------+
//!         | Dispatcher  | -----------------------------> |  BoundedQueue  |
//!         | (per req.)  |                                +-------+--------+
//!         +------+------+                                        | take
//!                ^                                  +------------+------------+
//!                | wait (job timeout)               |            |            |
//!                |                             +----v---+   +----v---+   +----v---+
//!                +---------------------------- | Worker |   | Worker |   | Worker |
//!                   deliver (delivery timeout) +--------+   +--------+   +--------+
//!                                                   ^            ^            ^
//!                                                   +------ ShutdownSignal ---+
//! ```

pub mod closure_processor;
pub mod dispatcher;
pub mod job;
pub mod pool;
pub mod queue;
pub mod shutdown;
mod worker;
