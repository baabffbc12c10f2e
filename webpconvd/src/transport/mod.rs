// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

//! HTTP front of the daemon. Handlers only translate between HTTP and the job engine; all
//! queueing, deadlines and conversion happen behind [`Dispatcher`](crate::job_engine::dispatcher::Dispatcher).

pub mod handlers;
pub mod server;
