// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

//! webpconvd: WebP to JPEG conversion over HTTP, backed by a bounded worker pool.

use std::fs;
use std::future::Future;
use std::sync::Arc;

use anyhow::Context;
use log::info;
use tokio::net::TcpListener;

pub mod config;
pub mod job_engine;
pub mod jobs;
pub mod transport;

use crate::config::ServiceConfig;
use crate::job_engine::pool::WorkerPool;
use crate::jobs::webp_to_jpeg_job::WebpToJpegJob;

/// Binds `config.listen` and runs the service until `shutdown` resolves.
pub async fn run(
    config: ServiceConfig,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("failed to bind {}", config.listen))?;
    run_with_listener(config, listener, shutdown).await
}

/// Like [`run`], on a listener the caller already bound.
pub async fn run_with_listener(
    config: ServiceConfig,
    listener: TcpListener,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let mut job = WebpToJpegJob::new(config.jpeg_quality);
    if let Some(dir) = &config.output_dir {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create output directory {}", dir.display()))?;
        info!("Converted files are stored in {}", dir.display());
        job = job.with_output_dir(dir);
    }

    let pool = WorkerPool::start(config.pool.clone(), Arc::new(job))
        .context("failed to start the worker pool")?;
    let app = transport::server::router(pool.dispatcher(), config.body_limit);

    let served = transport::server::serve(listener, app, shutdown).await;

    // Drain the pool even if the server failed, so no worker is left behind.
    info!("Shutting down worker pool");
    let drained = pool.shutdown(config.shutdown_grace).await;
    served.context("HTTP server failed")?;
    drained.context("worker pool did not shut down cleanly")?;
    info!("Server exited");
    Ok(())
}
