// SPDX-License-Identifier: MIT
// webpconvd: converts uploaded WebP images to JPEG.
//
// - Accepts multipart uploads on POST /convert.
// - Runs every conversion on a fixed pool of worker threads behind a bounded queue.
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use clap::Parser;
use log::{info, warn};

use webpconvd::config::{validate_args, Args};

fn main() -> anyhow::Result<()> {
    // A missing .env is fine; variables already in the environment win.
    let dotenv = dotenvy::dotenv();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Err(e) = dotenv {
        if !e.not_found() {
            warn!("Could not load .env: {e}");
        }
    }

    let args = Args::parse();
    if let Err(e) = validate_args(&args) {
        eprintln!("Error: {e}");
        std::process::exit(2);
    }
    let config = args.into_config();
    info!(
        "Starting webpconvd: port={} num_workers={} job_queue_size={} job_timeout={:?} job_queue_timeout={:?} worker_result_timeout={:?} buffer_size={}",
        config.listen.port(),
        config.pool.workers,
        config.pool.capacity,
        config.pool.job_timeout,
        config.pool.admission_timeout,
        config.pool.delivery_timeout,
        config.body_limit
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(webpconvd::run(config, shutdown_signal()))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Ctrl+C received, shutting down..."),
        _ = terminate => info!("SIGTERM received, shutting down..."),
    }
}
