// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::future::Future;
use std::io;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use log::info;
use tokio::net::TcpListener;

use crate::job_engine::dispatcher::Dispatcher;
use crate::transport::handlers;

/// Shared by all request handlers.
#[derive(Debug)]
pub struct AppState {
    pub dispatcher: Dispatcher,
}

pub fn router(dispatcher: Dispatcher, body_limit: usize) -> Router {
    let state = Arc::new(AppState { dispatcher });
    Router::new()
        .route("/convert", post(handlers::convert))
        .route("/health", get(handlers::health))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

/// Serves HTTP/1.1 and cleartext HTTP/2 until `shutdown` resolves, then lets open requests
/// finish before returning.
pub async fn serve(
    listener: TcpListener,
    app: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("Server starting on {addr}");
    }
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown)
        .await?;
    info!("Server stopped accepting requests");
    Ok(())
}
