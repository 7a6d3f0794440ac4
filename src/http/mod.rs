use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::core::{limits::ResourceLimits, traits::executor::Executor};

pub mod errors;
pub mod handlers;
pub mod mappers;
pub mod models;

#[derive(Clone, Debug)]
pub struct AppState {
    pub executor: Arc<dyn Executor>,
    pub limits: ResourceLimits,
}

impl AppState {
    pub fn new(executor: Arc<dyn Executor>, limits: ResourceLimits) -> Self {
        Self { executor, limits }
    }
}

/// Leaves room for a maximum-size program after JSON escaping plus the test
/// list, so oversized code is rejected by admission with a proper message.
fn body_limit(limits: &ResourceLimits) -> usize {
    limits
        .max_source_bytes()
        .saturating_mul(6)
        .saturating_add(1024 * 1024)
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/run", post(handlers::run))
        .layer(DefaultBodyLimit::max(body_limit(&state.limits)))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(addr: SocketAddr, state: AppState) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("HTTP server listening on {}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!("Failed to listen for SIGTERM: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
