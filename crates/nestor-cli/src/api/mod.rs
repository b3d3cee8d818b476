//! HTTP API server

pub mod jobs;
pub mod routes;

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;

use crate::context::Context;
use crate::error::{CliError, Result};
use jobs::JobQueue;

pub struct AppState {
    pub context: Context,
    pub jobs: JobQueue,
    /// Held for the whole of an advance run
    pub advance_lock: tokio::sync::Mutex<()>,
}

impl AppState {
    pub fn new(context: Context) -> Self {
        let settings = &context.settings;
        let jobs = JobQueue::start(
            settings.build_workers,
            settings.build_queue_size,
            settings.job_history_size,
        );
        Self {
            context,
            jobs,
            advance_lock: tokio::sync::Mutex::new(()),
        }
    }
}

/// Serve the API on `addr` until Ctrl+C or SIGTERM
pub async fn serve(context: Context, addr: SocketAddr) -> Result<()> {
    let app = routes::router(Arc::new(AppState::new(context)));

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| CliError::internal(format!("failed to bind to {}: {}", addr, e)))?;
    tracing::info!(addr = %addr, "nestor API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| CliError::internal(format!("HTTP server failed: {}", e)))?;

    tracing::info!("nestor API stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(err = %err, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(err = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C signal"),
        _ = terminate => tracing::info!("received SIGTERM signal"),
    }
}
