//! HTTP service: upload, progress stream, download.
//!
//! ```text
//! POST /api/convert/start            multipart `file` → {"jobId": "..."}
//! GET  /api/convert/progress?jobId=  text/event-stream of `progress` events
//! GET  /api/convert/download?jobId=  the finished .xlsx
//! POST /api/convert                  synchronous conversion (legacy)
//! GET  /health
//! ```

pub mod handlers;
pub mod router;
pub mod state;

pub use router::create_router;
pub use state::AppState;

use crate::config::ServerConfig;
use crate::error::Pdf2XlsxError;
use tokio::net::TcpListener;
use tracing::info;

/// Bind, start the job sweeper and serve until Ctrl-C.
pub async fn serve(state: AppState, config: &ServerConfig) -> Result<(), Pdf2XlsxError> {
    let addr = config.socket_addr()?;
    let sweeper = state.jobs.spawn_sweeper(config.sweep_interval());

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| Pdf2XlsxError::Internal(format!("Failed to bind {addr}: {e}")))?;
    info!(
        "Listening on http://{} (job ttl {}s, upload limit {} MiB)",
        addr, config.job_ttl_secs, config.max_upload_mb
    );

    let result = axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| Pdf2XlsxError::Internal(format!("Server error: {e}")));

    sweeper.abort();
    info!("Server stopped");
    result
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown signal received");
    }
}
