//! Status and health reporting surface.
//!
//! Two read-only endpoints over the shared status registry:
//!
//! - `GET /status` — the serialized [`ReplicationStatus`] snapshot
//! - `GET /health` — trivial liveness, independent of replication state
//!
//! Handlers only take snapshots; tick errors never propagate here. The
//! server shuts down gracefully when the replicator's stop signal fires,
//! with the time bound enforced by the caller.

use crate::status::{ReplicationStatus, StatusRegistry};
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

/// Build the reporting router over a status registry.
pub fn router(status: Arc<StatusRegistry>) -> Router {
    Router::new()
        .route("/status", get(get_status))
        .route("/health", get(get_health))
        .with_state(status)
}

async fn get_status(State(registry): State<Arc<StatusRegistry>>) -> Json<ReplicationStatus> {
    Json(registry.snapshot().await)
}

async fn get_health() -> Json<serde_json::Value> {
    Json(json!({"status": "ok"}))
}

/// Serve the reporting surface until the stop signal fires.
pub async fn serve(
    listener: tokio::net::TcpListener,
    status: Arc<StatusRegistry>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let addr = listener.local_addr()?;
    info!(%addr, "Reporting surface listening");

    axum::serve(listener, router(status))
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.wait_for(|stop| *stop).await;
            info!("Reporting surface shutting down");
        })
        .await
}
