//! Plain HTTP liveness endpoint for hosting platforms that expect a bound port.

use anyhow::{Context, Result};
use axum::routing::get;
use axum::Router;
use std::net::SocketAddr;
use tracing::info;

/// Body of `GET /`.
pub const LIVENESS_BODY: &str = "Attach Bot is Live!";

/// Router answering `GET /` with [`LIVENESS_BODY`].
pub fn liveness_router() -> Router {
    Router::new().route("/", get(|| async { LIVENESS_BODY }))
}

/// Serve the liveness router on `0.0.0.0:port` until the process exits.
///
/// # Errors
///
/// Returns an error if the port cannot be bound or the server fails.
pub async fn serve_liveness(port: u16) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind liveness port {port}"))?;
    info!("Liveness server listening on {addr}");
    axum::serve(listener, liveness_router())
        .await
        .context("liveness server stopped")
}
