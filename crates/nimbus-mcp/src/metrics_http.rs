// crates/nimbus-mcp/src/metrics_http.rs
// ============================================================================
// Module: Metrics Listener
// Description: Prometheus-style text exposition over HTTP.
// Purpose: Serve the in-memory metric aggregate on a configured port.
// Dependencies: nimbus-core, axum, tokio
// ============================================================================

//! ## Overview
//! A minimal exposition endpoint: `GET /metrics` renders the shared
//! [`nimbus_core::InMemoryMetrics`] aggregate as Prometheus text. The
//! listener runs as a background task next to the MCP transport.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::net::Ipv4Addr;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::routing::get;
use nimbus_core::InMemoryMetrics;

use crate::server::McpServerError;

// ============================================================================
// SECTION: Listener
// ============================================================================

/// Serves the metrics endpoint until the process exits.
///
/// # Errors
///
/// Returns [`McpServerError::Transport`] on bind or serve failures.
pub async fn serve_metrics(
    metrics: Arc<InMemoryMetrics>,
    port: u16,
) -> Result<(), McpServerError> {
    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
    let app = Router::new().route("/metrics", get(render)).with_state(metrics);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|_| McpServerError::Transport("metrics bind failed".to_string()))?;
    axum::serve(listener, app)
        .await
        .map_err(|_| McpServerError::Transport("metrics server failed".to_string()))
}

/// Renders the aggregate as Prometheus text.
async fn render(State(metrics): State<Arc<InMemoryMetrics>>) -> String {
    metrics.render_prometheus()
}
