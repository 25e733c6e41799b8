//! Statistics HTTP server.
//!
//! Serves the current [`Snapshot`](super::Snapshot) as JSON on `GET /` for
//! debugging and automated monitoring.

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::error;

use super::Statistics;

/// Run the statistics server until `shutdown` fires.
pub async fn serve(addr: SocketAddr, stats: Arc<Statistics>, shutdown: CancellationToken) {
    let app = Router::new().route("/", get(root_handler)).with_state(stats);

    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind statistics server to {}: {}", addr, e);
            return;
        }
    };

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
    {
        error!("Statistics server error: {}", e);
    }
}

async fn root_handler(State(stats): State<Arc<Statistics>>) -> Response {
    stats.refresh_file_sizes();

    match serde_json::to_string(&stats.snapshot()) {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            body,
        )
            .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}
