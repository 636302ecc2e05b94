//! Health check and stats HTTP server

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::timeout::TimeoutLayer;

use postrider_common::Signal;
use postrider_spool::{Counters, QueueStore};

use crate::{HealthConfig, HealthError};

#[derive(Clone)]
struct AppState {
    store: Arc<QueueStore>,
    max_queue_depth: u64,
}

/// Queue accounting as reported by `/stats`.
#[derive(Debug, Serialize)]
struct Stats {
    #[serde(flatten)]
    counters: Counters,
    depth: u64,
}

/// Health check HTTP server
///
/// Provides `/health/live` and `/health/ready` endpoints for Kubernetes
/// probes, and `/stats` for queue accounting.
pub struct HealthServer {
    listener: TcpListener,
    router: Router,
}

impl HealthServer {
    /// Create a new health server
    ///
    /// # Errors
    ///
    /// Returns an error if binding to the specified address fails.
    pub async fn new(config: HealthConfig, store: Arc<QueueStore>) -> Result<Self, HealthError> {
        let listener = TcpListener::bind(&config.listen_address)
            .await
            .map_err(|e| HealthError::BindError {
                address: config.listen_address.clone(),
                source: e,
            })?;

        tracing::info!(
            address = %config.listen_address,
            "Health check server bound successfully"
        );

        let state = AppState {
            store,
            max_queue_depth: config.max_queue_depth,
        };

        let router = Router::new()
            .route("/health/live", get(liveness_handler))
            .route("/health/ready", get(readiness_handler))
            .route("/stats", get(stats_handler))
            .with_state(state)
            // Probes must respond within 1 second
            .layer(TimeoutLayer::new(Duration::from_secs(1)));

        Ok(Self { listener, router })
    }

    /// Run the health server until shutdown signal is received
    ///
    /// # Errors
    ///
    /// Returns an error if the server encounters a runtime error.
    pub async fn serve(
        self,
        mut shutdown: tokio::sync::broadcast::Receiver<Signal>,
    ) -> Result<(), HealthError> {
        tracing::info!("Health check server starting");

        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Health check server received shutdown signal");
            })
            .await
            .map_err(|e| HealthError::ServerError(e.to_string()))?;

        tracing::info!("Health check server stopped");
        Ok(())
    }
}

/// Liveness probe handler
///
/// Returns 200 OK if the process is alive (can respond to requests).
async fn liveness_handler() -> Response {
    (StatusCode::OK, "OK").into_response()
}

/// Readiness probe handler
///
/// Returns 200 OK while the queue backlog is within bounds. Once the number
/// of undelivered messages exceeds the configured threshold the probe fails,
/// so orchestrators steer submissions elsewhere until the backlog drains.
async fn readiness_handler(State(state): State<AppState>) -> Response {
    let counters = state.store.counters().await;
    let depth = counters.depth();

    if depth <= state.max_queue_depth {
        (StatusCode::OK, "OK").into_response()
    } else {
        tracing::warn!(
            depth,
            max_queue_depth = state.max_queue_depth,
            "Readiness probe failed"
        );
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(Stats { counters, depth }),
        )
            .into_response()
    }
}

/// Stats handler
///
/// Returns the queue counters along with the current backlog depth.
async fn stats_handler(State(state): State<AppState>) -> Response {
    let counters = state.store.counters().await;
    let depth = counters.depth();

    Json(Stats { counters, depth }).into_response()
}
