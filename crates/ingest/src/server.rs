use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::error;

use crate::error::ServerError;
use crate::metrics::Metrics;

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub topic: String,
    pub listening: bool,
}

/// Shared state for health endpoints
#[derive(Clone)]
pub struct ServerState {
    pub topic: String,
    pub listening: Arc<AtomicBool>,
    pub metrics: Arc<Metrics>,
}

impl ServerState {
    pub fn new(topic: impl Into<String>, listening: Arc<AtomicBool>, metrics: Arc<Metrics>) -> Self {
        Self {
            topic: topic.into(),
            listening,
            metrics,
        }
    }
}

/// Health endpoint - always returns 200 if server is running
async fn health(State(state): State<ServerState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        topic: state.topic.clone(),
        listening: state.listening.load(Ordering::SeqCst),
    })
}

/// Ready endpoint - returns 200 only once the subscription has started
async fn ready(State(state): State<ServerState>) -> (StatusCode, Json<HealthResponse>) {
    let listening = state.listening.load(Ordering::SeqCst);
    let status_code = if listening {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status_code,
        Json(HealthResponse {
            status: if listening { "ready" } else { "not_ready" }.to_string(),
            topic: state.topic.clone(),
            listening,
        }),
    )
}

fn encode_metrics(metrics: &Metrics) -> Result<String, ServerError> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&metrics.registry.gather(), &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// Prometheus text exposition
async fn metrics(State(state): State<ServerState>) -> (StatusCode, String) {
    match encode_metrics(&state.metrics) {
        Ok(body) => (StatusCode::OK, body),
        Err(e) => {
            error!(error = %e, "failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// Create the health server router
pub fn create_router(state: ServerState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Serve health and metrics until `shutdown` turns true
pub async fn run_server(
    listener: TcpListener,
    state: ServerState,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let app = create_router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
        })
        .await
}
