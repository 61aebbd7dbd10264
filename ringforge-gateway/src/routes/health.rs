//! Liveness/readiness endpoints - ping/live/ready, trimmed to what a
//! KV-backed hub can actually check (no database pool to probe).

use crate::state::GatewayState;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    connected_agents: usize,
}

async fn ping() -> impl IntoResponse {
    "pong"
}

async fn live() -> impl IntoResponse {
    Json(HealthResponse { status: "healthy", version: env!("CARGO_PKG_VERSION"), connected_agents: 0 })
}

async fn ready(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        connected_agents: state.connections.connected_count(),
    })
}

pub fn router() -> Router<Arc<GatewayState>> {
    Router::new().route("/health/ping", get(ping)).route("/health/live", get(live)).route("/health/ready", get(ready))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_response_serializes_with_lowercase_status() {
        let response = HealthResponse { status: "healthy", version: "0.1.0", connected_agents: 3 };
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"status\":\"healthy\""));
        assert!(json.contains("\"connected_agents\":3"));
    }
}
