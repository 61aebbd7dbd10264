//! Prometheus text-exposition endpoint - spec.md §6.

use crate::state::GatewayState;
use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use std::sync::Arc;

async fn metrics(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], state.metrics.render())
}

pub fn router() -> Router<Arc<GatewayState>> {
    Router::new().route("/metrics", get(metrics))
}
