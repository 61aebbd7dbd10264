//! Per-resource route modules - each module exposes
//! `router() -> Router<Arc<GatewayState>>`.

pub mod admin;
pub mod health;
pub mod metrics;
pub mod notifications;
pub mod rules;

use crate::state::GatewayState;
use axum::Router;
use std::sync::Arc;

pub fn create_router() -> Router<Arc<GatewayState>> {
    Router::new()
        .merge(health::router())
        .merge(metrics::router())
        .nest("/api/admin", admin::router().merge(rules::router()))
        .nest("/api/agents", notifications::router())
}
