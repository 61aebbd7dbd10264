//! `/api/agents/{id}/notifications` - spec.md §4.10 / §6. The admin key
//! presented scopes the lookup to its own fleet, mirroring how a live key
//! scopes a channel join.

use crate::auth::{authenticate_admin_key, extract_bearer};
use crate::error::AdminApiError;
use crate::state::GatewayState;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use ringforge_core::{AgentId, GatewayError, Notification, NotificationId, RingForgeError};
use serde_json::{json, Value};
use std::sync::Arc;

async fn require_admin_fleet(state: &GatewayState, headers: &HeaderMap) -> Result<ringforge_core::FleetId, AdminApiError> {
    let presented = extract_bearer(headers).ok_or(RingForgeError::Gateway(GatewayError::Unauthorized))?;
    let key = authenticate_admin_key(&state.admin_store, &presented).await.map_err(RingForgeError::Gateway)?;
    Ok(key.fleet_id)
}

async fn list_notifications(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    Path(agent_id): Path<String>,
) -> Result<Json<Vec<Notification>>, AdminApiError> {
    let fleet_id = require_admin_fleet(&state, &headers).await?;
    let agent_id = AgentId::new(agent_id);
    Ok(Json(state.notifications.list(&fleet_id, &agent_id).await.map_err(AdminApiError)?))
}

async fn unread_count(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    Path(agent_id): Path<String>,
) -> Result<Json<Value>, AdminApiError> {
    let fleet_id = require_admin_fleet(&state, &headers).await?;
    let agent_id = AgentId::new(agent_id);
    let count = state.notifications.unread_count(&fleet_id, &agent_id).await.map_err(AdminApiError)?;
    Ok(Json(json!({"unread": count})))
}

async fn mark_read(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    Path((agent_id, notification_id)): Path<(String, String)>,
) -> Result<Json<Value>, AdminApiError> {
    let fleet_id = require_admin_fleet(&state, &headers).await?;
    let agent_id = AgentId::new(agent_id);
    let notification_id = NotificationId::from_raw(notification_id);
    state.notifications.mark_read(&fleet_id, &agent_id, &notification_id).await.map_err(AdminApiError)?;
    Ok(Json(json!({"status": "ok"})))
}

async fn mark_all_read(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    Path(agent_id): Path<String>,
) -> Result<Json<Value>, AdminApiError> {
    let fleet_id = require_admin_fleet(&state, &headers).await?;
    let agent_id = AgentId::new(agent_id);
    state.notifications.mark_all_read(&fleet_id, &agent_id).await.map_err(AdminApiError)?;
    Ok(Json(json!({"status": "ok"})))
}

pub fn router() -> Router<Arc<GatewayState>> {
    Router::new()
        .route("/:agent_id/notifications", get(list_notifications))
        .route("/:agent_id/notifications/unread_count", get(unread_count))
        .route("/:agent_id/notifications/read_all", post(mark_all_read))
        .route("/:agent_id/notifications/:notification_id/read", post(mark_read))
}
