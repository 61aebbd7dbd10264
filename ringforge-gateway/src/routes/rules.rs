//! Business-rule CRUD at `/api/admin/fleets/{id}/rules` - spec.md §6, thin
//! wrapper over `ringforge_router::business_rules`.

use crate::auth::{authenticate_admin_key, extract_bearer};
use crate::error::AdminApiError;
use crate::state::GatewayState;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use ringforge_core::{BusinessRule, FleetId, GatewayError, RingForgeError};
use ringforge_router::business_rules;
use std::sync::Arc;

async fn require_admin(state: &GatewayState, headers: &HeaderMap) -> Result<(), AdminApiError> {
    let presented = extract_bearer(headers).ok_or(RingForgeError::Gateway(GatewayError::Unauthorized))?;
    authenticate_admin_key(&state.admin_store, &presented).await.map_err(RingForgeError::Gateway)?;
    Ok(())
}

async fn list_rules(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    Path(fleet_id): Path<FleetId>,
) -> Result<Json<Vec<BusinessRule>>, AdminApiError> {
    require_admin(&state, &headers).await?;
    let rules = business_rules::load_rules(state.store.as_ref(), &fleet_id.to_string()).await.map_err(AdminApiError)?;
    Ok(Json(rules))
}

async fn add_rule(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    Path(fleet_id): Path<FleetId>,
    Json(rule): Json<BusinessRule>,
) -> Result<Json<Vec<BusinessRule>>, AdminApiError> {
    require_admin(&state, &headers).await?;
    let rules = business_rules::add_rule(state.store.as_ref(), &fleet_id.to_string(), rule).await.map_err(AdminApiError)?;
    Ok(Json(rules))
}

async fn remove_rule(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    Path((fleet_id, rule_id)): Path<(FleetId, String)>,
) -> Result<Json<Vec<BusinessRule>>, AdminApiError> {
    require_admin(&state, &headers).await?;
    let rules = business_rules::remove_rule(state.store.as_ref(), &fleet_id.to_string(), &rule_id).await.map_err(AdminApiError)?;
    Ok(Json(rules))
}

async fn replace_rules(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    Path(fleet_id): Path<FleetId>,
    Json(rules): Json<Vec<BusinessRule>>,
) -> Result<Json<Vec<BusinessRule>>, AdminApiError> {
    require_admin(&state, &headers).await?;
    business_rules::save_rules(state.store.as_ref(), &fleet_id.to_string(), &rules).await.map_err(AdminApiError)?;
    Ok(Json(rules))
}

pub fn router() -> Router<Arc<GatewayState>> {
    Router::new()
        .route("/:fleet_id/rules", get(list_rules).post(add_rule).put(replace_rules))
        .route("/:fleet_id/rules/:rule_id", delete(remove_rule))
}
