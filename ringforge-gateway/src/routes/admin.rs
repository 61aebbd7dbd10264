//! Tenant/fleet/key/role-template/squad CRUD - spec.md §6's control plane.
//! Every route here requires `Authorization: Bearer rf_admin_...` per
//! spec.md §4.1.

use crate::auth::{authenticate_admin_key, extract_bearer};
use crate::error::AdminApiError;
use crate::state::GatewayState;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use ringforge_core::{
    ApiKey, ApiKeyId, ApiKeyKind, EntityIdType, Fleet, FleetId, RingForgeError, RoleTemplate, RoleTemplateId, Squad, SquadId, Tenant,
    TenantId,
};
use serde::Deserialize;
use std::sync::Arc;

async fn require_admin(state: &GatewayState, headers: &HeaderMap) -> Result<ApiKey, AdminApiError> {
    let presented = extract_bearer(headers).ok_or(RingForgeError::Gateway(ringforge_core::GatewayError::Unauthorized))?;
    authenticate_admin_key(&state.admin_store, &presented).await.map_err(|e| RingForgeError::Gateway(e).into())
}

#[derive(Debug, Deserialize)]
struct CreateTenant {
    name: String,
    #[serde(default = "default_plan")]
    plan: String,
}

fn default_plan() -> String {
    "free".to_string()
}

async fn create_tenant(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    Json(body): Json<CreateTenant>,
) -> Result<Json<Tenant>, AdminApiError> {
    require_admin(&state, &headers).await?;
    let tenant = Tenant { id: TenantId::new_v4(), name: body.name, plan: body.plan };
    state.admin_store.put_tenant(&tenant).await.map_err(AdminApiError)?;
    Ok(Json(tenant))
}

async fn get_tenant(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    Path(id): Path<TenantId>,
) -> Result<Json<Tenant>, AdminApiError> {
    require_admin(&state, &headers).await?;
    let tenant = state.admin_store.get_tenant(&id).await.map_err(AdminApiError)?;
    tenant.map(Json).ok_or_else(|| RingForgeError::Router(ringforge_core::RouterError::FleetNotFound { fleet_id: id.to_string() }).into())
}

#[derive(Debug, Deserialize)]
struct CreateFleet {
    tenant_id: TenantId,
    name: String,
}

async fn create_fleet(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    Json(body): Json<CreateFleet>,
) -> Result<Json<Fleet>, AdminApiError> {
    require_admin(&state, &headers).await?;
    let fleet = Fleet { id: FleetId::new_v4(), tenant_id: body.tenant_id, name: body.name };
    state.admin_store.put_fleet(&fleet).await.map_err(AdminApiError)?;
    Ok(Json(fleet))
}

async fn get_fleet(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    Path(id): Path<FleetId>,
) -> Result<Json<Fleet>, AdminApiError> {
    require_admin(&state, &headers).await?;
    let fleet = state.admin_store.get_fleet(&id).await.map_err(AdminApiError)?;
    fleet.map(Json).ok_or_else(|| RingForgeError::Router(ringforge_core::RouterError::FleetNotFound { fleet_id: id.to_string() }).into())
}

#[derive(Debug, Deserialize)]
struct CreateApiKey {
    #[serde(default)]
    kind: ApiKeyKindWire,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
enum ApiKeyKindWire {
    #[default]
    Live,
    Admin,
}

fn random_secret(prefix: &str) -> String {
    format!("{prefix}_{:032x}", rand::random::<u128>())
}

async fn create_api_key(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    Path(fleet_id): Path<FleetId>,
    Json(body): Json<CreateApiKey>,
) -> Result<Json<ApiKey>, AdminApiError> {
    require_admin(&state, &headers).await?;
    let (kind, prefix) = match body.kind {
        ApiKeyKindWire::Live => (ApiKeyKind::Live, "rf_live"),
        ApiKeyKindWire::Admin => (ApiKeyKind::Admin, "rf_admin"),
    };
    let key = ApiKey { id: ApiKeyId::new_v4(), fleet_id, kind, raw_secret: random_secret(prefix), revoked: false };
    state.admin_store.put_api_key(&key).await.map_err(AdminApiError)?;
    Ok(Json(key))
}

async fn list_api_keys(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    Path(fleet_id): Path<FleetId>,
) -> Result<Json<Vec<ApiKey>>, AdminApiError> {
    require_admin(&state, &headers).await?;
    Ok(Json(state.admin_store.list_api_keys_for_fleet(&fleet_id).await.map_err(AdminApiError)?))
}

async fn revoke_api_key(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    Path(id): Path<ApiKeyId>,
) -> Result<Json<ApiKey>, AdminApiError> {
    require_admin(&state, &headers).await?;
    let mut key = state
        .admin_store
        .get_api_key(&id)
        .await
        .map_err(AdminApiError)?
        .ok_or_else(|| RingForgeError::Gateway(ringforge_core::GatewayError::Unauthorized))?;
    key.revoked = true;
    state.admin_store.put_api_key(&key).await.map_err(AdminApiError)?;
    Ok(Json(key))
}

#[derive(Debug, Deserialize)]
struct CreateRoleTemplate {
    slug: String,
}

async fn create_role_template(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    Json(body): Json<CreateRoleTemplate>,
) -> Result<Json<RoleTemplate>, AdminApiError> {
    require_admin(&state, &headers).await?;
    let template = RoleTemplate { id: RoleTemplateId::new_v4(), slug: body.slug };
    state.admin_store.put_role_template(&template).await.map_err(AdminApiError)?;
    Ok(Json(template))
}

async fn get_role_template(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    Path(id): Path<RoleTemplateId>,
) -> Result<Json<RoleTemplate>, AdminApiError> {
    require_admin(&state, &headers).await?;
    let template = state.admin_store.get_role_template(&id).await.map_err(AdminApiError)?;
    template.map(Json).ok_or_else(|| RingForgeError::Gateway(ringforge_core::GatewayError::Unauthorized).into())
}

#[derive(Debug, Deserialize)]
struct CreateSquad {
    name: String,
}

async fn create_squad(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    Path(fleet_id): Path<FleetId>,
    Json(body): Json<CreateSquad>,
) -> Result<Json<Squad>, AdminApiError> {
    require_admin(&state, &headers).await?;
    let squad = Squad { id: SquadId::new_v4(), fleet_id, name: body.name };
    state.admin_store.put_squad(&squad).await.map_err(AdminApiError)?;
    Ok(Json(squad))
}

async fn list_squads(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    Path(fleet_id): Path<FleetId>,
) -> Result<Json<Vec<Squad>>, AdminApiError> {
    require_admin(&state, &headers).await?;
    Ok(Json(state.admin_store.list_squads_for_fleet(&fleet_id).await.map_err(AdminApiError)?))
}

async fn get_squad(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    Path((fleet_id, id)): Path<(FleetId, SquadId)>,
) -> Result<Json<Squad>, AdminApiError> {
    require_admin(&state, &headers).await?;
    let squad = state.admin_store.get_squad(&fleet_id, &id).await.map_err(AdminApiError)?;
    squad.map(Json).ok_or_else(|| RingForgeError::Gateway(ringforge_core::GatewayError::Unauthorized).into())
}

pub fn router() -> Router<Arc<GatewayState>> {
    Router::new()
        .route("/tenants", post(create_tenant))
        .route("/tenants/:id", get(get_tenant))
        .route("/fleets", post(create_fleet))
        .route("/fleets/:id", get(get_fleet))
        .route("/fleets/:fleet_id/apikeys", post(create_api_key).get(list_api_keys))
        .route("/apikeys/:id", delete(revoke_api_key))
        .route("/role_templates", post(create_role_template))
        .route("/role_templates/:id", get(get_role_template))
        .route("/fleets/:fleet_id/squads", post(create_squad).get(list_squads))
        .route("/fleets/:fleet_id/squads/:id", get(get_squad))
}
