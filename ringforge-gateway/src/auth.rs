//! Bearer credential validation - spec.md §4.1 / §4.12. Live keys
//! (`rf_live_...`) scope a channel join to one fleet; admin keys
//! (`rf_admin_...`) authorize the control-plane HTTP surface.

use crate::admin_store::AdminStore;
use axum::http::{header, HeaderMap};
use ringforge_core::{ApiKey, ApiKeyKind, FleetId, GatewayError};

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
}

/// Look up the live key presented on `phx_join` and confirm it scopes the
/// fleet named by the joined topic.
pub async fn authenticate_fleet_key(store: &AdminStore, fleet_id: &FleetId, presented: &str) -> Result<ApiKey, GatewayError> {
    let key = store
        .find_api_key_by_secret(presented)
        .await
        .ok_or(GatewayError::Unauthorized)?;
    if key.revoked || key.kind != ApiKeyKind::Live || &key.fleet_id != fleet_id {
        return Err(GatewayError::Unauthorized);
    }
    Ok(key)
}

/// Validate an admin bearer token for the control-plane HTTP routes.
pub async fn authenticate_admin_key(store: &AdminStore, presented: &str) -> Result<ApiKey, GatewayError> {
    let key = store
        .find_api_key_by_secret(presented)
        .await
        .ok_or(GatewayError::Unauthorized)?;
    if key.revoked || key.kind != ApiKeyKind::Admin {
        return Err(GatewayError::Unauthorized);
    }
    Ok(key)
}

/// Pull the raw bearer token out of request headers. Admin routes call this
/// and then `authenticate_admin_key` against `GatewayState::admin_store`
/// themselves, since axum's `State` extractor already hands them the store.
pub fn extract_bearer(headers: &HeaderMap) -> Option<String> {
    bearer_token(headers)
}
