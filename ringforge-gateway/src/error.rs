//! Maps the core error taxonomy (spec.md §7) onto `phx_reply` error payloads
//! and, for the admin HTTP surface, onto axum `IntoResponse`.

use axum::{http::StatusCode, response::IntoResponse, response::Response, Json};
use ringforge_core::{CryptoError, GatewayError, RingForgeError, RouterError, StorageError, TaskError};
use serde_json::{json, Value};

/// Render any core error as the `{code, message, ...}` body carried in a
/// `phx_reply`'s `response` field when `status == "error"`.
pub fn to_reply_error(err: &RingForgeError) -> Value {
    match err {
        RingForgeError::Router(e) => router_error_payload(e),
        RingForgeError::Crypto(e) => crypto_error_payload(e),
        RingForgeError::Storage(e) => storage_error_payload(e),
        RingForgeError::Task(e) => task_error_payload(e),
        RingForgeError::Gateway(e) => gateway_error_payload(e),
        RingForgeError::Config(e) => json!({"code": "config_error", "message": e.to_string()}),
    }
}

fn router_error_payload(err: &RouterError) -> Value {
    match err {
        RouterError::AgentNotFound { agent_id } => json!({"code": "agent_not_found", "agent_id": agent_id}),
        RouterError::FleetNotFound { fleet_id } => json!({"code": "fleet_not_found", "fleet_id": fleet_id}),
        RouterError::NotInThisFleet { sender_fleet, target_fleet } => {
            json!({"code": "not_in_this_fleet", "sender_fleet": sender_fleet, "target_fleet": target_fleet})
        }
        RouterError::Denied { reason, suggestion } => json!({"code": "denied", "reason": reason, "suggestion": suggestion}),
        RouterError::Limited { retry_after_ms } => json!({"code": "limited", "retry_after_ms": retry_after_ms}),
        RouterError::StoreFailed { reason } => json!({"code": "store_failed", "reason": reason}),
        RouterError::Timeout => json!({"code": "timeout", "message": "router deadline exceeded"}),
    }
}

fn crypto_error_payload(err: &CryptoError) -> Value {
    let code = match err {
        CryptoError::InvalidSignature => "invalid_signature",
        CryptoError::DecryptionFailed { .. } => "decryption_failed",
        CryptoError::NoFleetKeys { .. } => "no_fleet_keys",
    };
    json!({"code": code, "message": err.to_string()})
}

fn storage_error_payload(err: &StorageError) -> Value {
    json!({"code": "store_failed", "message": err.to_string()})
}

fn task_error_payload(err: &TaskError) -> Value {
    match err {
        TaskError::NotFound { task_id } => json!({"code": "not_found", "task_id": task_id}),
        TaskError::InvalidStatus { current, attempted } => {
            json!({"code": "invalid_status", "current": current, "attempted": attempted})
        }
        TaskError::TtlTooLarge { max_ms, got_ms } => json!({"code": "invalid_input", "max_ms": max_ms, "got_ms": got_ms}),
    }
}

fn gateway_error_payload(err: &GatewayError) -> Value {
    let code = match err {
        GatewayError::PushTimeout => "push_timeout",
        GatewayError::Unauthorized => "unauthorized",
        GatewayError::MalformedFrame { .. } => "malformed_frame",
        GatewayError::UnknownTopic { .. } => "unknown_topic",
    };
    json!({"code": code, "message": err.to_string()})
}

/// Thin `IntoResponse` wrapper for the admin HTTP surface - a code/message
/// JSON body with the matching status line.
pub struct AdminApiError(pub RingForgeError);

impl From<RingForgeError> for AdminApiError {
    fn from(err: RingForgeError) -> Self {
        Self(err)
    }
}

impl IntoResponse for AdminApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            RingForgeError::Router(RouterError::AgentNotFound { .. } | RouterError::FleetNotFound { .. }) => StatusCode::NOT_FOUND,
            RingForgeError::Router(RouterError::Denied { .. }) => StatusCode::FORBIDDEN,
            RingForgeError::Router(RouterError::Limited { .. }) => StatusCode::TOO_MANY_REQUESTS,
            RingForgeError::Gateway(GatewayError::Unauthorized) => StatusCode::UNAUTHORIZED,
            RingForgeError::Task(TaskError::NotFound { .. }) => StatusCode::NOT_FOUND,
            RingForgeError::Task(TaskError::InvalidStatus { .. }) => StatusCode::CONFLICT,
            RingForgeError::Config(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(to_reply_error(&self.0))).into_response()
    }
}
