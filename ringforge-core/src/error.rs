//! Error taxonomy for RingForge Hub - spec.md §7.

use crate::{AgentId, DurationMs, FleetId};
use thiserror::Error;

/// Crypto-layer failures - spec.md §4.1 / §7.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CryptoError {
    #[error("no live api key on file for fleet {fleet_id}")]
    NoFleetKeys { fleet_id: String },

    #[error("signature verification failed")]
    InvalidSignature,

    #[error("decryption failed: {reason}")]
    DecryptionFailed { reason: String },
}

/// Router / access-control / rate-limit failures surfaced to clients.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RouterError {
    #[error("agent not found: {agent_id}")]
    AgentNotFound { agent_id: String },

    #[error("fleet not found: {fleet_id}")]
    FleetNotFound { fleet_id: String },

    #[error("agents must be in the same fleet")]
    NotInThisFleet { sender_fleet: String, target_fleet: String },

    #[error("denied: {reason}")]
    Denied {
        reason: String,
        suggestion: Option<DeniedSuggestion>,
    },

    #[error("rate limited, retry after {retry_after_ms}ms")]
    Limited { retry_after_ms: DurationMs },

    #[error("store operation failed: {reason}")]
    StoreFailed { reason: String },

    #[error("router deadline exceeded")]
    Timeout,
}

/// Actionable suggestion attached to a `denied` response - spec.md §4.3.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DeniedSuggestion {
    pub your_squad_leader: Option<String>,
    pub alternative: Option<String>,
    pub required_format: Option<String>,
}

/// KV-store / prefix-scan failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("key not found: {key}")]
    NotFound { key: String },

    #[error("store write failed for {key}: {reason}")]
    WriteFailed { key: String, reason: String },

    #[error("serialization failed: {reason}")]
    Serialization { reason: String },
}

/// Task-store state-machine failures - spec.md §4.11.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TaskError {
    #[error("task not found: {task_id}")]
    NotFound { task_id: String },

    #[error("invalid status transition to {attempted}, current status is {current}")]
    InvalidStatus { current: String, attempted: String },

    #[error("ttl must not exceed {max_ms}ms, got {got_ms}ms")]
    TtlTooLarge { max_ms: i64, got_ms: i64 },
}

/// Channel-gateway protocol failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("push timed out waiting for reply")]
    PushTimeout,

    #[error("invalid credential")]
    Unauthorized,

    #[error("malformed frame: {reason}")]
    MalformedFrame { reason: String },

    #[error("unknown topic: {topic}")]
    UnknownTopic { topic: String },
}

/// Configuration validation failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Top-level error composing every domain's taxonomy, one `thiserror`
/// variant per subsystem.
#[derive(Debug, Clone, Error)]
pub enum RingForgeError {
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Router(#[from] RouterError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Task(#[from] TaskError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type RingForgeResult<T> = Result<T, RingForgeError>;

impl RouterError {
    pub fn not_in_this_fleet(sender_fleet: FleetId, target_fleet: FleetId) -> Self {
        RouterError::NotInThisFleet {
            sender_fleet: sender_fleet.to_string(),
            target_fleet: target_fleet.to_string(),
        }
    }

    pub fn agent_not_found(agent_id: &AgentId) -> Self {
        RouterError::AgentNotFound { agent_id: agent_id.to_string() }
    }

    pub fn denied(reason: impl Into<String>, suggestion: Option<DeniedSuggestion>) -> Self {
        RouterError::Denied { reason: reason.into(), suggestion }
    }
}
