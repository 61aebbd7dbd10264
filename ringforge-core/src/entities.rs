//! Entity structs for the messaging core - spec.md §3.

use crate::*;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: TenantId,
    pub name: String,
    pub plan: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fleet {
    pub id: FleetId,
    pub tenant_id: TenantId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: ApiKeyId,
    pub fleet_id: FleetId,
    pub kind: ApiKeyKind,
    /// Opaque high-entropy secret. Never logged; see `ringforge-crypto` for
    /// how this is turned into derived signing/encryption keys.
    pub raw_secret: String,
    pub revoked: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleTemplate {
    pub id: RoleTemplateId,
    pub slug: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Squad {
    pub id: SquadId,
    pub fleet_id: FleetId,
    pub name: String,
}

/// An authenticated agent. Created on first successful key-authenticated
/// join, persists afterward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub agent_id: AgentId,
    pub fleet_id: FleetId,
    pub squad_id: Option<SquadId>,
    pub name: String,
    pub display_name: String,
    pub role_template_id: Option<RoleTemplateId>,
    pub role_slug: Option<String>,
    pub context_tier: ContextTier,
    /// Opaque metadata map. `metadata["fleet_admin"] == true` grants access
    /// tier 0 regardless of role slug.
    pub metadata: serde_json::Map<String, JsonValue>,
}

impl Agent {
    pub fn is_fleet_admin(&self) -> bool {
        matches!(self.metadata.get("fleet_admin"), Some(JsonValue::Bool(true)))
    }
}

/// Direct-message envelope. `from.fleet_id == to.fleet_id == fleet_id` is a
/// tenant-isolation invariant enforced by the Router, not by the type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectMessageEnvelope {
    pub message_id: MessageId,
    pub fleet_id: FleetId,
    pub from: MessageSender,
    pub to: AgentId,
    pub message: serde_json::Map<String, JsonValue>,
    pub correlation_id: Option<String>,
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageSender {
    pub agent_id: AgentId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thread {
    pub thread_id: ThreadId,
    pub fleet_id: FleetId,
    pub tenant_id: TenantId,
    pub scope: ThreadScope,
    pub subject: String,
    pub status: ThreadStatus,
    pub participant_ids: HashSet<AgentId>,
    pub task_id: Option<TaskId>,
    pub message_count: u64,
    pub last_message_at: Option<Timestamp>,
    pub created_by: AgentId,
    pub closed_by: Option<AgentId>,
    pub close_reason: Option<String>,
    pub created_at: Timestamp,
    pub closed_at: Option<Timestamp>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadMessage {
    pub thread_id: ThreadId,
    pub message_id: MessageId,
    pub agent_id: AgentId,
    pub body: JsonValue,
    pub refs: Vec<String>,
    pub metadata: serde_json::Map<String, JsonValue>,
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Escalation {
    pub id: EscalationId,
    pub fleet_id: FleetId,
    pub from_agent: AgentId,
    pub target_role: String,
    pub subject: String,
    pub body: String,
    pub priority: Priority,
    pub context_refs: Vec<String>,
    pub status: EscalationStatus,
    pub handler_agent: Option<AgentId>,
    pub forwarded_to: Option<AgentId>,
    pub response: Option<String>,
    pub created_at: Timestamp,
    pub handled_at: Option<Timestamp>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Announcement {
    pub id: AnnouncementId,
    pub fleet_id: FleetId,
    pub from: AgentId,
    pub scope: Scope,
    pub body: String,
    pub priority: Priority,
    pub metadata: serde_json::Map<String, JsonValue>,
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub payload: JsonValue,
    pub timestamp: Timestamp,
    pub read: bool,
}

/// Distributed dispatch work unit - see spec.md §3 and §4.11.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub task_id: TaskId,
    pub fleet_id: FleetId,
    pub requester_id: AgentId,
    #[serde(rename = "type")]
    pub task_type: String,
    pub prompt: String,
    pub capabilities_required: Vec<String>,
    pub assigned_to: Option<AgentId>,
    pub status: TaskStatus,
    pub result: Option<JsonValue>,
    pub error: Option<String>,
    pub priority: TaskPriority,
    pub ttl_ms: i64,
    pub created_at: Timestamp,
    pub assigned_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub correlation_id: Option<String>,
}

/// Maximum task TTL, per spec.md §3.
pub const MAX_TASK_TTL_MS: i64 = 300_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceRecord {
    pub fleet_id: FleetId,
    pub agent_id: AgentId,
    pub state: PresenceState,
    pub task: Option<String>,
    pub last_seen: Timestamp,
}

/// Fleet-configurable routing rule - spec.md §4.5.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusinessRule {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: BusinessRuleKind,
    /// condition[key] == context[key] (or any-of when the condition value is
    /// a JSON array) for every key present.
    pub condition: serde_json::Map<String, JsonValue>,
    pub action: BusinessRuleAction,
    pub message: Option<String>,
    pub limit: Option<u32>,
    pub per: Option<String>,
    #[serde(default)]
    pub auto_forward: bool,
}

/// An append-only activity-log entry, keyed by fleet, as referenced by
/// spec.md §6 (`ringforge.{fleet_id}.{activity|broadcast|dm}`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub event_id: String,
    pub from: Option<AgentId>,
    pub kind: String,
    pub description: String,
    pub tags: Vec<String>,
    pub data: JsonValue,
    pub timestamp: Timestamp,
}
