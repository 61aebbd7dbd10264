//! Shared enums used across the messaging core.

use serde::{Deserialize, Serialize};

/// API key kind. Admin keys grant HTTP control-plane access; live keys
/// authenticate agents over the channel gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiKeyKind {
    Admin,
    Live,
}

/// Context tier self-reported by an agent at join time (`tier0`..`tier3`).
/// Distinct from the access-control `Tier` (0-4) derived from role slug;
/// `context_tier == "tier3"` is one of the inputs that forces access tier 4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextTier {
    Tier0,
    Tier1,
    Tier2,
    Tier3,
}

/// Access-control tier, 0 (highest trust) through 4 (lowest), derived from
/// role slug and `fleet_admin` metadata - see spec.md §4.3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Tier(pub u8);

impl Tier {
    pub const ADMIN: Tier = Tier(0);
    pub const LEADERSHIP: Tier = Tier(1);
    pub const SQUAD_LEAD: Tier = Tier(2);
    pub const CONTRIBUTOR: Tier = Tier(3);
    pub const RESTRICTED: Tier = Tier(4);
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "tier{}", self.0)
    }
}

/// Priority used by escalations, announcements, and task dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Normal,
    High,
    Critical,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

/// Task-store priority, a subset of `Priority` (no `Critical`) used for the
/// pending-queue sort key in §4.11 (high=0, normal=1, low=2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    High,
    Normal,
    Low,
}

impl TaskPriority {
    pub fn rank(&self) -> i64 {
        match self {
            TaskPriority::High => 0,
            TaskPriority::Normal => 1,
            TaskPriority::Low => 2,
        }
    }
}

/// Thread scope - what kind of conversation this thread represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadScope {
    Dm,
    Squad,
    Task,
    Escalation,
}

/// Thread lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadStatus {
    Open,
    Closed,
    Archived,
}

/// Escalation lifecycle state machine: `pending -> handled | forwarded | rejected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationStatus {
    Pending,
    Handled,
    Forwarded,
    Rejected,
}

/// Task dispatch status machine - see spec.md §3 Task invariant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Assigned,
    Running,
    Completed,
    Failed,
    Timeout,
}

impl TaskStatus {
    /// Whether a transition from `self` to `next` is legal per the state
    /// machine: pending -> assigned -> running -> (completed|failed|timeout);
    /// failed/timeout are also reachable directly from pending.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Pending, Assigned)
                | (Pending, Failed)
                | (Pending, Timeout)
                | (Assigned, Running)
                | (Assigned, Failed)
                | (Assigned, Timeout)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Timeout)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Timeout)
    }
}

/// Presence state reported by a connected agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceState {
    Online,
    Busy,
    Away,
}

/// Routed-message action kind, used as BusinessRules evaluation context and
/// RateLimiter key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Dm,
    Broadcast,
    Escalate,
    ThreadReply,
}

/// Broadcast / escalation / announcement scope target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Fleet,
    Squad(SquadRef),
    Role(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SquadRef(pub String);

/// Notification kind, freeform but a small closed set is used by the core.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    DmReceived,
    EscalationNew,
    EscalationAssigned,
    EscalationHandled,
    EscalationForwarded,
    EscalationAutoForwarded,
    EscalationRejected,
    Announcement,
    ThreadMessage,
    ThreadClosed,
}

/// Business-rule kind - see spec.md §4.5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusinessRuleKind {
    Access,
    RateLimit,
    Transform,
}

/// Business-rule action.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusinessRuleAction {
    Allow,
    Deny,
    AttachTaskContext,
    Other(String),
}
