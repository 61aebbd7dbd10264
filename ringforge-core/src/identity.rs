//! Identity types for RingForge entities.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::Hash;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// UUID-BACKED ENTITY ID TYPE SYSTEM
// ============================================================================

/// Trait for type-safe, UUID-backed entity IDs.
///
/// Gives compile-time safety so a `FleetId` can never be passed where a
/// `TenantId` is expected, even though both are UUIDs underneath.
pub trait EntityIdType:
    Copy + Clone + Eq + PartialEq + Hash + fmt::Debug + fmt::Display + FromStr + Serialize + serde::de::DeserializeOwned + Send + Sync + 'static
{
    const ENTITY_NAME: &'static str;

    fn new(uuid: Uuid) -> Self;
    fn as_uuid(&self) -> Uuid;

    fn nil() -> Self {
        Self::new(Uuid::nil())
    }

    fn new_v4() -> Self {
        Self::new(Uuid::new_v4())
    }
}

#[derive(Debug, Clone)]
pub struct EntityIdParseError {
    pub entity_name: &'static str,
    pub input: String,
    pub source: uuid::Error,
}

impl fmt::Display for EntityIdParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to parse {} id from '{}': {}", self.entity_name, self.input, self.source)
    }
}

impl std::error::Error for EntityIdParseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

macro_rules! define_entity_id {
    ($name:ident, $entity:literal, $doc:literal) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(Uuid);

        impl EntityIdType for $name {
            const ENTITY_NAME: &'static str = $entity;

            fn new(uuid: Uuid) -> Self {
                Self(uuid)
            }

            fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = EntityIdParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::from_str(s).map(Self::new).map_err(|e| EntityIdParseError {
                    entity_name: Self::ENTITY_NAME,
                    input: s.to_string(),
                    source: e,
                })
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::nil()
            }
        }

        impl Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                self.0.serialize(serializer)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                Uuid::deserialize(deserializer).map(Self::new)
            }
        }
    };
}

define_entity_id!(TenantId, "tenant", "Type-safe ID for a tenant.");
define_entity_id!(FleetId, "fleet", "Type-safe ID for a fleet.");
define_entity_id!(SquadId, "squad", "Type-safe ID for a squad.");
define_entity_id!(RoleTemplateId, "role_template", "Type-safe ID for a role template.");
define_entity_id!(ApiKeyId, "api_key", "Type-safe ID for an API key.");

// ============================================================================
// PREFIXED-STRING ENTITY IDS
//
// Agents are named externally (not generated by the hub) and the remaining
// hub-native ids are short prefixed base62/hex strings, not UUIDs - see
// spec.md §3 for the exact prefix + alphabet per entity.
// ============================================================================

const BASE62_ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

fn random_base62(len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| BASE62_ALPHABET[rng.random_range(0..BASE62_ALPHABET.len())] as char)
        .collect()
}

fn random_hex(len_bytes: usize) -> String {
    let mut rng = rand::rng();
    (0..len_bytes).map(|_| format!("{:02x}", rng.random::<u8>())).collect()
}

/// Agent identifier - an externally supplied string, unique within a fleet.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentId(pub String);

impl AgentId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AgentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for AgentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Macro for the hub's own prefixed-string ids (`msg_`, `thr_`, `esc_`, ...).
macro_rules! define_prefixed_id {
    ($name:ident, $prefix:literal, $len:literal, $doc:literal) => {
        #[doc = $doc]
        #[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            /// Generate a fresh random id with the `
            #[doc = $prefix]
            /// ` prefix.
            pub fn generate() -> Self {
                Self(format!("{}{}", $prefix, random_base62($len)))
            }

            pub fn from_raw(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

define_prefixed_id!(MessageId, "msg_", 12, "Direct-message envelope id, `msg_` + 12 base62 chars.");
define_prefixed_id!(ThreadId, "thr_", 12, "Thread id, `thr_` + 12 base62 chars.");
define_prefixed_id!(EscalationId, "esc_", 16, "Escalation id, `esc_` + 16 base62 chars.");
define_prefixed_id!(AnnouncementId, "ann_", 12, "Announcement id, `ann_` + 12 base62 chars.");
define_prefixed_id!(NotificationId, "ntf_", 16, "Notification id, `ntf_` + 16 base62 chars.");

/// Task id: `task_` + 16 hex chars (distinct alphabet from the base62 ids above).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn generate() -> Self {
        Self(format!("task_{}", random_hex(8)))
    }

    pub fn from_raw(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Timestamp type, always UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Duration in milliseconds, used for TTLs and retry hints on the wire.
pub type DurationMs = i64;

pub fn now() -> Timestamp {
    chrono::Utc::now()
}

pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_id_has_prefix_and_length() {
        let id = MessageId::generate();
        assert!(id.0.starts_with("msg_"));
        assert_eq!(id.0.len(), 4 + 12);
    }

    #[test]
    fn task_id_has_hex_suffix() {
        let id = TaskId::generate();
        assert!(id.0.starts_with("task_"));
        assert_eq!(id.0.len(), 5 + 16);
        assert!(id.0[5..].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn tenant_id_roundtrips_through_uuid_string() {
        let id = TenantId::new_v4();
        let s = id.to_string();
        let parsed: TenantId = s.parse().unwrap();
        assert_eq!(id, parsed);
    }
}
