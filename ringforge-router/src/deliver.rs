//! Delivery-side abstractions invoked at the pipeline's final step -
//! spec.md §4.2 step 9. Implemented by `ringforge-messaging`; kept here so
//! `ringforge-router` never depends on it directly.

use async_trait::async_trait;
use ringforge_core::{Agent, AnnouncementId, EscalationId, FleetId, MessageId, Priority, RouterError, Scope, ThreadId};
use serde_json::{Map, Value};

/// Whether a direct message reached its target over an open channel
/// connection or was queued for later pickup - spec.md §4.6.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DmOutcome {
    Delivered { message_id: MessageId },
    Queued { message_id: MessageId },
}

#[async_trait]
pub trait DmDeliverer: Send + Sync {
    async fn send_message(
        &self,
        fleet_id: &FleetId,
        from: &Agent,
        to: &Agent,
        message: Map<String, Value>,
        correlation_id: Option<String>,
    ) -> Result<DmOutcome, RouterError>;
}

#[async_trait]
pub trait BroadcastDeliverer: Send + Sync {
    /// Fan the message out to every agent the resolved `scope` names,
    /// excluding `from` itself. Returns the number of agents it reached.
    async fn broadcast(
        &self,
        fleet_id: &FleetId,
        from: &Agent,
        scope: &Scope,
        message: Map<String, Value>,
        priority: Priority,
    ) -> Result<usize, RouterError>;
}

#[async_trait]
pub trait EscalationDeliverer: Send + Sync {
    async fn escalate(
        &self,
        fleet_id: &FleetId,
        from: &Agent,
        target_role: &str,
        subject: String,
        body: String,
        priority: Priority,
        context_refs: Vec<String>,
    ) -> Result<EscalationId, RouterError>;
}

#[async_trait]
pub trait ThreadReplyDeliverer: Send + Sync {
    async fn reply(
        &self,
        thread_id: &ThreadId,
        agent: &Agent,
        body: Value,
        refs: Vec<String>,
        metadata: Map<String, Value>,
    ) -> Result<MessageId, RouterError>;
}

#[async_trait]
pub trait AnnouncementDeliverer: Send + Sync {
    async fn announce(
        &self,
        fleet_id: &FleetId,
        from: &Agent,
        scope: &Scope,
        body: String,
        priority: Priority,
        metadata: Map<String, Value>,
    ) -> Result<AnnouncementId, RouterError>;
}
