//! DirectMessage - spec.md §4.6.

use crate::activity;
use crate::notifications::Notifications;
use crate::presence::PresenceTracker;
use async_trait::async_trait;
use ringforge_core::{now, Agent, DirectMessageEnvelope, FleetId, MessageId, MessageSender, NotificationKind, RouterError};
use ringforge_router::{DmDeliverer, DmOutcome};
use ringforge_storage::{list_prefix_tail, put_json, KvStore, PubSub};
use serde_json::{Map, Value};
use std::sync::Arc;

fn queue_key(fleet_id: &FleetId, to: &ringforge_core::AgentId, message_id: &MessageId) -> String {
    format!("dmq:{fleet_id}:{to}:{message_id}")
}

pub struct DirectMessages {
    store: Arc<dyn KvStore>,
    pubsub: Arc<PubSub>,
    presence: Arc<PresenceTracker>,
    notifications: Arc<Notifications>,
}

impl DirectMessages {
    pub fn new(store: Arc<dyn KvStore>, pubsub: Arc<PubSub>, presence: Arc<PresenceTracker>, notifications: Arc<Notifications>) -> Self {
        Self { store, pubsub, presence, notifications }
    }

    async fn send(
        &self,
        fleet_id: &FleetId,
        from: &Agent,
        to: &Agent,
        message: Map<String, Value>,
        correlation_id: Option<String>,
    ) -> Result<DmOutcome, RouterError> {
        if from.fleet_id != *fleet_id || to.fleet_id != *fleet_id {
            return Err(RouterError::not_in_this_fleet(from.fleet_id, to.fleet_id));
        }
        // The ChannelGateway forbids self-send; the core tolerates it as a no-op.
        if from.agent_id == to.agent_id {
            let message_id = MessageId::generate();
            return Ok(DmOutcome::Delivered { message_id });
        }

        let message_id = MessageId::generate();
        let envelope = DirectMessageEnvelope {
            message_id: message_id.clone(),
            fleet_id: *fleet_id,
            from: MessageSender { agent_id: from.agent_id.clone(), name: from.name.clone() },
            to: to.agent_id.clone(),
            message,
            correlation_id,
            timestamp: now(),
        };

        let outcome = if self.presence.is_online(fleet_id, &to.agent_id) {
            self.pubsub.publish(
                &format!("fleet:{fleet_id}:agent:{}", to.agent_id),
                "direct_message",
                serde_json::to_value(&envelope).unwrap_or(Value::Null),
            );
            DmOutcome::Delivered { message_id: message_id.clone() }
        } else {
            let key = queue_key(fleet_id, &to.agent_id, &message_id);
            put_json(self.store.as_ref(), &key, &envelope)
                .await
                .map_err(|e| RouterError::StoreFailed { reason: e.to_string() })?;
            DmOutcome::Queued { message_id: message_id.clone() }
        };

        activity::append(
            self.store.as_ref(),
            fleet_id,
            "dm",
            Some(from.agent_id.clone()),
            "direct message",
            vec![],
            serde_json::json!({"to": to.agent_id.to_string(), "message_id": message_id.to_string()}),
        )
        .await;

        let _ = self
            .notifications
            .notify(
                fleet_id,
                &to.agent_id,
                NotificationKind::DmReceived,
                serde_json::json!({"from": from.agent_id.to_string(), "message_id": message_id.to_string()}),
            )
            .await;

        Ok(outcome)
    }

    /// `deliver_queued(fleet_id, agent_id)` - called when an agent joins its
    /// fleet channel. Publishes every queued envelope and deletes the key.
    pub async fn deliver_queued(
        &self,
        fleet_id: &FleetId,
        agent_id: &ringforge_core::AgentId,
    ) -> Result<Vec<DirectMessageEnvelope>, RouterError> {
        let prefix = format!("dmq:{fleet_id}:{agent_id}:");
        let entries = list_prefix_tail(self.store.as_ref(), &prefix, usize::MAX, None)
            .await
            .map_err(|e| RouterError::StoreFailed { reason: e.to_string() })?;

        let mut delivered = Vec::with_capacity(entries.len());
        for (key, raw) in entries {
            let Ok(envelope) = serde_json::from_str::<DirectMessageEnvelope>(&raw) else { continue };
            self.pubsub.publish(
                &format!("fleet:{fleet_id}:agent:{agent_id}"),
                "direct_message",
                serde_json::to_value(&envelope).unwrap_or(Value::Null),
            );
            self.store.delete(&key).await.map_err(|e| RouterError::StoreFailed { reason: e.to_string() })?;
            delivered.push(envelope);
        }
        Ok(delivered)
    }
}

#[async_trait]
impl DmDeliverer for DirectMessages {
    async fn send_message(
        &self,
        fleet_id: &FleetId,
        from: &Agent,
        to: &Agent,
        message: Map<String, Value>,
        correlation_id: Option<String>,
    ) -> Result<DmOutcome, RouterError> {
        self.send(fleet_id, from, to, message, correlation_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ringforge_core::EntityIdType;
    use ringforge_core::{AgentId, ContextTier};
    use ringforge_storage::InMemoryKvStore;

    fn agent(id: &str, fleet_id: FleetId) -> Agent {
        Agent {
            agent_id: AgentId::new(id),
            fleet_id,
            squad_id: None,
            name: id.to_string(),
            display_name: id.to_string(),
            role_template_id: None,
            role_slug: None,
            context_tier: ContextTier::Tier0,
            metadata: serde_json::Map::new(),
        }
    }

    fn setup() -> (DirectMessages, FleetId) {
        let store = InMemoryKvStore::new();
        let pubsub = Arc::new(PubSub::default());
        let presence = PresenceTracker::new();
        let notifications = Arc::new(Notifications::new(store.clone(), pubsub.clone()));
        (DirectMessages::new(store, pubsub, presence, notifications), FleetId::new_v4())
    }

    #[tokio::test]
    async fn offline_target_gets_queued_then_delivered_exactly_once_on_reconnect() {
        let (dm, fleet) = setup();
        let from = agent("ag_a", fleet);
        let to = agent("ag_b", fleet);

        let outcome = dm.send_message(&fleet, &from, &to, Map::new(), None).await.unwrap();
        assert!(matches!(outcome, DmOutcome::Queued { .. }));

        let delivered = dm.deliver_queued(&fleet, &to.agent_id).await.unwrap();
        assert_eq!(delivered.len(), 1);

        let second = dm.deliver_queued(&fleet, &to.agent_id).await.unwrap();
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn online_target_is_delivered_without_a_queue_entry() {
        let (dm, fleet) = setup();
        let from = agent("ag_a", fleet);
        let to = agent("ag_b", fleet);
        dm.presence.join(fleet, to.agent_id.clone());

        let outcome = dm.send_message(&fleet, &from, &to, Map::new(), None).await.unwrap();
        assert!(matches!(outcome, DmOutcome::Delivered { .. }));
    }

    #[tokio::test]
    async fn cross_fleet_send_is_rejected() {
        let (dm, fleet1) = setup();
        let fleet2 = FleetId::new_v4();
        let from = agent("ag_a", fleet1);
        let to = agent("ag_c", fleet2);
        let err = dm.send_message(&fleet1, &from, &to, Map::new(), None).await.unwrap_err();
        assert!(matches!(err, RouterError::NotInThisFleet { .. }));
    }
}
