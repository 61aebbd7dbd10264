//! Announcements - spec.md §4.9.

use crate::notifications::Notifications;
use async_trait::async_trait;
use ringforge_core::{now, Agent, Announcement, AnnouncementId, FleetId, NotificationKind, Priority, RouterError, Scope};
use ringforge_router::{AgentDirectory, AnnouncementDeliverer, BroadcastDeliverer};
use ringforge_storage::{put_json, KvStore, PubSub};
use serde_json::{Map, Value};
use std::sync::Arc;

const PREVIEW_LEN: usize = 80;

fn announcement_key(fleet_id: &FleetId, id: &AnnouncementId) -> String {
    format!("ann:{fleet_id}:{id}")
}

fn preview(body: &str) -> String {
    if body.chars().count() <= PREVIEW_LEN {
        body.to_string()
    } else {
        format!("{}...", body.chars().take(PREVIEW_LEN).collect::<String>())
    }
}

pub struct Announcements {
    store: Arc<dyn KvStore>,
    pubsub: Arc<PubSub>,
    directory: Arc<dyn AgentDirectory>,
    notifications: Arc<Notifications>,
}

impl Announcements {
    pub fn new(store: Arc<dyn KvStore>, pubsub: Arc<PubSub>, directory: Arc<dyn AgentDirectory>, notifications: Arc<Notifications>) -> Self {
        Self { store, pubsub, directory, notifications }
    }

    /// Resolve `scope` to its recipient set and publish, per spec.md §4.9:
    /// `fleet` publishes once and counts live presences, `squad:{id}`
    /// publishes to the squad plus a marked copy on the fleet topic, and
    /// `role:{slug}` resolves and notifies every matching agent directly.
    async fn fan_out(&self, fleet_id: &FleetId, scope: &Scope, kind: &str, payload: &Value) -> usize {
        match scope {
            Scope::Fleet => {
                let topic = format!("fleet:{fleet_id}");
                self.pubsub.publish(&topic, kind, payload.clone());
                self.pubsub.subscriber_count(&topic)
            }
            Scope::Squad(squad_ref) => {
                self.pubsub.publish(&format!("squad:{}", squad_ref.0), kind, payload.clone());
                let mut marked = payload.clone();
                if let Value::Object(ref mut map) = marked {
                    map.insert("squad_scoped".to_string(), Value::Bool(true));
                }
                self.pubsub.publish(&format!("fleet:{fleet_id}"), kind, marked);
                match squad_ref.0.parse::<ringforge_core::SquadId>() {
                    Ok(squad_id) => self.directory.agents_in_squad(fleet_id, &squad_id).await.len(),
                    Err(_) => 0,
                }
            }
            Scope::Role(slug) => {
                let members = self.directory.agents_with_role_slugs(fleet_id, &[slug.as_str()]).await;
                for member in &members {
                    self.pubsub.publish(&format!("fleet:{fleet_id}:agent:{}", member.agent_id), kind, payload.clone());
                }
                members.len()
            }
        }
    }

    async fn recipients(&self, fleet_id: &FleetId, scope: &Scope) -> Vec<ringforge_core::AgentId> {
        match scope {
            Scope::Fleet => self.directory.agents_in_fleet(fleet_id).await.into_iter().map(|a| a.agent_id).collect(),
            Scope::Squad(squad_ref) => match squad_ref.0.parse::<ringforge_core::SquadId>() {
                Ok(squad_id) => self.directory.agents_in_squad(fleet_id, &squad_id).await.into_iter().map(|a| a.agent_id).collect(),
                Err(_) => Vec::new(),
            },
            Scope::Role(slug) => self
                .directory
                .agents_with_role_slugs(fleet_id, &[slug.as_str()])
                .await
                .into_iter()
                .map(|a| a.agent_id)
                .collect(),
        }
    }

    async fn do_announce(
        &self,
        fleet_id: &FleetId,
        from: &Agent,
        scope: &Scope,
        body: String,
        priority: Priority,
        metadata: Map<String, Value>,
    ) -> Result<AnnouncementId, RouterError> {
        let announcement = Announcement {
            id: AnnouncementId::generate(),
            fleet_id: *fleet_id,
            from: from.agent_id.clone(),
            scope: scope.clone(),
            body: body.clone(),
            priority,
            metadata,
            timestamp: now(),
        };
        put_json(self.store.as_ref(), &announcement_key(fleet_id, &announcement.id), &announcement)
            .await
            .map_err(|e| RouterError::StoreFailed { reason: e.to_string() })?;

        let payload = serde_json::to_value(&announcement).unwrap_or(Value::Null);
        self.fan_out(fleet_id, scope, "announcement", &payload).await;

        let preview_text = preview(&body);
        for recipient in self.recipients(fleet_id, scope).await {
            let _ = self
                .notifications
                .notify(
                    fleet_id,
                    &recipient,
                    NotificationKind::Announcement,
                    serde_json::json!({"announcement_id": announcement.id.to_string(), "preview": preview_text}),
                )
                .await;
        }

        Ok(announcement.id)
    }
}

#[async_trait]
impl AnnouncementDeliverer for Announcements {
    async fn announce(
        &self,
        fleet_id: &FleetId,
        from: &Agent,
        scope: &Scope,
        body: String,
        priority: Priority,
        metadata: Map<String, Value>,
    ) -> Result<AnnouncementId, RouterError> {
        self.do_announce(fleet_id, from, scope, body, priority, metadata).await
    }
}

#[async_trait]
impl BroadcastDeliverer for Announcements {
    /// `message:broadcast` shares AccessControl/scope resolution with
    /// `announce` but carries a transient message map rather than persisted
    /// announcement text; stringify the map's `body` field (or the whole map)
    /// to reuse the same preview/notification plumbing.
    async fn broadcast(
        &self,
        fleet_id: &FleetId,
        from: &Agent,
        scope: &Scope,
        message: Map<String, Value>,
        priority: Priority,
    ) -> Result<usize, RouterError> {
        let body = message
            .get("body")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .unwrap_or_else(|| serde_json::to_string(&message).unwrap_or_default());
        self.do_announce(fleet_id, from, scope, body, priority, message).await?;
        Ok(self.recipients(fleet_id, scope).await.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ringforge_core::EntityIdType;
    use crate::registry::AgentRegistry;
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
            role_slug: Some("tech-lead".to_string()),
            context_tier: ContextTier::Tier0,
            metadata: serde_json::Map::new(),
        }
    }

    #[tokio::test]
    async fn fleet_scope_announcement_notifies_every_fleet_agent() {
        let store = InMemoryKvStore::new();
        let pubsub = Arc::new(PubSub::default());
        let registry = AgentRegistry::new();
        let notifications = Arc::new(Notifications::new(store.clone(), pubsub.clone()));
        let fleet = FleetId::new_v4();
        let sender = agent("ag_a", fleet);
        registry.upsert(sender.clone());
        registry.upsert(agent("ag_b", fleet));

        let announcements = Announcements::new(store, pubsub, registry, notifications.clone());
        announcements
            .announce(&fleet, &sender, &Scope::Fleet, "hello fleet".to_string(), Priority::Normal, Map::new())
            .await
            .unwrap();

        assert_eq!(notifications.unread_count(&fleet, &AgentId::new("ag_b")).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn role_scope_only_notifies_matching_slug() {
        let store = InMemoryKvStore::new();
        let pubsub = Arc::new(PubSub::default());
        let registry = AgentRegistry::new();
        let notifications = Arc::new(Notifications::new(store.clone(), pubsub.clone()));
        let fleet = FleetId::new_v4();
        let sender = agent("ag_a", fleet);
        registry.upsert(sender.clone());

        let mut other = agent("ag_qa", fleet);
        other.role_slug = Some("qa-engineer".to_string());
        registry.upsert(other);

        let announcements = Announcements::new(store, pubsub, registry, notifications.clone());
        announcements
            .announce(&fleet, &sender, &Scope::Role("tech-lead".to_string()), "hi".to_string(), Priority::Normal, Map::new())
            .await
            .unwrap();

        assert_eq!(notifications.unread_count(&fleet, &AgentId::new("ag_a")).await.unwrap(), 1);
        assert_eq!(notifications.unread_count(&fleet, &AgentId::new("ag_qa")).await.unwrap(), 0);
    }

    #[test]
    fn preview_truncates_long_bodies_to_eighty_chars() {
        let body = "x".repeat(200);
        assert_eq!(preview(&body).len(), PREVIEW_LEN + 3);
    }
}
