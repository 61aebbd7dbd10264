//! Escalation - spec.md §4.8.

use crate::notifications::Notifications;
use async_trait::async_trait;
use ringforge_core::{
    now, Agent, AgentId, BusinessRule, Escalation, EscalationId, EscalationStatus, FleetId, NotificationKind, Priority,
    RingForgeError, RingForgeResult, RouterError, StorageError,
};
use ringforge_router::{AgentDirectory, EscalationDeliverer};
use ringforge_storage::{get_json, put_json, KeyLocks, KvStore, PubSub};
use std::sync::Arc;

const TIER1_FALLBACK_SLUGS: &[&str] = &["tech-lead", "product-manager", "consultant"];

fn escalation_key(fleet_id: &FleetId, id: &EscalationId) -> String {
    format!("esc:{fleet_id}:{id}")
}

fn index_key(fleet_id: &FleetId) -> String {
    format!("esc_idx:{fleet_id}")
}

pub struct Escalations {
    store: Arc<dyn KvStore>,
    pubsub: Arc<PubSub>,
    directory: Arc<dyn AgentDirectory>,
    notifications: Arc<Notifications>,
    locks: KeyLocks,
}

impl Escalations {
    pub fn new(store: Arc<dyn KvStore>, pubsub: Arc<PubSub>, directory: Arc<dyn AgentDirectory>, notifications: Arc<Notifications>) -> Self {
        Self { store, pubsub, directory, notifications, locks: KeyLocks::new() }
    }

    async fn append_index(&self, fleet_id: &FleetId, id: &EscalationId) -> RingForgeResult<()> {
        self.locks
            .with_lock(&index_key(fleet_id), || async {
                let mut idx: Vec<String> = get_json(self.store.as_ref(), &index_key(fleet_id)).await?.unwrap_or_default();
                let s = id.to_string();
                if !idx.contains(&s) {
                    idx.push(s);
                }
                put_json(self.store.as_ref(), &index_key(fleet_id), &idx).await
            })
            .await
    }

    /// Determine handler ids per spec.md §4.8: the sender's squad leader if
    /// one exists, otherwise every fleet agent with a tier-1 role slug.
    async fn handler_ids(&self, fleet_id: &FleetId, sender: &Agent) -> Vec<AgentId> {
        if let Some(squad_id) = sender.squad_id {
            if let Some(leader) = self.directory.squad_leader(fleet_id, &squad_id).await {
                return vec![leader.agent_id];
            }
        }
        self.directory
            .agents_with_role_slugs(fleet_id, TIER1_FALLBACK_SLUGS)
            .await
            .into_iter()
            .map(|a| a.agent_id)
            .collect()
    }

    async fn auto_forward_rules(&self, fleet_id: &FleetId) -> Vec<BusinessRule> {
        ringforge_router::business_rules::load_rules(self.store.as_ref(), &fleet_id.to_string())
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|r| r.auto_forward)
            .collect()
    }

    async fn create(
        &self,
        fleet_id: &FleetId,
        sender: &Agent,
        target_role: &str,
        subject: String,
        body: String,
        priority: Priority,
        context_refs: Vec<String>,
    ) -> Result<EscalationId, RouterError> {
        let escalation = Escalation {
            id: EscalationId::generate(),
            fleet_id: *fleet_id,
            from_agent: sender.agent_id.clone(),
            target_role: target_role.to_string(),
            subject,
            body,
            priority,
            context_refs,
            status: EscalationStatus::Pending,
            handler_agent: None,
            forwarded_to: None,
            response: None,
            created_at: now(),
            handled_at: None,
        };
        put_json(self.store.as_ref(), &escalation_key(fleet_id, &escalation.id), &escalation)
            .await
            .map_err(|e| RouterError::StoreFailed { reason: e.to_string() })?;
        self.append_index(fleet_id, &escalation.id).await.map_err(|e| RouterError::StoreFailed { reason: e.to_string() })?;

        let handlers = self.handler_ids(fleet_id, sender).await;
        for handler in &handlers {
            self.pubsub.publish(
                &format!("fleet:{fleet_id}:agent:{handler}"),
                "escalation_new",
                serde_json::to_value(&escalation).unwrap_or(serde_json::Value::Null),
            );
            let _ = self
                .notifications
                .notify(
                    fleet_id,
                    handler,
                    NotificationKind::EscalationNew,
                    serde_json::json!({"escalation_id": escalation.id.to_string()}),
                )
                .await;
        }

        let auto_forward_rules = self.auto_forward_rules(fleet_id).await;
        let should_auto_forward = auto_forward_rules.iter().any(|rule| {
            let priority_matches = rule
                .condition
                .get("priority")
                .and_then(|v| v.as_str())
                .is_some_and(|p| p == priority_str(priority));
            let role_matches = rule
                .condition
                .get("from_role")
                .and_then(|v| v.as_str())
                .is_some_and(|r| sender.role_slug.as_deref() == Some(r));
            priority_matches || role_matches
        });
        if should_auto_forward {
            for tier1 in self.directory.agents_with_role_slugs(fleet_id, TIER1_FALLBACK_SLUGS).await {
                self.pubsub.publish(
                    &format!("fleet:{fleet_id}:agent:{}", tier1.agent_id),
                    "escalation_auto_forwarded",
                    serde_json::to_value(&escalation).unwrap_or(serde_json::Value::Null),
                );
            }
        }

        Ok(escalation.id)
    }

    async fn load(&self, fleet_id: &FleetId, id: &EscalationId) -> RingForgeResult<Escalation> {
        get_json(self.store.as_ref(), &escalation_key(fleet_id, id))
            .await?
            .ok_or_else(|| RingForgeError::Storage(StorageError::NotFound { key: escalation_key(fleet_id, id) }))
    }

    /// Transition an escalation to `handled` or `rejected`. Only the current
    /// handler may do so.
    pub async fn resolve(
        &self,
        fleet_id: &FleetId,
        id: &EscalationId,
        actor: &AgentId,
        status: EscalationStatus,
        response: Option<String>,
    ) -> Result<Escalation, RouterError> {
        let escalation = self
            .locks
            .with_lock(&escalation_key(fleet_id, id), || async {
                let mut escalation = self.load(fleet_id, id).await.map_err(|e| RouterError::StoreFailed { reason: e.to_string() })?;
                if escalation.status != EscalationStatus::Pending {
                    return Err(RouterError::denied("escalation is no longer pending", None));
                }
                if let Some(original_sender) = self.directory.get_agent(&escalation.from_agent).await {
                    let handlers = self.handler_ids(fleet_id, &original_sender).await;
                    if !handlers.contains(actor) {
                        return Err(RouterError::denied("not_authorized: only the current handler may resolve this escalation", None));
                    }
                }
                escalation.status = status;
                escalation.handler_agent = Some(actor.clone());
                escalation.response = response;
                escalation.handled_at = Some(now());
                put_json(self.store.as_ref(), &escalation_key(fleet_id, id), &escalation)
                    .await
                    .map_err(|e| RouterError::StoreFailed { reason: e.to_string() })?;
                Ok(escalation)
            })
            .await?;

        let kind = match status {
            EscalationStatus::Handled => NotificationKind::EscalationHandled,
            EscalationStatus::Rejected => NotificationKind::EscalationRejected,
            _ => NotificationKind::EscalationHandled,
        };
        self.pubsub.publish(
            &format!("fleet:{fleet_id}:agent:{}", escalation.from_agent),
            "escalation_resolved",
            serde_json::to_value(&escalation).unwrap_or(serde_json::Value::Null),
        );
        let _ = self
            .notifications
            .notify(fleet_id, &escalation.from_agent, kind, serde_json::json!({"escalation_id": id.to_string()}))
            .await;
        Ok(escalation)
    }

    /// `forward_escalation`: mark the original `forwarded` and create a new
    /// pending escalation addressed to the forwardee's role.
    pub async fn forward(
        &self,
        fleet_id: &FleetId,
        id: &EscalationId,
        actor: &AgentId,
        forwardee: &Agent,
    ) -> Result<EscalationId, RouterError> {
        let original = self
            .locks
            .with_lock(&escalation_key(fleet_id, id), || async {
                let mut escalation = self.load(fleet_id, id).await.map_err(|e| RouterError::StoreFailed { reason: e.to_string() })?;
                if escalation.status != EscalationStatus::Pending {
                    return Err(RouterError::denied("escalation is no longer pending", None));
                }
                if let Some(original_sender) = self.directory.get_agent(&escalation.from_agent).await {
                    let handlers = self.handler_ids(fleet_id, &original_sender).await;
                    if !handlers.contains(actor) {
                        return Err(RouterError::denied("not_authorized: only the current handler may forward this escalation", None));
                    }
                }
                escalation.status = EscalationStatus::Forwarded;
                escalation.handler_agent = Some(actor.clone());
                escalation.forwarded_to = Some(forwardee.agent_id.clone());
                escalation.handled_at = Some(now());
                put_json(self.store.as_ref(), &escalation_key(fleet_id, id), &escalation)
                    .await
                    .map_err(|e| RouterError::StoreFailed { reason: e.to_string() })?;
                Ok(escalation)
            })
            .await?;

        let new_id = EscalationId::generate();
        let forwarded = Escalation {
            id: new_id.clone(),
            fleet_id: *fleet_id,
            from_agent: original.from_agent.clone(),
            target_role: forwardee.role_slug.clone().unwrap_or_default(),
            subject: original.subject.clone(),
            body: original.body.clone(),
            priority: original.priority,
            context_refs: original.context_refs.clone(),
            status: EscalationStatus::Pending,
            handler_agent: None,
            forwarded_to: None,
            response: None,
            created_at: now(),
            handled_at: None,
        };
        put_json(self.store.as_ref(), &escalation_key(fleet_id, &new_id), &forwarded)
            .await
            .map_err(|e| RouterError::StoreFailed { reason: e.to_string() })?;
        self.append_index(fleet_id, &new_id).await.map_err(|e| RouterError::StoreFailed { reason: e.to_string() })?;

        self.pubsub.publish(
            &format!("fleet:{fleet_id}:agent:{}", forwardee.agent_id),
            "escalation_forwarded",
            serde_json::to_value(&forwarded).unwrap_or(serde_json::Value::Null),
        );
        let _ = self
            .notifications
            .notify(
                fleet_id,
                &forwardee.agent_id,
                NotificationKind::EscalationForwarded,
                serde_json::json!({"escalation_id": new_id.to_string()}),
            )
            .await;
        Ok(new_id)
    }
}

fn priority_str(priority: Priority) -> &'static str {
    match priority {
        Priority::Low => "low",
        Priority::Normal => "normal",
        Priority::High => "high",
        Priority::Critical => "critical",
    }
}

#[async_trait]
impl EscalationDeliverer for Escalations {
    async fn escalate(
        &self,
        fleet_id: &FleetId,
        from: &Agent,
        target_role: &str,
        subject: String,
        body: String,
        priority: Priority,
        context_refs: Vec<String>,
    ) -> Result<EscalationId, RouterError> {
        self.create(fleet_id, from, target_role, subject, body, priority, context_refs).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ringforge_core::EntityIdType;
    use crate::registry::AgentRegistry;
    use ringforge_core::ContextTier;
    use ringforge_storage::InMemoryKvStore;

    fn agent(id: &str, fleet_id: FleetId, squad_id: Option<ringforge_core::SquadId>, slug: Option<&str>) -> Agent {
        Agent {
            agent_id: AgentId::new(id),
            fleet_id,
            squad_id,
            name: id.to_string(),
            display_name: id.to_string(),
            role_template_id: None,
            role_slug: slug.map(|s| s.to_string()),
            context_tier: ContextTier::Tier0,
            metadata: serde_json::Map::new(),
        }
    }

    #[tokio::test]
    async fn squad_leader_is_sole_handler_then_forward_creates_a_new_pending_escalation() {
        let store = InMemoryKvStore::new();
        let pubsub = Arc::new(PubSub::default());
        let registry = AgentRegistry::new();
        let notifications = Arc::new(Notifications::new(store.clone(), pubsub.clone()));
        let escalations = Escalations::new(store.clone(), pubsub.clone(), registry.clone(), notifications);

        let fleet = FleetId::new_v4();
        let squad = ringforge_core::SquadId::new_v4();
        let sender = agent("ag_a", fleet, Some(squad), Some("backend-dev"));
        let leader = agent("ag_l", fleet, Some(squad), Some("squad-leader"));
        let tech_lead = agent("ag_tl", fleet, None, Some("tech-lead"));
        registry.upsert(sender.clone());
        registry.upsert(leader.clone());
        registry.upsert(tech_lead.clone());

        let id = escalations
            .escalate(&fleet, &sender, "tech-lead", "need help".to_string(), "body".to_string(), Priority::High, vec![])
            .await
            .unwrap();

        let new_id = escalations.forward(&fleet, &id, &leader.agent_id, &tech_lead).await.unwrap();

        let original = escalations.load(&fleet, &id).await.unwrap();
        assert_eq!(original.status, EscalationStatus::Forwarded);
        assert_eq!(original.forwarded_to, Some(tech_lead.agent_id.clone()));

        let forwarded = escalations.load(&fleet, &new_id).await.unwrap();
        assert_eq!(forwarded.status, EscalationStatus::Pending);

        let idx: Vec<String> = get_json(store.as_ref(), &index_key(&fleet)).await.unwrap().unwrap();
        assert!(idx.contains(&new_id.to_string()));
    }
}
