//! In-process agent/squad registry, the concrete `AgentDirectory` the
//! Router consults. Agents register on first successful channel join -
//! spec.md §4.12.

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use ringforge_core::{Agent, AgentId, FleetId, SquadId};
use ringforge_router::AgentDirectory;
use std::sync::Arc;

/// Holds every agent the hub currently knows about, indexed for the
/// lookups the Router and messaging modules need.
#[derive(Default)]
pub struct AgentRegistry {
    agents: DashMap<AgentId, Agent>,
    by_fleet: DashMap<FleetId, DashSet<AgentId>>,
    by_squad: DashMap<(FleetId, SquadId), DashSet<AgentId>>,
}

impl AgentRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register or update an agent's profile - called on `phx_join`.
    pub fn upsert(&self, agent: Agent) {
        self.by_fleet.entry(agent.fleet_id).or_default().insert(agent.agent_id.clone());
        if let Some(squad_id) = agent.squad_id {
            self.by_squad.entry((agent.fleet_id, squad_id)).or_default().insert(agent.agent_id.clone());
        }
        self.agents.insert(agent.agent_id.clone(), agent);
    }

    pub fn get(&self, agent_id: &AgentId) -> Option<Agent> {
        self.agents.get(agent_id).map(|a| a.clone())
    }
}

#[async_trait]
impl AgentDirectory for AgentRegistry {
    async fn get_agent(&self, agent_id: &AgentId) -> Option<Agent> {
        self.get(agent_id)
    }

    async fn squad_leader(&self, fleet_id: &FleetId, squad_id: &SquadId) -> Option<Agent> {
        self.agents_in_squad(fleet_id, squad_id)
            .await
            .into_iter()
            .find(|a| a.role_slug.as_deref() == Some("squad-leader"))
    }

    async fn agents_in_squad(&self, fleet_id: &FleetId, squad_id: &SquadId) -> Vec<Agent> {
        match self.by_squad.get(&(*fleet_id, *squad_id)) {
            None => Vec::new(),
            Some(ids) => ids.iter().filter_map(|id| self.get(&id)).collect(),
        }
    }

    async fn agents_in_fleet(&self, fleet_id: &FleetId) -> Vec<Agent> {
        match self.by_fleet.get(fleet_id) {
            None => Vec::new(),
            Some(ids) => ids.iter().filter_map(|id| self.get(&id)).collect(),
        }
    }

    async fn agents_with_role_slugs(&self, fleet_id: &FleetId, slugs: &[&str]) -> Vec<Agent> {
        self.agents_in_fleet(fleet_id)
            .await
            .into_iter()
            .filter(|a| a.role_slug.as_deref().is_some_and(|s| slugs.contains(&s)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ringforge_core::EntityIdType;
    use ringforge_core::ContextTier;

    fn agent(id: &str, fleet_id: FleetId, squad_id: Option<SquadId>, slug: Option<&str>) -> Agent {
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
    async fn squad_leader_resolves_to_the_squad_leader_slug() {
        let registry = AgentRegistry::new();
        let fleet = FleetId::new_v4();
        let squad = SquadId::new_v4();
        registry.upsert(agent("ag_a", fleet, Some(squad), Some("backend-dev")));
        registry.upsert(agent("ag_l", fleet, Some(squad), Some("squad-leader")));

        let leader = registry.squad_leader(&fleet, &squad).await.unwrap();
        assert_eq!(leader.agent_id, AgentId::new("ag_l"));
    }

    #[tokio::test]
    async fn role_slug_lookup_is_fleet_scoped() {
        let registry = AgentRegistry::new();
        let f1 = FleetId::new_v4();
        let f2 = FleetId::new_v4();
        registry.upsert(agent("ag_tl1", f1, None, Some("tech-lead")));
        registry.upsert(agent("ag_tl2", f2, None, Some("tech-lead")));

        let found = registry.agents_with_role_slugs(&f1, &["tech-lead", "product-manager"]).await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].agent_id, AgentId::new("ag_tl1"));
    }
}
