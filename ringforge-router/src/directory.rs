//! Abstractions the Router needs from agent/squad storage, kept trait-based
//! so `ringforge-router` has no dependency on `ringforge-messaging` (which
//! in turn depends on `ringforge-router` for tiers and access control).

use async_trait::async_trait;
use ringforge_core::{Agent, FleetId, SquadId};

/// Read access to agents, squads, and roles. Implemented by
/// `ringforge-messaging`'s in-memory agent registry.
#[async_trait]
pub trait AgentDirectory: Send + Sync {
    /// Look up an agent by its globally-unique external id, regardless of
    /// fleet - the Router validates fleet membership itself afterward so it
    /// can produce the precise `not_in_this_fleet` diagnostic.
    async fn get_agent(&self, agent_id: &ringforge_core::AgentId) -> Option<Agent>;

    /// The agent with role slug `squad-leader` in `squad_id`, if any.
    async fn squad_leader(&self, fleet_id: &FleetId, squad_id: &SquadId) -> Option<Agent>;

    async fn agents_in_squad(&self, fleet_id: &FleetId, squad_id: &SquadId) -> Vec<Agent>;

    async fn agents_in_fleet(&self, fleet_id: &FleetId) -> Vec<Agent>;

    async fn agents_with_role_slugs(&self, fleet_id: &FleetId, slugs: &[&str]) -> Vec<Agent>;
}

/// Read access to an agent's currently in-progress tasks, used by the
/// Transform stage to attach active-task context - spec.md §4.2 step 7.
pub trait ActiveTaskLookup: Send + Sync {
    fn active_task_summary(&self, agent_id: &ringforge_core::AgentId) -> Option<serde_json::Value>;
}

/// No-op implementation for hubs that don't wire in the task store.
pub struct NoActiveTasks;

impl ActiveTaskLookup for NoActiveTasks {
    fn active_task_summary(&self, _agent_id: &ringforge_core::AgentId) -> Option<serde_json::Value> {
        None
    }
}
