//! Per-fleet connected-agent roster - spec.md §4.12's presence events and
//! the glossary's "in-memory index of currently connected agents".

use dashmap::DashMap;
use ringforge_core::{now, AgentId, FleetId, PresenceRecord, PresenceState};
use std::sync::Arc;

#[derive(Default)]
pub struct PresenceTracker {
    roster: DashMap<FleetId, DashMap<AgentId, PresenceRecord>>,
}

impl PresenceTracker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn join(&self, fleet_id: FleetId, agent_id: AgentId) {
        self.roster.entry(fleet_id).or_default().insert(
            agent_id.clone(),
            PresenceRecord { fleet_id, agent_id, state: PresenceState::Online, task: None, last_seen: now() },
        );
    }

    pub fn leave(&self, fleet_id: &FleetId, agent_id: &AgentId) {
        if let Some(fleet_roster) = self.roster.get(fleet_id) {
            fleet_roster.remove(agent_id);
        }
    }

    pub fn update(&self, fleet_id: FleetId, agent_id: AgentId, state: PresenceState, task: Option<String>) {
        self.roster
            .entry(fleet_id)
            .or_default()
            .insert(agent_id.clone(), PresenceRecord { fleet_id, agent_id, state, task, last_seen: now() });
    }

    pub fn is_online(&self, fleet_id: &FleetId, agent_id: &AgentId) -> bool {
        self.roster.get(fleet_id).is_some_and(|r| r.contains_key(agent_id))
    }

    pub fn roster(&self, fleet_id: &FleetId) -> Vec<PresenceRecord> {
        match self.roster.get(fleet_id) {
            None => Vec::new(),
            Some(r) => r.iter().map(|e| e.value().clone()).collect(),
        }
    }

    pub fn count(&self, fleet_id: &FleetId) -> usize {
        self.roster.get(fleet_id).map(|r| r.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ringforge_core::EntityIdType;

    #[test]
    fn join_then_leave_clears_presence() {
        let tracker = PresenceTracker::new();
        let fleet = FleetId::new_v4();
        let agent = AgentId::new("ag_a");
        tracker.join(fleet, agent.clone());
        assert!(tracker.is_online(&fleet, &agent));
        tracker.leave(&fleet, &agent);
        assert!(!tracker.is_online(&fleet, &agent));
    }

    #[test]
    fn roster_reflects_every_joined_agent() {
        let tracker = PresenceTracker::new();
        let fleet = FleetId::new_v4();
        tracker.join(fleet, AgentId::new("ag_a"));
        tracker.join(fleet, AgentId::new("ag_b"));
        assert_eq!(tracker.count(&fleet), 2);
    }
}
