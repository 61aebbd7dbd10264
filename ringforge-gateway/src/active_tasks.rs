//! Per-node cache of each agent's current active-task summary, feeding the
//! Router's Transform stage (spec.md §4.2 step 7 / §4.11's task-context
//! attachment). `TaskStore` methods are async and may hit Redis; the
//! Transform stage that consults `ActiveTaskLookup` is synchronous, so the
//! gateway keeps this small local cache in sync at `assign`/`start`/
//! terminal-transition time instead of querying the store inline.

use dashmap::DashMap;
use ringforge_core::AgentId;
use ringforge_router::ActiveTaskLookup;
use serde_json::Value;
use std::sync::Arc;

#[derive(Default)]
pub struct ActiveTaskCache {
    by_agent: DashMap<AgentId, Value>,
}

impl ActiveTaskCache {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set(&self, agent_id: AgentId, summary: Value) {
        self.by_agent.insert(agent_id, summary);
    }

    pub fn clear(&self, agent_id: &AgentId) {
        self.by_agent.remove(agent_id);
    }
}

impl ActiveTaskLookup for ActiveTaskCache {
    fn active_task_summary(&self, agent_id: &AgentId) -> Option<Value> {
        self.by_agent.get(agent_id).map(|v| v.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_clear_round_trips() {
        let cache = ActiveTaskCache::default();
        let agent = AgentId::new("ag_a");
        cache.set(agent.clone(), serde_json::json!({"task_id": "t1"}));
        assert!(cache.active_task_summary(&agent).is_some());
        cache.clear(&agent);
        assert!(cache.active_task_summary(&agent).is_none());
    }
}
