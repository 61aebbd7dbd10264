//! Per-agent outbound frame queues, keyed by connection - a registry
//! addressable by agent id, so admin pushes (`system:drain`, targeted
//! notifications) can reach one specific live connection.

use crate::frame::Frame;
use dashmap::DashMap;
use ringforge_core::AgentId;
use std::sync::Arc;
use tokio::sync::mpsc;

pub type OutboundSender = mpsc::UnboundedSender<Frame>;

/// Live connections, indexed by agent id. An agent may hold at most one
/// registered connection at a time; a fresh join replaces the old sender,
/// which causes the previous socket's send loop to observe a closed channel
/// and exit.
#[derive(Default)]
pub struct ConnectionRegistry {
    by_agent: DashMap<AgentId, OutboundSender>,
}

impl ConnectionRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn register(&self, agent_id: AgentId, sender: OutboundSender) {
        self.by_agent.insert(agent_id, sender);
    }

    pub fn unregister(&self, agent_id: &AgentId) {
        self.by_agent.remove(agent_id);
    }

    pub fn push(&self, agent_id: &AgentId, frame: Frame) -> bool {
        match self.by_agent.get(agent_id) {
            Some(tx) => tx.send(frame).is_ok(),
            None => false,
        }
    }

    pub fn is_connected(&self, agent_id: &AgentId) -> bool {
        self.by_agent.contains_key(agent_id)
    }

    pub fn connected_count(&self) -> usize {
        self.by_agent.len()
    }

    /// Push `frame` to every connected agent - used for `system:drain`.
    pub fn broadcast_all(&self, frame: Frame) {
        for entry in self.by_agent.iter() {
            let _ = entry.value().send(frame.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    #[test]
    fn push_to_an_unregistered_agent_returns_false() {
        let registry = ConnectionRegistry::default();
        let frame = Frame::new("fleet:f1", "presence:update", Map::new());
        assert!(!registry.push(&AgentId::new("ag_ghost"), frame));
    }

    #[tokio::test]
    async fn registering_replaces_the_previous_sender() {
        let registry = ConnectionRegistry::default();
        let agent = AgentId::new("ag_a");
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        registry.register(agent.clone(), tx1);
        registry.register(agent.clone(), tx2);
        drop(rx1.try_recv());

        let frame = Frame::new("phoenix", "heartbeat", Map::new());
        assert!(registry.push(&agent, frame));
        assert!(rx2.try_recv().is_ok());
    }
}
