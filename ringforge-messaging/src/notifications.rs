//! Per-agent notification inbox - spec.md §4.10.

use ringforge_core::{now, FleetId, Notification, NotificationId, NotificationKind, RingForgeResult};
use ringforge_storage::{get_json, put_json, KeyLocks, KvStore, PubSub, TopicEvent};
use serde_json::Value;
use std::sync::Arc;

pub const NOTIFICATION_CAP: usize = 100;

fn key(fleet_id: &FleetId, agent_id: &ringforge_core::AgentId) -> String {
    format!("ntf:{fleet_id}:{agent_id}")
}

pub struct Notifications {
    store: Arc<dyn KvStore>,
    pubsub: Arc<PubSub>,
    locks: KeyLocks,
}

impl Notifications {
    pub fn new(store: Arc<dyn KvStore>, pubsub: Arc<PubSub>) -> Self {
        Self { store, pubsub, locks: KeyLocks::new() }
    }

    /// Write a notification and publish it on the agent's topic. Prepended,
    /// capped at `NOTIFICATION_CAP` - newest first, oldest dropped past the
    /// cap.
    pub async fn notify(
        &self,
        fleet_id: &FleetId,
        agent_id: &ringforge_core::AgentId,
        kind: NotificationKind,
        payload: Value,
    ) -> RingForgeResult<Notification> {
        let notification = Notification { id: NotificationId::generate(), kind, payload, timestamp: now(), read: false };
        let k = key(fleet_id, agent_id);
        let stored = notification.clone();
        self.locks
            .with_lock(&k, || async {
                let mut list: Vec<Notification> = get_json(self.store.as_ref(), &k).await?.unwrap_or_default();
                list.insert(0, stored);
                list.truncate(NOTIFICATION_CAP);
                put_json(self.store.as_ref(), &k, &list).await
            })
            .await?;

        self.pubsub.publish(
            &format!("fleet:{fleet_id}:agent:{agent_id}"),
            "notification",
            serde_json::to_value(&notification).unwrap_or(Value::Null),
        );
        Ok(notification)
    }

    pub async fn list(&self, fleet_id: &FleetId, agent_id: &ringforge_core::AgentId) -> RingForgeResult<Vec<Notification>> {
        Ok(get_json(self.store.as_ref(), &key(fleet_id, agent_id)).await?.unwrap_or_default())
    }

    pub async fn unread_count(&self, fleet_id: &FleetId, agent_id: &ringforge_core::AgentId) -> RingForgeResult<usize> {
        Ok(self.list(fleet_id, agent_id).await?.iter().filter(|n| !n.read).count())
    }

    pub async fn mark_read(
        &self,
        fleet_id: &FleetId,
        agent_id: &ringforge_core::AgentId,
        notification_id: &NotificationId,
    ) -> RingForgeResult<()> {
        let k = key(fleet_id, agent_id);
        self.locks
            .with_lock(&k, || async {
                let mut list: Vec<Notification> = get_json(self.store.as_ref(), &k).await?.unwrap_or_default();
                if let Some(n) = list.iter_mut().find(|n| &n.id == notification_id) {
                    n.read = true;
                }
                put_json(self.store.as_ref(), &k, &list).await
            })
            .await
    }

    pub async fn mark_all_read(&self, fleet_id: &FleetId, agent_id: &ringforge_core::AgentId) -> RingForgeResult<()> {
        let k = key(fleet_id, agent_id);
        self.locks
            .with_lock(&k, || async {
                let mut list: Vec<Notification> = get_json(self.store.as_ref(), &k).await?.unwrap_or_default();
                for n in list.iter_mut() {
                    n.read = true;
                }
                put_json(self.store.as_ref(), &k, &list).await
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ringforge_core::EntityIdType;
    use ringforge_storage::InMemoryKvStore;

    fn setup() -> (Notifications, FleetId, ringforge_core::AgentId) {
        let notifications = Notifications::new(InMemoryKvStore::new(), Arc::new(PubSub::default()));
        (notifications, FleetId::new_v4(), ringforge_core::AgentId::new("ag_a"))
    }

    #[tokio::test]
    async fn notify_then_list_returns_newest_first() {
        let (n, fleet, agent) = setup();
        n.notify(&fleet, &agent, NotificationKind::DmReceived, Value::Null).await.unwrap();
        n.notify(&fleet, &agent, NotificationKind::Announcement, Value::Null).await.unwrap();
        let list = n.list(&fleet, &agent).await.unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].kind, NotificationKind::Announcement);
    }

    #[tokio::test]
    async fn list_is_capped_at_one_hundred() {
        let (n, fleet, agent) = setup();
        for _ in 0..110 {
            n.notify(&fleet, &agent, NotificationKind::DmReceived, Value::Null).await.unwrap();
        }
        assert_eq!(n.list(&fleet, &agent).await.unwrap().len(), NOTIFICATION_CAP);
    }

    #[tokio::test]
    async fn mark_read_flips_only_that_notification() {
        let (n, fleet, agent) = setup();
        let first = n.notify(&fleet, &agent, NotificationKind::DmReceived, Value::Null).await.unwrap();
        n.notify(&fleet, &agent, NotificationKind::Announcement, Value::Null).await.unwrap();
        n.mark_read(&fleet, &agent, &first.id).await.unwrap();
        assert_eq!(n.unread_count(&fleet, &agent).await.unwrap(), 1);
    }
}
