//! Persistent conversations - spec.md §4.7.

use crate::notifications::Notifications;
use ringforge_core::{
    now, AgentId, FleetId, MessageId, NotificationKind, RingForgeError, RingForgeResult, StorageError, TaskId, Thread, ThreadId,
    ThreadMessage, ThreadScope, ThreadStatus,
};
use ringforge_storage::{get_json, list_prefix_tail, put_json, KeyLocks, KvStore, PubSub};
use serde_json::{Map, Value};
use std::sync::Arc;

fn thread_key(thread_id: &ThreadId) -> String {
    format!("thr:{thread_id}")
}

fn message_key(thread_id: &ThreadId, timestamp_ms: i64, message_id: &MessageId) -> String {
    format!("thr_msg:{thread_id}:{timestamp_ms:020}:{message_id}")
}

/// Attributes needed to create a thread - mirrors the wire payload the
/// channel gateway's `thread:create` event carries.
pub struct NewThread {
    pub fleet_id: FleetId,
    pub tenant_id: ringforge_core::TenantId,
    pub scope: ThreadScope,
    pub subject: String,
    pub participant_ids: Vec<AgentId>,
    pub task_id: Option<TaskId>,
    pub created_by: AgentId,
}

pub struct Threads {
    store: Arc<dyn KvStore>,
    pubsub: Arc<PubSub>,
    locks: KeyLocks,
    notifications: Arc<Notifications>,
}

impl Threads {
    pub fn new(store: Arc<dyn KvStore>, pubsub: Arc<PubSub>, notifications: Arc<Notifications>) -> Self {
        Self { store, pubsub, locks: KeyLocks::new(), notifications }
    }

    pub async fn create_thread(&self, attrs: NewThread) -> RingForgeResult<Thread> {
        let mut participant_ids: std::collections::HashSet<AgentId> = attrs.participant_ids.into_iter().collect();
        participant_ids.insert(attrs.created_by.clone());

        let thread = Thread {
            thread_id: ThreadId::generate(),
            fleet_id: attrs.fleet_id,
            tenant_id: attrs.tenant_id,
            scope: attrs.scope,
            subject: attrs.subject,
            status: ThreadStatus::Open,
            participant_ids,
            task_id: attrs.task_id,
            message_count: 0,
            last_message_at: None,
            created_by: attrs.created_by,
            closed_by: None,
            close_reason: None,
            created_at: now(),
            closed_at: None,
        };
        put_json(self.store.as_ref(), &thread_key(&thread.thread_id), &thread).await?;
        Ok(thread)
    }

    async fn load(&self, thread_id: &ThreadId) -> RingForgeResult<Thread> {
        get_json(self.store.as_ref(), &thread_key(thread_id))
            .await?
            .ok_or_else(|| RingForgeError::Storage(StorageError::NotFound { key: thread_key(thread_id) }))
    }

    /// `add_message(thread_id, agent_id, {body, refs, metadata})` - spec.md §4.7.
    pub async fn add_message(
        &self,
        thread_id: &ThreadId,
        agent_id: &AgentId,
        body: Value,
        refs: Vec<String>,
        metadata: Map<String, Value>,
    ) -> RingForgeResult<ThreadMessage> {
        let message_id = MessageId::generate();
        let timestamp = now();
        let message = ThreadMessage {
            thread_id: thread_id.clone(),
            message_id: message_id.clone(),
            agent_id: agent_id.clone(),
            body,
            refs,
            metadata,
            timestamp,
        };
        put_json(self.store.as_ref(), &message_key(thread_id, timestamp.timestamp_millis(), &message_id), &message).await?;

        self.locks
            .with_lock(&thread_key(thread_id), || async {
                let mut thread = self.load(thread_id).await?;
                thread.message_count += 1;
                thread.last_message_at = Some(timestamp);
                thread.participant_ids.insert(agent_id.clone());
                put_json(self.store.as_ref(), &thread_key(thread_id), &thread).await
            })
            .await?;

        self.pubsub.publish(
            &format!("thread:{thread_id}"),
            "thread_message",
            serde_json::to_value(&message).unwrap_or(Value::Null),
        );
        Ok(message)
    }

    /// `thread_messages(thread_id, {limit, before?})` - prefix scan,
    /// lexical sort, optional filter, last *limit*.
    pub async fn thread_messages(
        &self,
        thread_id: &ThreadId,
        limit: usize,
        before: Option<&str>,
    ) -> RingForgeResult<Vec<ThreadMessage>> {
        let prefix = format!("thr_msg:{thread_id}:");
        let entries = list_prefix_tail(self.store.as_ref(), &prefix, limit, before).await?;
        Ok(entries
            .into_iter()
            .filter_map(|(_, raw)| serde_json::from_str(&raw).ok())
            .collect())
    }

    pub async fn close_thread(&self, thread_id: &ThreadId, by: &AgentId, reason: Option<String>) -> RingForgeResult<Thread> {
        let thread = self
            .locks
            .with_lock(&thread_key(thread_id), || async {
                let mut thread = self.load(thread_id).await?;
                thread.status = ThreadStatus::Closed;
                thread.closed_by = Some(by.clone());
                thread.close_reason = reason;
                thread.closed_at = Some(now());
                put_json(self.store.as_ref(), &thread_key(thread_id), &thread).await?;
                Ok::<_, RingForgeError>(thread)
            })
            .await?;

        self.pubsub.publish(
            &format!("thread:{thread_id}"),
            "thread_closed",
            serde_json::to_value(&thread).unwrap_or(Value::Null),
        );

        for participant in &thread.participant_ids {
            let _ = self
                .notifications
                .notify(
                    &thread.fleet_id,
                    participant,
                    NotificationKind::ThreadClosed,
                    serde_json::json!({"thread_id": thread_id.to_string()}),
                )
                .await;
        }
        Ok(thread)
    }

    /// Close every open thread associated with `task_id` - called when a
    /// Kanban task transitions to done.
    pub async fn close_task_threads(&self, task_id: &TaskId, by: &AgentId) -> RingForgeResult<usize> {
        let prefix = "thr:".to_string();
        let entries = self.store.list_prefix(&prefix).await?;
        let mut closed = 0;
        for (_, raw) in entries {
            let Ok(thread) = serde_json::from_str::<Thread>(&raw) else { continue };
            if thread.task_id.as_ref() == Some(task_id) && thread.status == ThreadStatus::Open {
                self.close_thread(&thread.thread_id, by, Some("task completed".to_string())).await?;
                closed += 1;
            }
        }
        Ok(closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ringforge_core::EntityIdType;
    use ringforge_storage::InMemoryKvStore;

    fn threads() -> Threads {
        let store = InMemoryKvStore::new();
        let pubsub = Arc::new(PubSub::default());
        let notifications = Arc::new(Notifications::new(store.clone(), pubsub.clone()));
        Threads::new(store, pubsub, notifications)
    }

    #[tokio::test]
    async fn message_count_matches_successful_add_message_calls() {
        let threads = threads();
        let thread = threads
            .create_thread(NewThread {
                fleet_id: FleetId::new_v4(),
                tenant_id: ringforge_core::TenantId::new_v4(),
                scope: ThreadScope::Dm,
                subject: "hi".to_string(),
                participant_ids: vec![],
                task_id: None,
                created_by: AgentId::new("ag_a"),
            })
            .await
            .unwrap();

        for i in 0..5 {
            threads
                .add_message(&thread.thread_id, &AgentId::new("ag_a"), Value::String(format!("msg{i}")), vec![], Map::new())
                .await
                .unwrap();
        }

        let messages = threads.thread_messages(&thread.thread_id, usize::MAX, None).await.unwrap();
        assert_eq!(messages.len(), 5);
    }

    #[tokio::test]
    async fn close_thread_marks_closed_and_records_reason() {
        let threads = threads();
        let thread = threads
            .create_thread(NewThread {
                fleet_id: FleetId::new_v4(),
                tenant_id: ringforge_core::TenantId::new_v4(),
                scope: ThreadScope::Squad,
                subject: "s".to_string(),
                participant_ids: vec![],
                task_id: None,
                created_by: AgentId::new("ag_a"),
            })
            .await
            .unwrap();

        let closed = threads.close_thread(&thread.thread_id, &AgentId::new("ag_a"), Some("done".to_string())).await.unwrap();
        assert_eq!(closed.status, ThreadStatus::Closed);
        assert_eq!(closed.close_reason.as_deref(), Some("done"));
    }
}
