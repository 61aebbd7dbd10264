//! `dashmap`-backed single-node `TaskStore`, mirroring the Redis key schema
//! of spec.md §4.11 as in-process indexes.

use crate::store::{NewTask, TaskStore};
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use parking_lot::Mutex;
use ringforge_core::{
    now, AgentId, FleetId, RingForgeError, RingForgeResult, Task, TaskError, TaskId, TaskPriority, TaskStatus, MAX_TASK_TTL_MS,
};
use serde_json::Value;
use std::sync::Arc;

#[derive(Default)]
pub struct InMemoryTaskStore {
    tasks: DashMap<TaskId, Task>,
    pending: DashMap<FleetId, Vec<TaskId>>,
    active: DashSet<TaskId>,
    by_agent: DashMap<AgentId, DashSet<TaskId>>,
    daily: DashMap<String, u64>,
    // Per-task lock so a concurrent `assign` race resolves deterministically:
    // the first caller to acquire it sees `pending` and wins.
    task_locks: DashMap<TaskId, Arc<Mutex<()>>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock_for(&self, task_id: &TaskId) -> Arc<Mutex<()>> {
        self.task_locks.entry(task_id.clone()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    fn require(&self, task_id: &TaskId) -> RingForgeResult<Task> {
        self.tasks
            .get(task_id)
            .map(|t| t.clone())
            .ok_or_else(|| RingForgeError::Task(TaskError::NotFound { task_id: task_id.to_string() }))
    }

    fn transition(&self, task_id: &TaskId, next: TaskStatus, mutate: impl FnOnce(&mut Task)) -> RingForgeResult<Task> {
        let lock = self.lock_for(task_id);
        let _guard = lock.lock();
        let mut task = self.require(task_id)?;
        if !task.status.can_transition_to(next) {
            return Err(RingForgeError::Task(TaskError::InvalidStatus {
                current: format!("{:?}", task.status).to_lowercase(),
                attempted: format!("{next:?}").to_lowercase(),
            }));
        }
        task.status = next;
        mutate(&mut task);
        self.tasks.insert(task_id.clone(), task.clone());
        self.sync_indexes(&task);
        Ok(task)
    }

    fn sync_indexes(&self, task: &Task) {
        match task.status {
            TaskStatus::Assigned | TaskStatus::Running => {
                self.active.insert(task.task_id.clone());
                if let Some(agent_id) = &task.assigned_to {
                    self.by_agent.entry(agent_id.clone()).or_default().insert(task.task_id.clone());
                }
            }
            _ => {
                self.active.remove(&task.task_id);
            }
        }
        if task.status.is_terminal() {
            if let Some(agent_id) = &task.assigned_to {
                if let Some(set) = self.by_agent.get(agent_id) {
                    set.remove(&task.task_id);
                }
            }
        }
        if let Some(mut pending) = self.pending.get_mut(&task.fleet_id) {
            if task.status != TaskStatus::Pending {
                pending.retain(|id| id != &task.task_id);
            }
        }
    }

    fn day_key(&self) -> String {
        now().format("%Y-%m-%d").to_string()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn create(&self, attrs: NewTask) -> RingForgeResult<Task> {
        if attrs.ttl_ms > MAX_TASK_TTL_MS {
            return Err(RingForgeError::Task(TaskError::TtlTooLarge { max_ms: MAX_TASK_TTL_MS, got_ms: attrs.ttl_ms }));
        }
        let task = Task {
            task_id: TaskId::generate(),
            fleet_id: attrs.fleet_id,
            requester_id: attrs.requester_id,
            task_type: attrs.task_type,
            prompt: attrs.prompt,
            capabilities_required: attrs.capabilities_required,
            assigned_to: None,
            status: TaskStatus::Pending,
            result: None,
            error: None,
            priority: attrs.priority,
            ttl_ms: attrs.ttl_ms,
            created_at: now(),
            assigned_at: None,
            completed_at: None,
            correlation_id: attrs.correlation_id,
        };
        self.tasks.insert(task.task_id.clone(), task.clone());

        let mut pending = self.pending.entry(task.fleet_id).or_default();
        let insert_at = pending.iter().position(|id| {
            self.tasks.get(id).map(|t| t.priority.rank()).unwrap_or(TaskPriority::Low.rank()) > task.priority.rank()
        });
        match insert_at {
            Some(idx) => pending.insert(idx, task.task_id.clone()),
            None => pending.push(task.task_id.clone()),
        }
        drop(pending);

        *self.daily.entry(self.day_key()).or_insert(0) += 1;
        Ok(task)
    }

    async fn get(&self, task_id: &TaskId) -> RingForgeResult<Option<Task>> {
        Ok(self.tasks.get(task_id).map(|t| t.clone()))
    }

    async fn assign(&self, task_id: &TaskId, agent_id: &AgentId) -> RingForgeResult<Task> {
        self.transition(task_id, TaskStatus::Assigned, |task| {
            task.assigned_to = Some(agent_id.clone());
            task.assigned_at = Some(now());
        })
    }

    async fn start(&self, task_id: &TaskId) -> RingForgeResult<Task> {
        self.transition(task_id, TaskStatus::Running, |_| {})
    }

    async fn complete(&self, task_id: &TaskId, result: Value) -> RingForgeResult<Task> {
        self.transition(task_id, TaskStatus::Completed, |task| {
            task.result = Some(result);
            task.completed_at = Some(now());
        })
    }

    async fn fail(&self, task_id: &TaskId, error: String) -> RingForgeResult<Task> {
        let lock = self.lock_for(task_id);
        let _guard = lock.lock();
        let mut task = self.require(task_id)?;
        if task.status.is_terminal() {
            return Ok(task);
        }
        if !task.status.can_transition_to(TaskStatus::Failed) {
            return Err(RingForgeError::Task(TaskError::InvalidStatus {
                current: format!("{:?}", task.status).to_lowercase(),
                attempted: "failed".to_string(),
            }));
        }
        task.status = TaskStatus::Failed;
        task.error = Some(error);
        task.completed_at = Some(now());
        self.tasks.insert(task_id.clone(), task.clone());
        self.sync_indexes(&task);
        Ok(task)
    }

    async fn timeout(&self, task_id: &TaskId) -> RingForgeResult<Task> {
        let lock = self.lock_for(task_id);
        let _guard = lock.lock();
        let mut task = self.require(task_id)?;
        if task.status.is_terminal() {
            return Ok(task);
        }
        task.status = TaskStatus::Timeout;
        task.completed_at = Some(now());
        self.tasks.insert(task_id.clone(), task.clone());
        self.sync_indexes(&task);
        Ok(task)
    }

    async fn pending_for_fleet(&self, fleet_id: &FleetId) -> RingForgeResult<Vec<TaskId>> {
        Ok(self.pending.get(fleet_id).map(|p| p.clone()).unwrap_or_default())
    }

    async fn active_tasks(&self) -> RingForgeResult<Vec<TaskId>> {
        Ok(self.active.iter().map(|id| id.clone()).collect())
    }

    async fn cleanup_expired(&self) -> RingForgeResult<Vec<TaskId>> {
        let now_ms = ringforge_core::now_ms();
        let mut expired = Vec::new();
        for entry in self.tasks.iter() {
            let task = entry.value();
            if task.status.is_terminal() {
                continue;
            }
            let age_ms = now_ms - task.created_at.timestamp_millis();
            if age_ms > task.ttl_ms {
                expired.push(task.task_id.clone());
            }
        }
        for task_id in &expired {
            self.timeout(task_id).await?;
        }
        Ok(expired)
    }

    async fn tasks_today(&self) -> RingForgeResult<u64> {
        Ok(self.daily.get(&self.day_key()).map(|c| *c).unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ringforge_core::EntityIdType;

    fn new_task(fleet_id: FleetId, priority: TaskPriority) -> NewTask {
        NewTask {
            fleet_id,
            requester_id: AgentId::new("ag_a"),
            task_type: "codegen".to_string(),
            prompt: "do it".to_string(),
            capabilities_required: vec![],
            priority,
            ttl_ms: 60_000,
            correlation_id: None,
        }
    }

    #[tokio::test]
    async fn concurrent_assign_resolves_first_caller_wins() {
        let store = InMemoryTaskStore::new();
        let fleet = FleetId::new_v4();
        let task = store.create(new_task(fleet, TaskPriority::Normal)).await.unwrap();

        let first = store.assign(&task.task_id, &AgentId::new("ag_1")).await;
        let second = store.assign(&task.task_id, &AgentId::new("ag_2")).await;

        assert!(first.is_ok());
        match second {
            Err(RingForgeError::Task(TaskError::InvalidStatus { current, .. })) => assert_eq!(current, "assigned"),
            other => panic!("expected invalid_status, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn pending_queue_orders_by_priority_rank() {
        let store = InMemoryTaskStore::new();
        let fleet = FleetId::new_v4();
        let low = store.create(new_task(fleet, TaskPriority::Low)).await.unwrap();
        let high = store.create(new_task(fleet, TaskPriority::High)).await.unwrap();
        let normal = store.create(new_task(fleet, TaskPriority::Normal)).await.unwrap();

        let pending = store.pending_for_fleet(&fleet).await.unwrap();
        assert_eq!(pending, vec![high.task_id, normal.task_id, low.task_id]);
    }

    #[tokio::test]
    async fn timeout_is_idempotent_on_a_terminal_task() {
        let store = InMemoryTaskStore::new();
        let fleet = FleetId::new_v4();
        let task = store.create(new_task(fleet, TaskPriority::Normal)).await.unwrap();
        store.assign(&task.task_id, &AgentId::new("ag_1")).await.unwrap();
        store.start(&task.task_id).await.unwrap();
        let completed = store.complete(&task.task_id, Value::Null).await.unwrap();

        let after_timeout = store.timeout(&task.task_id).await.unwrap();
        assert_eq!(after_timeout.status, completed.status);
    }

    #[tokio::test]
    async fn ttl_above_the_cap_is_rejected() {
        let store = InMemoryTaskStore::new();
        let fleet = FleetId::new_v4();
        let mut attrs = new_task(fleet, TaskPriority::Normal);
        attrs.ttl_ms = MAX_TASK_TTL_MS + 1;
        let err = store.create(attrs).await.unwrap_err();
        assert!(matches!(err, RingForgeError::Task(TaskError::TtlTooLarge { .. })));
    }
}
