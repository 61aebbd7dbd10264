//! Redis-backed `TaskStore` for multi-node deployments, against the literal
//! key schema of spec.md §4.11:
//!
//! - `rf:task:{task_id}` - the task document (JSON)
//! - `rf:tasks:pending:{fleet_id}` - a priority-ordered list of pending task ids
//! - `rf:tasks:active` - a set of assigned/running task ids
//! - `rf:tasks:agent:{agent_id}` - a set of task ids assigned to an agent
//! - `rf:tasks:daily:{YYYY-MM-DD}` - a counter of tasks created that day

use crate::store::{NewTask, TaskStore};
use async_trait::async_trait;
use redis::{AsyncCommands, Client};
use ringforge_core::{
    now, now_ms, AgentId, FleetId, RingForgeError, RingForgeResult, StorageError, Task, TaskError, TaskId, TaskStatus,
    MAX_TASK_TTL_MS,
};
use serde_json::Value;

fn task_key(task_id: &TaskId) -> String {
    format!("rf:task:{task_id}")
}

fn pending_key(fleet_id: &FleetId) -> String {
    format!("rf:tasks:pending:{fleet_id}")
}

const ACTIVE_KEY: &str = "rf:tasks:active";

fn agent_key(agent_id: &AgentId) -> String {
    format!("rf:tasks:agent:{agent_id}")
}

fn daily_key() -> String {
    format!("rf:tasks:daily:{}", now().format("%Y-%m-%d"))
}

pub struct RedisTaskStore {
    client: Client,
}

impl RedisTaskStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn open(url: &str) -> RingForgeResult<Self> {
        let client = Client::open(url)
            .map_err(|e| RingForgeError::Storage(StorageError::WriteFailed { key: url.to_string(), reason: e.to_string() }))?;
        Ok(Self::new(client))
    }

    async fn conn(&self) -> RingForgeResult<redis::aio::MultiplexedConnection> {
        self.client.get_multiplexed_async_connection().await.map_err(redis_err)
    }

    async fn load(&self, conn: &mut redis::aio::MultiplexedConnection, task_id: &TaskId) -> RingForgeResult<Task> {
        let raw: Option<String> = conn.get(task_key(task_id)).await.map_err(redis_err)?;
        let raw = raw.ok_or_else(|| RingForgeError::Task(TaskError::NotFound { task_id: task_id.to_string() }))?;
        serde_json::from_str(&raw)
            .map_err(|e| RingForgeError::Storage(StorageError::Serialization { reason: e.to_string() }))
    }

    async fn save(&self, conn: &mut redis::aio::MultiplexedConnection, task: &Task) -> RingForgeResult<()> {
        let raw = serde_json::to_string(task)
            .map_err(|e| RingForgeError::Storage(StorageError::Serialization { reason: e.to_string() }))?;
        let () = conn.set(task_key(&task.task_id), raw).await.map_err(redis_err)?;
        Ok(())
    }

    /// `assign` needs to win exactly one of two racing callers. Redis gives
    /// us that via optimistic locking: WATCH the task key, re-read inside
    /// the transaction, and let the MULTI/EXEC fail (retried once as a
    /// losing `InvalidStatus`) if another client wrote first.
    async fn compare_and_transition(
        &self,
        task_id: &TaskId,
        next: TaskStatus,
        mutate: impl FnOnce(&mut Task) + Send,
    ) -> RingForgeResult<Task> {
        let mut conn = self.conn().await?;
        let key = task_key(task_id);

        loop {
            let _: () = redis::cmd("WATCH").arg(&key).query_async(&mut conn).await.map_err(redis_err)?;

            let mut task = match self.load(&mut conn, task_id).await {
                Ok(t) => t,
                Err(e) => {
                    let _: () = redis::cmd("UNWATCH").query_async(&mut conn).await.unwrap_or(());
                    return Err(e);
                }
            };

            if !task.status.can_transition_to(next) {
                let _: () = redis::cmd("UNWATCH").query_async(&mut conn).await.unwrap_or(());
                return Err(RingForgeError::Task(TaskError::InvalidStatus {
                    current: format!("{:?}", task.status).to_lowercase(),
                    attempted: format!("{next:?}").to_lowercase(),
                }));
            }

            task.status = next;
            mutate(&mut task);
            let raw = serde_json::to_string(&task)
                .map_err(|e| RingForgeError::Storage(StorageError::Serialization { reason: e.to_string() }))?;

            let mut pipe = redis::pipe();
            pipe.atomic().set(&key, raw);
            self.apply_index_commands(&mut pipe, &task);

            let result: Option<()> = pipe.query_async(&mut conn).await.map_err(redis_err)?;

            match result {
                Some(()) => return Ok(task),
                None => continue, // another writer raced us; retry the whole read-modify-write
            }
        }
    }

    fn apply_index_commands(&self, pipe: &mut redis::Pipeline, task: &Task) {
        match task.status {
            TaskStatus::Assigned | TaskStatus::Running => {
                pipe.sadd(ACTIVE_KEY, task.task_id.to_string());
                if let Some(agent_id) = &task.assigned_to {
                    pipe.sadd(agent_key(agent_id), task.task_id.to_string());
                }
            }
            _ => {
                pipe.srem(ACTIVE_KEY, task.task_id.to_string());
                if let Some(agent_id) = &task.assigned_to {
                    pipe.srem(agent_key(agent_id), task.task_id.to_string());
                }
            }
        }
        if task.status != TaskStatus::Pending {
            pipe.lrem(pending_key(&task.fleet_id), 0, task.task_id.to_string());
        }
    }
}

#[async_trait]
impl TaskStore for RedisTaskStore {
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

        let mut conn = self.conn().await?;
        self.save(&mut conn, &task).await?;

        // High priority pushes to the front, normal/low to the back; this
        // keeps the list roughly rank-ordered without a full resort per insert.
        let key = pending_key(&task.fleet_id);
        if task.priority.rank() == 0 {
            let _: () = conn.lpush(&key, task.task_id.to_string()).await.map_err(redis_err)?;
        } else {
            let _: () = conn.rpush(&key, task.task_id.to_string()).await.map_err(redis_err)?;
        }
        let _: () = conn.incr(daily_key(), 1).await.map_err(redis_err)?;
        Ok(task)
    }

    async fn get(&self, task_id: &TaskId) -> RingForgeResult<Option<Task>> {
        let mut conn = self.conn().await?;
        match self.load(&mut conn, task_id).await {
            Ok(task) => Ok(Some(task)),
            Err(RingForgeError::Task(TaskError::NotFound { .. })) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn assign(&self, task_id: &TaskId, agent_id: &AgentId) -> RingForgeResult<Task> {
        let agent_id = agent_id.clone();
        self.compare_and_transition(task_id, TaskStatus::Assigned, move |task| {
            task.assigned_to = Some(agent_id);
            task.assigned_at = Some(now());
        })
        .await
    }

    async fn start(&self, task_id: &TaskId) -> RingForgeResult<Task> {
        self.compare_and_transition(task_id, TaskStatus::Running, |_| {}).await
    }

    async fn complete(&self, task_id: &TaskId, result: Value) -> RingForgeResult<Task> {
        self.compare_and_transition(task_id, TaskStatus::Completed, move |task| {
            task.result = Some(result);
            task.completed_at = Some(now());
        })
        .await
    }

    async fn fail(&self, task_id: &TaskId, error: String) -> RingForgeResult<Task> {
        let mut conn = self.conn().await?;
        let task = self.load(&mut conn, task_id).await?;
        if task.status.is_terminal() {
            return Ok(task);
        }
        self.compare_and_transition(task_id, TaskStatus::Failed, move |task| {
            task.error = Some(error);
            task.completed_at = Some(now());
        })
        .await
    }

    async fn timeout(&self, task_id: &TaskId) -> RingForgeResult<Task> {
        let mut conn = self.conn().await?;
        let task = self.load(&mut conn, task_id).await?;
        if task.status.is_terminal() {
            return Ok(task);
        }
        self.compare_and_transition(task_id, TaskStatus::Timeout, |task| {
            task.completed_at = Some(now());
        })
        .await
    }

    async fn pending_for_fleet(&self, fleet_id: &FleetId) -> RingForgeResult<Vec<TaskId>> {
        let mut conn = self.conn().await?;
        let ids: Vec<String> = conn.lrange(pending_key(fleet_id), 0, -1).await.map_err(redis_err)?;
        Ok(ids.into_iter().map(TaskId::from_raw).collect())
    }

    async fn active_tasks(&self) -> RingForgeResult<Vec<TaskId>> {
        let mut conn = self.conn().await?;
        let ids: Vec<String> = conn.smembers(ACTIVE_KEY).await.map_err(redis_err)?;
        Ok(ids.into_iter().map(TaskId::from_raw).collect())
    }

    async fn cleanup_expired(&self) -> RingForgeResult<Vec<TaskId>> {
        let mut conn = self.conn().await?;
        let active_ids: Vec<String> = conn.smembers(ACTIVE_KEY).await.map_err(redis_err)?;
        let mut expired = Vec::new();
        let now_ms_val = now_ms();
        for raw_id in active_ids {
            let task_id = TaskId::from_raw(raw_id);
            if let Ok(task) = self.load(&mut conn, &task_id).await {
                if task.status.is_terminal() {
                    continue;
                }
                let age_ms = now_ms_val - task.created_at.timestamp_millis();
                if age_ms > task.ttl_ms {
                    expired.push(task_id);
                }
            }
        }
        for task_id in &expired {
            self.timeout(task_id).await?;
        }
        Ok(expired)
    }

    async fn tasks_today(&self) -> RingForgeResult<u64> {
        let mut conn = self.conn().await?;
        let count: Option<u64> = conn.get(daily_key()).await.map_err(redis_err)?;
        Ok(count.unwrap_or(0))
    }
}

fn redis_err(e: redis::RedisError) -> RingForgeError {
    RingForgeError::Storage(StorageError::WriteFailed { key: "redis".to_string(), reason: e.to_string() })
}
