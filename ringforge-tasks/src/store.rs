//! `TaskStore` trait - spec.md §4.11.

use async_trait::async_trait;
use ringforge_core::{AgentId, FleetId, RingForgeResult, Task, TaskId, TaskPriority};
use serde_json::Value;

/// Attributes needed to create a task - mirrors the `task:create` wire
/// payload.
pub struct NewTask {
    pub fleet_id: FleetId,
    pub requester_id: AgentId,
    pub task_type: String,
    pub prompt: String,
    pub capabilities_required: Vec<String>,
    pub priority: TaskPriority,
    pub ttl_ms: i64,
    pub correlation_id: Option<String>,
}

/// Distributed dispatch work-unit store - spec.md §4.11. Selected at
/// startup by the `TASK_STORE` env var between an in-process map
/// (single-node) and Redis (multi-node).
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn create(&self, attrs: NewTask) -> RingForgeResult<Task>;

    async fn get(&self, task_id: &TaskId) -> RingForgeResult<Option<Task>>;

    /// Atomically transition `pending -> assigned`. Concurrent callers for
    /// the same task are resolved by the store: the first to see `pending`
    /// wins; later callers see `assigned` and get `InvalidStatus`.
    async fn assign(&self, task_id: &TaskId, agent_id: &AgentId) -> RingForgeResult<Task>;

    async fn start(&self, task_id: &TaskId) -> RingForgeResult<Task>;

    async fn complete(&self, task_id: &TaskId, result: Value) -> RingForgeResult<Task>;

    async fn fail(&self, task_id: &TaskId, error: String) -> RingForgeResult<Task>;

    /// Idempotent: re-invoking on an already-terminal task is a no-op that
    /// returns the task unchanged.
    async fn timeout(&self, task_id: &TaskId) -> RingForgeResult<Task>;

    /// Pending task ids for `fleet_id`, ordered by priority rank
    /// (high=0, normal=1, low=2), ties broken by creation order.
    async fn pending_for_fleet(&self, fleet_id: &FleetId) -> RingForgeResult<Vec<TaskId>>;

    /// Every task id currently `assigned` or `running`.
    async fn active_tasks(&self) -> RingForgeResult<Vec<TaskId>>;

    /// Transition every pending/assigned/running task whose TTL has elapsed
    /// to `timeout`. Returns the ids transitioned.
    async fn cleanup_expired(&self) -> RingForgeResult<Vec<TaskId>>;

    /// Count of tasks created today (UTC), for the `rf:tasks:daily:*` counter.
    async fn tasks_today(&self) -> RingForgeResult<u64>;
}
