//! Distributed dispatch work-unit store - spec.md §4.11.

pub mod in_memory;
pub mod redis_store;
pub mod store;

pub use in_memory::InMemoryTaskStore;
pub use redis_store::RedisTaskStore;
pub use store::{NewTask, TaskStore};

use ringforge_core::{ConfigError, RingForgeError, RingForgeResult, TaskStoreBackend};
use std::sync::Arc;

/// Build the configured `TaskStore` backend. `Ets` (in-process) is always
/// available; `Redis` requires a reachable `redis_url`.
pub async fn build_task_store(backend: TaskStoreBackend, redis_url: Option<&str>) -> RingForgeResult<Arc<dyn TaskStore>> {
    match backend {
        TaskStoreBackend::Ets => Ok(InMemoryTaskStore::new()),
        TaskStoreBackend::Redis => {
            let url = redis_url
                .ok_or_else(|| RingForgeError::Config(ConfigError::MissingRequired { field: "REDIS_URL".to_string() }))?;
            Ok(Arc::new(RedisTaskStore::open(url)?))
        }
    }
}
