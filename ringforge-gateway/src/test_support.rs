//! Shared test fixtures - `HubConfig::for_tests` is `ringforge-core`'s own
//! `#[cfg(test)]` helper and isn't visible to downstream crates, so the
//! gateway's tests build an equivalent config here instead.
#![cfg(test)]

use ringforge_core::{ClusterStrategy, HubConfig, TaskStoreBackend};

pub fn test_config() -> HubConfig {
    HubConfig {
        cluster_strategy: ClusterStrategy::None,
        redis_url: None,
        task_store: TaskStoreBackend::Ets,
        database_url: None,
        secret_key_base: "test-secret-key-base".to_string(),
        port: 4000,
        hub_region: "test".to_string(),
        router_deadline_ms: 10_000,
        rate_limit_janitor_interval_secs: 300,
        rate_limit_max_window_secs: 3600,
        notification_cap: 100,
        heartbeat_timeout_secs: 60,
    }
}
