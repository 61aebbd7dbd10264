//! Hub configuration - spec.md §6 ("Environment / config options").

use crate::error::{ConfigError, RingForgeResult};
use serde::{Deserialize, Serialize};

/// Cluster membership strategy, set via `CLUSTER_STRATEGY`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterStrategy {
    None,
    Gossip,
    Dns,
    Epmd,
}

impl std::str::FromStr for ClusterStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(ClusterStrategy::None),
            "gossip" => Ok(ClusterStrategy::Gossip),
            "dns" => Ok(ClusterStrategy::Dns),
            "epmd" => Ok(ClusterStrategy::Epmd),
            other => Err(ConfigError::InvalidValue {
                field: "CLUSTER_STRATEGY".to_string(),
                reason: format!("unknown strategy '{other}'"),
            }),
        }
    }
}

/// Task-store backend selection, set via `TASK_STORE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStoreBackend {
    /// In-process map, single node.
    Ets,
    /// Redis-backed, multi-node.
    Redis,
}

impl std::str::FromStr for TaskStoreBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ets" => Ok(TaskStoreBackend::Ets),
            "redis" => Ok(TaskStoreBackend::Redis),
            other => Err(ConfigError::InvalidValue {
                field: "TASK_STORE".to_string(),
                reason: format!("unknown backend '{other}'"),
            }),
        }
    }
}

/// Master hub configuration. All values are required at construction; there
/// is no implicit fallback beyond what `HubConfig::from_env` documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HubConfig {
    pub cluster_strategy: ClusterStrategy,
    pub redis_url: Option<String>,
    pub task_store: TaskStoreBackend,
    pub database_url: Option<String>,
    pub secret_key_base: String,
    pub port: u16,
    pub hub_region: String,

    /// Router pipeline deadline - spec.md §5.
    pub router_deadline_ms: u64,
    /// Rate-limiter janitor interval - spec.md §4.4.
    pub rate_limit_janitor_interval_secs: u64,
    /// Longest rate-limit window tracked, used by the janitor's eviction
    /// cutoff - spec.md §4.4 ("the longest window (1 hour)").
    pub rate_limit_max_window_secs: u64,
    /// Notification inbox cap per agent - spec.md §4.10.
    pub notification_cap: usize,
    /// Heartbeat timeout before a gateway connection is considered dead -
    /// spec.md §4.12 ("absence > 60s as disconnect").
    pub heartbeat_timeout_secs: u64,
}

impl HubConfig {
    pub fn from_env() -> RingForgeResult<Self> {
        use std::env;

        let cluster_strategy = env::var("CLUSTER_STRATEGY")
            .unwrap_or_else(|_| "none".to_string())
            .parse()
            .map_err(crate::error::RingForgeError::Config)?;

        let task_store = env::var("TASK_STORE")
            .unwrap_or_else(|_| "ets".to_string())
            .parse()
            .map_err(crate::error::RingForgeError::Config)?;

        let secret_key_base = env::var("SECRET_KEY_BASE").map_err(|_| {
            crate::error::RingForgeError::Config(ConfigError::MissingRequired {
                field: "SECRET_KEY_BASE".to_string(),
            })
        })?;

        let port: u16 = env::var("PORT")
            .unwrap_or_else(|_| "4000".to_string())
            .parse()
            .map_err(|_| {
                crate::error::RingForgeError::Config(ConfigError::InvalidValue {
                    field: "PORT".to_string(),
                    reason: "must be a valid u16".to_string(),
                })
            })?;

        let config = Self {
            cluster_strategy,
            redis_url: env::var("REDIS_URL").ok(),
            task_store,
            database_url: env::var("DATABASE_URL").ok(),
            secret_key_base,
            port,
            hub_region: env::var("HUB_REGION").unwrap_or_else(|_| "local".to_string()),
            router_deadline_ms: 10_000,
            rate_limit_janitor_interval_secs: 300,
            rate_limit_max_window_secs: 3600,
            notification_cap: 100,
            heartbeat_timeout_secs: 60,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> RingForgeResult<()> {
        if self.task_store == TaskStoreBackend::Redis && self.redis_url.is_none() {
            return Err(crate::error::RingForgeError::Config(ConfigError::MissingRequired {
                field: "REDIS_URL".to_string(),
            }));
        }
        if self.secret_key_base.is_empty() {
            return Err(crate::error::RingForgeError::Config(ConfigError::InvalidValue {
                field: "SECRET_KEY_BASE".to_string(),
                reason: "must not be empty".to_string(),
            }));
        }
        Ok(())
    }

    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self {
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
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redis_backend_requires_redis_url() {
        let mut cfg = HubConfig::for_tests();
        cfg.task_store = TaskStoreBackend::Redis;
        assert!(cfg.validate().is_err());
        cfg.redis_url = Some("redis://localhost".to_string());
        assert!(cfg.validate().is_ok());
    }
}
