//! Shared hub state handed to every axum handler via `State<Arc<GatewayState>>`.

use crate::active_tasks::ActiveTaskCache;
use crate::admin_store::AdminStore;
use crate::connections::ConnectionRegistry;
use ringforge_core::HubConfig;
use ringforge_messaging::{AgentRegistry, Announcements, DirectMessages, Escalations, Notifications, PresenceTracker, Threads};
use ringforge_router::Router;
use ringforge_storage::{InMemoryKvStore, KeyLocks, KvStore, PubSub};
use ringforge_tasks::TaskStore;
use std::sync::Arc;

/// Everything a connected agent, an admin HTTP caller, or a background job
/// needs. One instance lives for the hub's whole process lifetime.
pub struct GatewayState {
    pub config: HubConfig,
    pub store: Arc<dyn KvStore>,
    pub key_locks: Arc<KeyLocks>,
    pub pubsub: Arc<PubSub>,
    pub directory: Arc<AgentRegistry>,
    pub presence: Arc<PresenceTracker>,
    pub notifications: Arc<Notifications>,
    pub dm: Arc<DirectMessages>,
    pub threads: Arc<Threads>,
    pub escalations: Arc<Escalations>,
    pub announcements: Arc<Announcements>,
    pub router: Arc<Router>,
    pub rate_limiter: Arc<ringforge_router::RateLimiter>,
    pub tasks: Arc<dyn TaskStore>,
    pub active_tasks: Arc<ActiveTaskCache>,
    pub connections: Arc<ConnectionRegistry>,
    pub metrics: Arc<crate::metrics::GatewayMetrics>,
    pub admin_store: AdminStore,
}

impl GatewayState {
    /// Build the leaves first, then the modules that compose them, then the
    /// `Router` pipeline on top.
    pub fn new(config: HubConfig, store: Arc<dyn KvStore>, tasks: Arc<dyn TaskStore>) -> Arc<Self> {
        let key_locks = Arc::new(KeyLocks::new());
        let pubsub = Arc::new(PubSub::new(1024));
        let directory = AgentRegistry::new();
        let presence = PresenceTracker::new();
        let notifications = Arc::new(Notifications::new(store.clone(), pubsub.clone()));
        let dm = Arc::new(DirectMessages::new(store.clone(), pubsub.clone(), presence.clone(), notifications.clone()));
        let threads = Arc::new(Threads::new(store.clone(), pubsub.clone(), notifications.clone()));
        let escalations = Arc::new(Escalations::new(store.clone(), pubsub.clone(), directory.clone(), notifications.clone()));
        let announcements = Arc::new(Announcements::new(store.clone(), pubsub.clone(), directory.clone(), notifications.clone()));

        let rate_limiter = Arc::new(ringforge_router::RateLimiter::new((config.rate_limit_max_window_secs * 1000) as i64));
        let active_tasks = ActiveTaskCache::new();

        let router = Router::new(
            directory.clone(),
            rate_limiter.clone(),
            store.clone(),
            dm.clone(),
            announcements.clone(),
            escalations.clone(),
            threads.clone(),
            announcements.clone(),
            config.router_deadline_ms as i64,
        )
        .with_active_task_lookup(active_tasks.clone());

        Arc::new(Self {
            admin_store: AdminStore::new(store.clone()),
            config,
            store,
            key_locks,
            pubsub,
            directory,
            presence,
            notifications,
            dm,
            threads,
            escalations,
            announcements,
            router: Arc::new(router),
            rate_limiter,
            tasks,
            active_tasks,
            connections: ConnectionRegistry::new(),
            metrics: crate::metrics::GatewayMetrics::new(),
        })
    }

    /// Convenience for handlers that only need an `InMemoryKvStore`-backed
    /// hub (tests, single-node dev runs without `REDIS_URL`).
    pub fn in_memory(config: HubConfig, tasks: Arc<dyn TaskStore>) -> Arc<Self> {
        Self::new(config, InMemoryKvStore::new(), tasks)
    }
}
