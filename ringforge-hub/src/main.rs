//! RingForge Hub entry point - loads `HubConfig` from the environment,
//! builds the task store, wires `GatewayState`, and serves the duplex
//! channel protocol plus the admin control plane.

use axum::routing::get;
use axum::Router;
use ringforge_core::{HubConfig, RingForgeResult};
use ringforge_gateway::{ws_handler, GatewayState};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;

#[tokio::main]
async fn main() -> RingForgeResult<()> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let config = HubConfig::from_env()?;
    tracing::info!(region = %config.hub_region, port = config.port, "starting RingForge Hub");

    let tasks = ringforge_tasks::build_task_store(config.task_store, config.redis_url.as_deref()).await?;
    let store = build_kv_store(&config);
    let state = GatewayState::new(config.clone(), store, tasks);

    spawn_background_jobs(&state);

    let app: Router = Router::new()
        .route("/ws/websocket", get(ws_handler))
        .merge(ringforge_gateway::create_router())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ringforge_core::RingForgeError::Config(ringforge_core::ConfigError::InvalidValue {
            field: "PORT".to_string(),
            reason: format!("failed to bind {addr}: {e}"),
        }))?;

    tokio::select! {
        result = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "server error");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }

    Ok(())
}

/// `GatewayState::new` takes an `Arc<dyn KvStore>` directly rather than a
/// backend enum - RingForge Hub only ships the in-memory KV store today
/// (spec.md §1 puts a distributed KV backend out of scope), but the seam
/// matches `ringforge_tasks::build_task_store`'s backend-selection shape so
/// a Redis-backed `KvStore` can be added the same way later.
fn build_kv_store(_config: &HubConfig) -> Arc<dyn ringforge_storage::KvStore> {
    ringforge_storage::InMemoryKvStore::new()
}

fn spawn_background_jobs(state: &Arc<GatewayState>) {
    let rate_limiter = state.rate_limiter.clone();
    let janitor_interval = Duration::from_secs(state.config.rate_limit_janitor_interval_secs);
    tokio::spawn(async move {
        rate_limiter.spawn_janitor(janitor_interval).await;
    });

    let tasks = state.tasks.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(60));
        loop {
            ticker.tick().await;
            match tasks.cleanup_expired().await {
                Ok(expired) if !expired.is_empty() => {
                    tracing::info!(count = expired.len(), "expired tasks cleaned up");
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "task cleanup pass failed"),
            }
        }
    });

    let drain_state = state.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(30));
        loop {
            ticker.tick().await;
            ringforge_gateway::broadcast_drain(&drain_state, 5_000);
        }
    });
}
