//! The duplex channel protocol endpoint - spec.md §4.12 / §6. Split-socket
//! read/write halves, per-topic `PubSub` subscriptions, and a per-agent
//! outbound queue (`ConnectionRegistry`).

use crate::auth::authenticate_fleet_key;
use crate::frame::{Frame, PHX_CLOSE_EVENT, PHX_JOIN_EVENT, PHX_LEAVE_EVENT};
use crate::state::GatewayState;
use crate::sync_files;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use dashmap::DashSet;
use futures_util::{SinkExt, StreamExt};
use ringforge_core::{
    Agent, AgentId, ContextTier, FleetId, Priority, PresenceState, RingForgeError, RouterError, Scope, SquadRef, ThreadId,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamMap;
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
pub struct JoinQuery {
    #[serde(default)]
    pub vsn: Option<String>,
    pub api_key: String,
    pub agent: String,
}

pub async fn ws_handler(
    State(state): State<Arc<GatewayState>>,
    Query(query): Query<JoinQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, query))
}

#[derive(Debug, Deserialize)]
struct JoinAgentDescriptor {
    agent_id: Option<String>,
    name: String,
    #[serde(default)]
    framework: Option<String>,
    #[serde(default)]
    capabilities: Vec<String>,
    #[serde(default)]
    squad_id: Option<String>,
    #[serde(default)]
    context_tier: Option<String>,
}

/// Per-connection session state, mutated as `phx_join`/`phx_leave` frames
/// arrive. One socket may join several topics over its lifetime.
struct Session {
    agent: Option<Agent>,
    joined_topics: DashSet<String>,
    last_heartbeat: Instant,
}

async fn handle_socket(socket: WebSocket, state: Arc<GatewayState>, join_query: JoinQuery) {
    let (mut sink, mut stream) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Frame>();

    let descriptor: Result<JoinAgentDescriptor, _> = serde_json::from_str(&join_query.agent);
    let descriptor = match descriptor {
        Ok(d) => d,
        Err(e) => {
            warn!(error = %e, "malformed agent descriptor on connect");
            let _ = sink.send(Message::Close(None)).await;
            return;
        }
    };

    let session = Arc::new(tokio::sync::Mutex::new(Session {
        agent: None,
        joined_topics: DashSet::new(),
        last_heartbeat: Instant::now(),
    }));

    // Fan-in task: drain per-agent outbound queue plus every subscribed
    // `PubSub` topic into one writer loop over the socket's sink. Topic
    // receivers are merged into a single `StreamMap` so they're first-class
    // `select!` arms rather than a fallthrough that tokio only reaches once
    // every other arm is disabled.
    let writer_state = state.clone();
    let writer_session = session.clone();
    let mut topic_streams: StreamMap<String, BroadcastStream<ringforge_storage::TopicEvent>> = StreamMap::new();
    let heartbeat_timeout = Duration::from_secs(writer_state.config.heartbeat_timeout_secs);

    let writer = tokio::spawn(async move {
        let mut heartbeat_interval = tokio::time::interval(Duration::from_secs(15));
        loop {
            // Refresh topic subscriptions each iteration - cheap relative to
            // socket I/O, and keeps late `phx_join`s picked up without a
            // separate signalling channel.
            for topic in writer_session.lock().await.joined_topics.iter() {
                let topic: String = topic.clone();
                if !topic_streams.contains_key(&topic) {
                    let rx = writer_state.pubsub.subscribe(&topic);
                    topic_streams.insert(topic, BroadcastStream::new(rx));
                }
            }

            tokio::select! {
                maybe_frame = outbound_rx.recv() => {
                    match maybe_frame {
                        Some(frame) => {
                            if sink.send(Message::Text(frame.to_wire().to_string())).await.is_err() {
                                break;
                            }
                            writer_state.metrics.frames_sent_total.inc();
                        }
                        None => break,
                    }
                }
                _ = heartbeat_interval.tick() => {
                    let idle = writer_session.lock().await.last_heartbeat.elapsed();
                    if idle > heartbeat_timeout {
                        info!("agent heartbeat timed out, closing connection");
                        let _ = sink.send(Message::Close(None)).await;
                        break;
                    }
                }
                Some((topic, event)) = topic_streams.next() => {
                    match event {
                        Ok(event) => {
                            let frame = Frame::push(event.topic, event.kind, event.payload);
                            if sink.send(Message::Text(frame.to_wire().to_string())).await.is_err() {
                                break;
                            }
                            writer_state.metrics.frames_sent_total.inc();
                        }
                        Err(tokio_stream::wrappers::errors::BroadcastStreamRecvError::Lagged(skipped)) => {
                            warn!(topic, skipped, "pubsub subscriber lagged, events dropped");
                        }
                    }
                }
            }
        }
    });

    while let Some(Ok(msg)) = stream.next().await {
        let Message::Text(raw) = msg else {
            if matches!(msg, Message::Close(_)) {
                break;
            }
            continue;
        };
        state.metrics.frames_received_total.inc();

        let frame = match Frame::from_wire(&raw) {
            Ok(f) => f,
            Err(e) => {
                warn!(error = %e, "malformed frame");
                continue;
            }
        };

        if frame.is_heartbeat() {
            session.lock().await.last_heartbeat = Instant::now();
            let _ = outbound_tx.send(frame.ok_reply(json!({})));
            continue;
        }

        let reply = dispatch(&state, &session, &outbound_tx, &join_query, &descriptor, &frame).await;
        if let Some(reply) = reply {
            let _ = outbound_tx.send(reply);
        }
    }

    let agent_id = session.lock().await.agent.as_ref().map(|a| a.agent_id.clone());
    if let Some(agent_id) = agent_id {
        if let Some(agent) = session.lock().await.agent.clone() {
            state.presence.leave(&agent.fleet_id, &agent_id);
            state.pubsub.publish(
                &format!("fleet:{}", agent.fleet_id),
                "presence:leave",
                json!({"agent_id": agent_id.to_string()}),
            );
        }
        state.connections.unregister(&agent_id);
    }
    writer.abort();
}

/// Route one non-heartbeat frame to its handler, returning the `phx_reply`
/// (or, for bare pushes with no reply semantics, `None`).
async fn dispatch(
    state: &Arc<GatewayState>,
    session: &Arc<tokio::sync::Mutex<Session>>,
    outbound_tx: &mpsc::UnboundedSender<Frame>,
    join_query: &JoinQuery,
    descriptor: &JoinAgentDescriptor,
    frame: &Frame,
) -> Option<Frame> {
    match frame.event.as_str() {
        PHX_JOIN_EVENT => Some(handle_join(state, session, outbound_tx, join_query, descriptor, frame).await),
        PHX_LEAVE_EVENT => Some(handle_leave(state, session, frame).await),
        "presence:update" => Some(handle_presence_update(state, session, frame).await),
        "presence:roster" => Some(handle_presence_roster(state, session, frame).await),
        "activity:broadcast" => Some(handle_activity_broadcast(state, session, frame).await),
        "message:send" => Some(handle_message_send(state, session, frame).await),
        "message:broadcast" => Some(handle_message_broadcast(state, session, frame).await),
        "message:escalate" => Some(handle_message_escalate(state, session, frame).await),
        "thread:reply" => Some(handle_thread_reply(state, session, frame).await),
        "file:list" | "file:get" | "file:put" | "file:delete" => {
            Some(sync_files::handle(state, session_fleet(session).await, frame).await)
        }
        other => Some(frame.error_reply(json!({"code": "unknown_topic", "topic": other}))),
    }
}

async fn session_fleet(session: &Arc<tokio::sync::Mutex<Session>>) -> Option<FleetId> {
    session.lock().await.agent.as_ref().map(|a| a.fleet_id)
}

fn generate_agent_id() -> AgentId {
    AgentId::new(format!("ag_{:016x}", rand::random::<u64>()))
}

fn parse_fleet_topic(topic: &str) -> Option<FleetId> {
    topic.strip_prefix("fleet:").and_then(|s| s.parse().ok())
}

async fn handle_join(
    state: &Arc<GatewayState>,
    session: &Arc<tokio::sync::Mutex<Session>>,
    outbound_tx: &mpsc::UnboundedSender<Frame>,
    join_query: &JoinQuery,
    descriptor: &JoinAgentDescriptor,
    frame: &Frame,
) -> Frame {
    let Some(fleet_id) = parse_fleet_topic(&frame.topic) else {
        return frame.error_reply(json!({"code": "malformed_frame", "reason": "topic must be fleet:{fleet_id}"}));
    };

    if let Err(e) = authenticate_fleet_key(&state.admin_store, &fleet_id, &join_query.api_key).await {
        return frame.error_reply(crate::error::to_reply_error(&RingForgeError::Gateway(e)));
    }

    let agent_id = descriptor.agent_id.clone().map(AgentId::new).unwrap_or_else(generate_agent_id);
    let squad_id = descriptor.squad_id.as_deref().and_then(|s| s.parse().ok());
    let context_tier = match descriptor.context_tier.as_deref() {
        Some("tier1") => ContextTier::Tier1,
        Some("tier2") => ContextTier::Tier2,
        Some("tier3") => ContextTier::Tier3,
        _ => ContextTier::Tier0,
    };

    let mut metadata = Map::new();
    if let Some(framework) = &descriptor.framework {
        metadata.insert("framework".to_string(), Value::String(framework.clone()));
    }
    metadata.insert("capabilities".to_string(), json!(descriptor.capabilities));

    let agent = Agent {
        agent_id: agent_id.clone(),
        fleet_id,
        squad_id,
        name: descriptor.name.clone(),
        display_name: descriptor.name.clone(),
        role_template_id: None,
        role_slug: None,
        context_tier,
        metadata,
    };

    state.directory.upsert(agent.clone());
    state.presence.join(fleet_id, agent_id.clone());
    state.connections.register(agent_id.clone(), outbound_tx.clone());

    {
        let mut guard = session.lock().await;
        guard.agent = Some(agent.clone());
        guard.joined_topics.insert(frame.topic.clone());
        guard.last_heartbeat = Instant::now();
    }

    state.pubsub.publish(&format!("fleet:{fleet_id}"), "presence:join", json!({"agent_id": agent_id.to_string()}));

    if let Err(e) = state.dm.deliver_queued(&fleet_id, &agent_id).await {
        warn!(error = %e, "queued-DM replay failed on join");
    }

    frame.ok_reply(json!({"agent_id": agent_id.to_string(), "fleet_id": fleet_id.to_string()}))
}

async fn handle_leave(state: &Arc<GatewayState>, session: &Arc<tokio::sync::Mutex<Session>>, frame: &Frame) -> Frame {
    let mut guard = session.lock().await;
    guard.joined_topics.remove(&frame.topic);
    if let Some(agent) = &guard.agent {
        if let Some(fleet_id) = parse_fleet_topic(&frame.topic) {
            if fleet_id == agent.fleet_id {
                state.presence.leave(&fleet_id, &agent.agent_id);
            }
        }
    }
    Frame { join_ref: frame.join_ref.clone(), msg_ref: frame.msg_ref.clone(), topic: frame.topic.clone(), event: PHX_CLOSE_EVENT.to_string(), payload: Map::new() }
}

async fn handle_presence_update(state: &Arc<GatewayState>, session: &Arc<tokio::sync::Mutex<Session>>, frame: &Frame) -> Frame {
    let Some(agent) = session.lock().await.agent.clone() else {
        return frame.error_reply(json!({"code": "unauthorized"}));
    };
    let state_str = frame.payload.get("state").and_then(|v| v.as_str()).unwrap_or("online");
    let presence_state = match state_str {
        "busy" => PresenceState::Busy,
        "away" => PresenceState::Away,
        _ => PresenceState::Online,
    };
    let task = frame.payload.get("task").and_then(|v| v.as_str()).map(str::to_string);
    state.presence.update(agent.fleet_id, agent.agent_id.clone(), presence_state, task.clone());
    state.pubsub.publish(
        &format!("fleet:{}", agent.fleet_id),
        "presence:update",
        json!({"agent_id": agent.agent_id.to_string(), "state": state_str, "task": task}),
    );
    frame.ok_reply(json!({}))
}

async fn handle_presence_roster(state: &Arc<GatewayState>, session: &Arc<tokio::sync::Mutex<Session>>, frame: &Frame) -> Frame {
    let Some(agent) = session.lock().await.agent.clone() else {
        return frame.error_reply(json!({"code": "unauthorized"}));
    };
    let roster = state.presence.roster(&agent.fleet_id);
    frame.ok_reply(json!({"roster": roster}))
}

async fn handle_activity_broadcast(state: &Arc<GatewayState>, session: &Arc<tokio::sync::Mutex<Session>>, frame: &Frame) -> Frame {
    let Some(agent) = session.lock().await.agent.clone() else {
        return frame.error_reply(json!({"code": "unauthorized"}));
    };
    let description = frame.payload.get("description").and_then(|v| v.as_str()).unwrap_or("").to_string();
    let tags = frame
        .payload
        .get("tags")
        .and_then(|v| v.as_array())
        .map(|a| a.iter().filter_map(|t| t.as_str().map(str::to_string)).collect())
        .unwrap_or_default();

    ringforge_messaging::activity::append(
        state.store.as_ref(),
        &agent.fleet_id,
        "activity",
        Some(agent.agent_id.clone()),
        description,
        tags,
        Value::Object(frame.payload.clone()),
    )
    .await;

    state.pubsub.publish(&format!("fleet:{}", agent.fleet_id), "activity", Value::Object(frame.payload.clone()));
    frame.ok_reply(json!({}))
}

async fn handle_message_send(state: &Arc<GatewayState>, session: &Arc<tokio::sync::Mutex<Session>>, frame: &Frame) -> Frame {
    let Some(agent) = session.lock().await.agent.clone() else {
        return frame.error_reply(json!({"code": "unauthorized"}));
    };
    let Some(to) = frame.payload.get("to").and_then(|v| v.as_str()) else {
        return frame.error_reply(json!({"code": "malformed_frame", "reason": "missing 'to'"}));
    };
    let message = frame.payload.get("message").and_then(|v| v.as_object()).cloned().unwrap_or_default();
    let correlation_id = frame.payload.get("correlation_id").and_then(|v| v.as_str()).map(str::to_string);
    let priority = parse_priority(frame.payload.get("priority"));

    match state
        .router
        .route_dm(agent.fleet_id, agent.agent_id.clone(), AgentId::new(to), message, correlation_id, priority)
        .await
    {
        Ok(ringforge_router::DmOutcome::Delivered { message_id }) => {
            frame.ok_reply(json!({"status": "delivered", "message_id": message_id.to_string()}))
        }
        Ok(ringforge_router::DmOutcome::Queued { message_id }) => {
            frame.ok_reply(json!({"status": "queued", "message_id": message_id.to_string()}))
        }
        Err(e) => router_error_reply(state, frame, e),
    }
}

async fn handle_message_broadcast(state: &Arc<GatewayState>, session: &Arc<tokio::sync::Mutex<Session>>, frame: &Frame) -> Frame {
    let Some(agent) = session.lock().await.agent.clone() else {
        return frame.error_reply(json!({"code": "unauthorized"}));
    };
    let scope = match parse_scope(frame.payload.get("scope")) {
        Ok(s) => s,
        Err(e) => return frame.error_reply(json!({"code": "malformed_frame", "reason": e})),
    };
    let message = frame.payload.get("message").and_then(|v| v.as_object()).cloned().unwrap_or_default();
    let priority = parse_priority(frame.payload.get("priority"));

    match state.router.route_broadcast(agent.fleet_id, agent.agent_id.clone(), scope, message, priority).await {
        Ok(reached) => frame.ok_reply(json!({"reached": reached})),
        Err(e) => router_error_reply(state, frame, e),
    }
}

async fn handle_message_escalate(state: &Arc<GatewayState>, session: &Arc<tokio::sync::Mutex<Session>>, frame: &Frame) -> Frame {
    let Some(agent) = session.lock().await.agent.clone() else {
        return frame.error_reply(json!({"code": "unauthorized"}));
    };
    let target_role = frame.payload.get("target_role").and_then(|v| v.as_str()).unwrap_or_default().to_string();
    let subject = frame.payload.get("subject").and_then(|v| v.as_str()).unwrap_or_default().to_string();
    let body = frame.payload.get("body").and_then(|v| v.as_str()).unwrap_or_default().to_string();
    let priority = parse_priority(frame.payload.get("priority"));
    let context_refs = frame
        .payload
        .get("context_refs")
        .and_then(|v| v.as_array())
        .map(|a| a.iter().filter_map(|r| r.as_str().map(str::to_string)).collect())
        .unwrap_or_default();

    match state
        .router
        .route_escalation(agent.fleet_id, agent.agent_id.clone(), target_role, subject, body, priority, context_refs)
        .await
    {
        Ok(id) => frame.ok_reply(json!({"escalation_id": id.to_string()})),
        Err(e) => router_error_reply(state, frame, e),
    }
}

async fn handle_thread_reply(state: &Arc<GatewayState>, session: &Arc<tokio::sync::Mutex<Session>>, frame: &Frame) -> Frame {
    let Some(agent) = session.lock().await.agent.clone() else {
        return frame.error_reply(json!({"code": "unauthorized"}));
    };
    let Some(thread_id) = frame.payload.get("thread_id").and_then(|v| v.as_str()) else {
        return frame.error_reply(json!({"code": "malformed_frame", "reason": "missing 'thread_id'"}));
    };
    let body = frame.payload.get("body").cloned().unwrap_or(Value::Null);
    let refs = frame
        .payload
        .get("refs")
        .and_then(|v| v.as_array())
        .map(|a| a.iter().filter_map(|r| r.as_str().map(str::to_string)).collect())
        .unwrap_or_default();
    let metadata = frame.payload.get("metadata").and_then(|v| v.as_object()).cloned().unwrap_or_default();

    match state
        .router
        .route_thread_reply(ThreadId::from_raw(thread_id), agent.agent_id.clone(), body, refs, metadata)
        .await
    {
        Ok(message_id) => frame.ok_reply(json!({"message_id": message_id.to_string()})),
        Err(e) => router_error_reply(state, frame, e),
    }
}

fn router_error_reply(state: &Arc<GatewayState>, frame: &Frame, err: RouterError) -> Frame {
    match &err {
        RouterError::Denied { .. } => state.metrics.router_denied_total.inc(),
        RouterError::Limited { .. } => state.metrics.router_limited_total.inc(),
        _ => {}
    }
    frame.error_reply(crate::error::to_reply_error(&RingForgeError::Router(err)))
}

fn parse_priority(value: Option<&Value>) -> Priority {
    match value.and_then(|v| v.as_str()) {
        Some("low") => Priority::Low,
        Some("high") => Priority::High,
        Some("critical") => Priority::Critical,
        _ => Priority::Normal,
    }
}

fn parse_scope(value: Option<&Value>) -> Result<Scope, &'static str> {
    match value {
        None => Ok(Scope::Fleet),
        Some(Value::String(s)) if s == "fleet" => Ok(Scope::Fleet),
        Some(Value::Object(map)) => {
            if let Some(squad) = map.get("squad").and_then(|v| v.as_str()) {
                return Ok(Scope::Squad(SquadRef(squad.to_string())));
            }
            if let Some(role) = map.get("role").and_then(|v| v.as_str()) {
                return Ok(Scope::Role(role.to_string()));
            }
            Err("scope object must carry 'squad' or 'role'")
        }
        _ => Err("unrecognized scope"),
    }
}

/// Push a `system:drain` frame to every connected agent, giving clients a
/// reconnect hint before this node shuts down - spec.md §5.
pub fn broadcast_drain(state: &GatewayState, reconnect_after_ms: u64) {
    let frame = Frame::push("system", "system:drain", json!({"reconnect_after_ms": reconnect_after_ms}));
    state.connections.broadcast_all(frame);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_scope_defaults_to_fleet() {
        assert_eq!(parse_scope(None).unwrap(), Scope::Fleet);
    }

    #[test]
    fn parse_scope_rejects_an_object_with_neither_key() {
        assert!(parse_scope(Some(&json!({"nonsense": true}))).is_err());
    }

    #[test]
    fn parse_priority_defaults_to_normal() {
        assert_eq!(parse_priority(None), Priority::Normal);
    }
}
