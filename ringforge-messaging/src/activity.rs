//! Append-only, topic-partitioned activity event log - spec.md §6's
//! `ringforge.{fleet_id}.{activity|broadcast|dm}` stream.

use ringforge_core::{now, ActivityEvent, AgentId, FleetId, RingForgeResult};
use ringforge_storage::{list_prefix_tail, put_json, KvStore};
use serde_json::Value;
use tracing::warn;

fn event_key(fleet_id: &FleetId, kind: &str, timestamp_ms: i64, event_id: &str) -> String {
    format!("evt:{fleet_id}:{kind}:{timestamp_ms:020}:{event_id}")
}

/// Append an event to `ringforge.{fleet_id}.{kind}`. Per spec.md §7, failures
/// here are logged and swallowed - they never fail the primary message.
pub async fn append(
    store: &dyn KvStore,
    fleet_id: &FleetId,
    kind: &str,
    from: Option<AgentId>,
    description: impl Into<String>,
    tags: Vec<String>,
    data: Value,
) {
    let event = ActivityEvent {
        event_id: ringforge_core::MessageId::generate().to_string(),
        from,
        kind: kind.to_string(),
        description: description.into(),
        tags,
        data,
        timestamp: now(),
    };
    let key = event_key(fleet_id, kind, event.timestamp.timestamp_millis(), &event.event_id);
    if let Err(err) = put_json(store, &key, &event).await {
        warn!(%fleet_id, kind, error = %err, "activity log write failed");
    }
}

/// `history(fleet_id, a, b, limit)`: events on the `dm` partition where
/// `(from, to) ∈ {(a,b),(b,a)}` - spec.md §4.6.
pub async fn dm_history(
    store: &dyn KvStore,
    fleet_id: &FleetId,
    a: &AgentId,
    b: &AgentId,
    limit: usize,
) -> RingForgeResult<Vec<ActivityEvent>> {
    let prefix = format!("evt:{fleet_id}:dm:");
    let entries = list_prefix_tail(store, &prefix, usize::MAX, None).await?;
    let mut out = Vec::new();
    for (_, raw) in entries {
        let event: ActivityEvent = match serde_json::from_str(&raw) {
            Ok(e) => e,
            Err(_) => continue,
        };
        let to = event.data.get("to").and_then(|v| v.as_str()).map(AgentId::new);
        let matches = match (&event.from, &to) {
            (Some(from), Some(to)) => (from == a && to == *b) || (from == b && to == *a),
            _ => false,
        };
        if matches {
            out.push(event);
        }
    }
    if out.len() > limit {
        out = out.split_off(out.len() - limit);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ringforge_core::EntityIdType;
    use ringforge_storage::InMemoryKvStore;
    use serde_json::json;

    #[tokio::test]
    async fn dm_history_finds_events_in_either_direction() {
        let store = InMemoryKvStore::new();
        let fleet = FleetId::new_v4();
        let a = AgentId::new("ag_a");
        let b = AgentId::new("ag_b");
        append(store.as_ref(), &fleet, "dm", Some(a.clone()), "hi", vec![], json!({"to": "ag_b"})).await;
        append(store.as_ref(), &fleet, "dm", Some(b.clone()), "hey", vec![], json!({"to": "ag_a"})).await;

        let history = dm_history(store.as_ref(), &fleet, &a, &b, 10).await.unwrap();
        assert_eq!(history.len(), 2);
    }
}
