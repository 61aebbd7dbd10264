//! `sync:files` channel events - spec.md §6: `file:list`/`file:get`/
//! `file:put`/`file:delete`, each scoped to the joined fleet and backed by
//! the shared `KvStore` under a `sync:{fleet_id}:` prefix.

use crate::frame::Frame;
use crate::state::GatewayState;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use ringforge_core::{FleetId, StorageError};
use ringforge_storage::KvStore;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::sync::Arc;

fn file_key(fleet_id: &FleetId, name: &str) -> String {
    format!("sync:{fleet_id}:{name}")
}

#[derive(serde::Serialize, serde::Deserialize)]
struct StoredFile {
    data: String, // base64
    hash: String, // hex sha256
    size: u64,
}

pub async fn handle(state: &Arc<GatewayState>, fleet_id: Option<FleetId>, frame: &Frame) -> Frame {
    let Some(fleet_id) = fleet_id else {
        return frame.error_reply(json!({"code": "unauthorized"}));
    };
    match frame.event.as_str() {
        "file:list" => list(state, &fleet_id, frame).await,
        "file:get" => get(state, &fleet_id, frame).await,
        "file:put" => put(state, &fleet_id, frame).await,
        "file:delete" => delete(state, &fleet_id, frame).await,
        other => frame.error_reply(json!({"code": "unknown_topic", "topic": other})),
    }
}

async fn list(state: &Arc<GatewayState>, fleet_id: &FleetId, frame: &Frame) -> Frame {
    let prefix = format!("sync:{fleet_id}:");
    let entries = match state.store.list_prefix(&prefix).await {
        Ok(e) => e,
        Err(e) => return frame.error_reply(json!({"code": "store_failed", "message": e.to_string()})),
    };

    let mut files = Vec::new();
    for (key, raw) in entries {
        let Ok(stored) = serde_json::from_str::<StoredFile>(&raw) else { continue };
        let name = key.trim_start_matches(&prefix).to_string();
        files.push(json!({"key": name, "hash": stored.hash, "size": stored.size}));
    }
    frame.ok_reply(json!({"status": "ok", "files": files}))
}

async fn get(state: &Arc<GatewayState>, fleet_id: &FleetId, frame: &Frame) -> Frame {
    let Some(key) = frame.payload.get("key").and_then(|v| v.as_str()) else {
        return frame.error_reply(json!({"code": "malformed_frame", "reason": "missing 'key'"}));
    };
    match state.store.get(&file_key(fleet_id, key)).await {
        Ok(Some(raw)) => match serde_json::from_str::<StoredFile>(&raw) {
            Ok(stored) => frame.ok_reply(json!({"status": "ok", "data": stored.data})),
            Err(e) => frame.error_reply(json!({"code": "store_failed", "message": e.to_string()})),
        },
        Ok(None) => frame.error_reply(json!({"code": "not_found", "key": key})),
        Err(e) => frame.error_reply(json!({"code": "store_failed", "message": e.to_string()})),
    }
}

async fn put(state: &Arc<GatewayState>, fleet_id: &FleetId, frame: &Frame) -> Frame {
    let (Some(key), Some(data), Some(claimed_hash), Some(size)) = (
        frame.payload.get("key").and_then(|v| v.as_str()),
        frame.payload.get("data").and_then(|v| v.as_str()),
        frame.payload.get("hash").and_then(|v| v.as_str()),
        frame.payload.get("size").and_then(|v| v.as_u64()),
    ) else {
        return frame.error_reply(json!({"code": "malformed_frame", "reason": "missing key/data/hash/size"}));
    };

    let decoded = match BASE64.decode(data) {
        Ok(bytes) => bytes,
        Err(e) => return frame.error_reply(json!({"code": "malformed_frame", "reason": e.to_string()})),
    };
    let actual_hash = hex::encode(Sha256::digest(&decoded));
    if actual_hash != claimed_hash || decoded.len() as u64 != size {
        return frame.error_reply(json!({"code": "invalid_input", "reason": "hash or size mismatch"}));
    }

    let stored = StoredFile { data: data.to_string(), hash: actual_hash, size };
    let raw = match serde_json::to_string(&stored) {
        Ok(r) => r,
        Err(e) => return frame.error_reply(to_storage_error(e)),
    };
    match state.store.put(&file_key(fleet_id, key), raw).await {
        Ok(()) => {
            state.pubsub.publish(&format!("fleet:{fleet_id}:sync"), "file:changed", json!({"key": key}));
            frame.ok_reply(json!({"status": "ok"}))
        }
        Err(e) => frame.error_reply(json!({"code": "store_failed", "message": e.to_string()})),
    }
}

async fn delete(state: &Arc<GatewayState>, fleet_id: &FleetId, frame: &Frame) -> Frame {
    let Some(key) = frame.payload.get("key").and_then(|v| v.as_str()) else {
        return frame.error_reply(json!({"code": "malformed_frame", "reason": "missing 'key'"}));
    };
    match state.store.delete(&file_key(fleet_id, key)).await {
        Ok(()) => {
            state.pubsub.publish(&format!("fleet:{fleet_id}:sync"), "file:deleted", json!({"key": key}));
            frame.ok_reply(json!({"status": "ok"}))
        }
        Err(e) => frame.error_reply(json!({"code": "store_failed", "message": e.to_string()})),
    }
}

fn to_storage_error(e: serde_json::Error) -> Value {
    json!({"code": "store_failed", "message": StorageError::Serialization { reason: e.to_string() }.to_string()})
}

#[cfg(test)]
mod tests {
    use super::*;
    use ringforge_core::EntityIdType;
    use ringforge_tasks::InMemoryTaskStore;

    fn frame(event: &str, payload: Value) -> Frame {
        Frame::new("sync:files", event, payload.as_object().cloned().unwrap_or_default())
    }

    #[tokio::test]
    async fn put_then_get_round_trips_base64_content() {
        let state = GatewayState::in_memory(crate::test_support::test_config(), InMemoryTaskStore::new());
        let fleet_id = FleetId::new_v4();
        let data = BASE64.encode(b"hello world");
        let hash = hex::encode(Sha256::digest(b"hello world"));

        let put_reply = handle(
            &state,
            Some(fleet_id),
            &frame("file:put", json!({"key": "notes.txt", "data": data, "hash": hash, "size": 11})),
        )
        .await;
        assert_eq!(put_reply.payload.get("status"), Some(&Value::String("ok".to_string())));

        let get_reply = handle(&state, Some(fleet_id), &frame("file:get", json!({"key": "notes.txt"}))).await;
        let response = get_reply.payload.get("response").unwrap();
        assert_eq!(response.get("data").and_then(|v| v.as_str()), Some(data.as_str()));
    }

    #[tokio::test]
    async fn put_rejects_a_hash_mismatch() {
        let state = GatewayState::in_memory(crate::test_support::test_config(), InMemoryTaskStore::new());
        let fleet_id = FleetId::new_v4();
        let data = BASE64.encode(b"hello world");

        let reply = handle(
            &state,
            Some(fleet_id),
            &frame("file:put", json!({"key": "notes.txt", "data": data, "hash": "deadbeef", "size": 11})),
        )
        .await;
        assert_eq!(reply.payload.get("status"), Some(&Value::String("error".to_string())));
    }
}
