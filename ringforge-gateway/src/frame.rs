//! Channel wire frame - spec.md §6. Frames carry
//! `{join_ref, ref, topic, event, payload}`, wired as a V2 JSON array
//! `[join_ref|null, ref, topic, event, payload]` or a V1 JSON object
//! `{join_ref, ref, topic, event, payload}`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const PHOENIX_TOPIC: &str = "phoenix";
pub const HEARTBEAT_EVENT: &str = "heartbeat";
pub const PHX_REPLY_EVENT: &str = "phx_reply";
pub const PHX_JOIN_EVENT: &str = "phx_join";
pub const PHX_LEAVE_EVENT: &str = "phx_leave";
pub const PHX_ERROR_EVENT: &str = "phx_error";
pub const PHX_CLOSE_EVENT: &str = "phx_close";

/// A single channel frame, independent of wire encoding.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub join_ref: Option<String>,
    pub msg_ref: Option<String>,
    pub topic: String,
    pub event: String,
    pub payload: Map<String, Value>,
}

impl Frame {
    pub fn new(topic: impl Into<String>, event: impl Into<String>, payload: Map<String, Value>) -> Self {
        Self { join_ref: None, msg_ref: None, topic: topic.into(), event: event.into(), payload }
    }

    /// Build the `phx_reply` frame that answers this frame's `ref`, per
    /// spec.md §6: `{status: "ok"|"error", response: ...}`.
    pub fn ok_reply(&self, response: Value) -> Frame {
        let mut payload = Map::new();
        payload.insert("status".to_string(), Value::String("ok".to_string()));
        payload.insert("response".to_string(), response);
        Frame {
            join_ref: self.join_ref.clone(),
            msg_ref: self.msg_ref.clone(),
            topic: self.topic.clone(),
            event: PHX_REPLY_EVENT.to_string(),
            payload,
        }
    }

    pub fn error_reply(&self, error: Value) -> Frame {
        let mut payload = Map::new();
        payload.insert("status".to_string(), Value::String("error".to_string()));
        payload.insert("response".to_string(), error);
        Frame {
            join_ref: self.join_ref.clone(),
            msg_ref: self.msg_ref.clone(),
            topic: self.topic.clone(),
            event: PHX_REPLY_EVENT.to_string(),
            payload,
        }
    }

    /// Server-pushed frame on `topic` with no matching client `ref`.
    pub fn push(topic: impl Into<String>, event: impl Into<String>, payload: Value) -> Frame {
        let payload = match payload {
            Value::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert("payload".to_string(), other);
                map
            }
        };
        Frame { join_ref: None, msg_ref: None, topic: topic.into(), event: event.into(), payload }
    }

    pub fn is_heartbeat(&self) -> bool {
        self.topic == PHOENIX_TOPIC && self.event == HEARTBEAT_EVENT
    }

    /// Encode as the V2 array wire form, which the client library prefers
    /// (`vsn=2.0.0` on the join URL).
    pub fn to_wire(&self) -> Value {
        Value::Array(vec![
            self.join_ref.clone().map(Value::String).unwrap_or(Value::Null),
            self.msg_ref.clone().map(Value::String).unwrap_or(Value::Null),
            Value::String(self.topic.clone()),
            Value::String(self.event.clone()),
            Value::Object(self.payload.clone()),
        ])
    }

    /// Decode either wire form.
    pub fn from_wire(raw: &str) -> Result<Frame, FrameParseError> {
        let value: Value = serde_json::from_str(raw).map_err(|e| FrameParseError(e.to_string()))?;
        match value {
            Value::Array(items) => Self::from_v2_array(items),
            Value::Object(map) => Self::from_v1_object(map),
            _ => Err(FrameParseError("frame must be a JSON array or object".to_string())),
        }
    }

    fn from_v2_array(mut items: Vec<Value>) -> Result<Frame, FrameParseError> {
        if items.len() != 5 {
            return Err(FrameParseError(format!("expected 5-element frame array, got {}", items.len())));
        }
        let payload = match items.remove(4) {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => return Err(FrameParseError(format!("payload must be an object, got {other}"))),
        };
        let event = items.remove(3).as_str().ok_or_else(|| FrameParseError("event must be a string".to_string()))?.to_string();
        let topic = items.remove(2).as_str().ok_or_else(|| FrameParseError("topic must be a string".to_string()))?.to_string();
        let msg_ref = as_opt_string(items.remove(1));
        let join_ref = as_opt_string(items.remove(0));
        Ok(Frame { join_ref, msg_ref, topic, event, payload })
    }

    fn from_v1_object(mut map: Map<String, Value>) -> Result<Frame, FrameParseError> {
        let topic = map
            .remove("topic")
            .and_then(|v| v.as_str().map(str::to_string))
            .ok_or_else(|| FrameParseError("missing topic".to_string()))?;
        let event = map
            .remove("event")
            .and_then(|v| v.as_str().map(str::to_string))
            .ok_or_else(|| FrameParseError("missing event".to_string()))?;
        let payload = match map.remove("payload") {
            Some(Value::Object(p)) => p,
            _ => Map::new(),
        };
        let join_ref = map.remove("join_ref").and_then(as_opt_string);
        let msg_ref = map.remove("ref").and_then(as_opt_string);
        Ok(Frame { join_ref, msg_ref, topic, event, payload })
    }
}

fn as_opt_string(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameParseError(pub String);

impl std::fmt::Display for FrameParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "malformed frame: {}", self.0)
    }
}

impl std::error::Error for FrameParseError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v2_array_round_trips() {
        let mut payload = Map::new();
        payload.insert("name".to_string(), Value::String("agent-7".to_string()));
        let frame = Frame {
            join_ref: Some("1".to_string()),
            msg_ref: Some("2".to_string()),
            topic: "fleet:abc".to_string(),
            event: "phx_join".to_string(),
            payload,
        };
        let wire = frame.to_wire().to_string();
        let decoded = Frame::from_wire(&wire).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn v1_object_is_accepted() {
        let raw = r#"{"join_ref":"1","ref":"2","topic":"phoenix","event":"heartbeat","payload":{}}"#;
        let frame = Frame::from_wire(raw).unwrap();
        assert!(frame.is_heartbeat());
        assert_eq!(frame.join_ref, Some("1".to_string()));
    }

    #[test]
    fn array_with_wrong_arity_is_rejected() {
        let raw = r#"[null, "1", "phoenix", "heartbeat"]"#;
        assert!(Frame::from_wire(raw).is_err());
    }

    #[test]
    fn ok_reply_preserves_join_ref_and_wraps_status() {
        let join = Frame::new("fleet:f1", "phx_join", Map::new());
        let reply = join.ok_reply(serde_json::json!({"agent_id": "ag_1"}));
        assert_eq!(reply.event, PHX_REPLY_EVENT);
        assert_eq!(reply.payload.get("status"), Some(&Value::String("ok".to_string())));
    }
}
