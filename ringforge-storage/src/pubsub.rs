//! Topic-keyed pub/sub fan-out - one channel per topic string
//! (`fleet:{id}`, `fleet:{id}:agent:{id}`, `squad:{id}`, `thread:{id}`,
//! `ringforge.{fleet}.{activity|broadcast|dm}`).

use dashmap::DashMap;
use serde_json::Value as JsonValue;
use tokio::sync::broadcast;
use tracing::debug;

const DEFAULT_CAPACITY: usize = 1024;

/// An event published on a topic: the topic name plus the JSON payload. The
/// payload shape is schemaless at this layer - callers agree on the schema
/// per event `kind`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TopicEvent {
    pub topic: String,
    pub kind: String,
    pub payload: JsonValue,
}

/// In-process pub/sub keyed by topic string. Cross-node fan-out (when
/// clustered) is expected to bridge this through a shared broker such as
/// Redis Pub/Sub - spec.md §9.
pub struct PubSub {
    topics: DashMap<String, broadcast::Sender<TopicEvent>>,
    capacity: usize,
}

impl Default for PubSub {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl PubSub {
    pub fn new(capacity: usize) -> Self {
        Self { topics: DashMap::new(), capacity }
    }

    fn sender_for(&self, topic: &str) -> broadcast::Sender<TopicEvent> {
        self.topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }

    /// Publish `kind`/`payload` on `topic`. Non-blocking; dropped silently
    /// if nobody is subscribed.
    pub fn publish(&self, topic: &str, kind: &str, payload: JsonValue) {
        let sender = self.sender_for(topic);
        let event = TopicEvent { topic: topic.to_string(), kind: kind.to_string(), payload };
        match sender.send(event) {
            Ok(receivers) => debug!(topic, kind, receivers, "published topic event"),
            Err(_) => debug!(topic, kind, "no subscribers for topic event"),
        }
    }

    /// Whether anyone is currently subscribed to `topic` - used to count
    /// "live presences" for announcement fan-out (spec.md §4.9).
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics.get(topic).map(|s| s.receiver_count()).unwrap_or(0)
    }

    pub fn subscribe(&self, topic: &str) -> broadcast::Receiver<TopicEvent> {
        self.sender_for(topic).subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let pubsub = PubSub::default();
        let mut rx = pubsub.subscribe("fleet:f1");
        pubsub.publish("fleet:f1", "announcement", serde_json::json!({"body": "hi"}));
        let evt = rx.recv().await.unwrap();
        assert_eq!(evt.kind, "announcement");
    }

    #[tokio::test]
    async fn publish_with_no_subscribers_does_not_panic() {
        let pubsub = PubSub::default();
        pubsub.publish("fleet:f1", "x", serde_json::json!(null));
    }

    #[tokio::test]
    async fn subscriber_count_tracks_active_receivers() {
        let pubsub = PubSub::default();
        assert_eq!(pubsub.subscriber_count("fleet:f1"), 0);
        let _rx = pubsub.subscribe("fleet:f1");
        assert_eq!(pubsub.subscriber_count("fleet:f1"), 1);
    }
}
