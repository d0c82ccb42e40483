//! The pub/sub substrate the tracker replicates through.
//!
//! The framework does not ship a cluster transport; deployments plug in
//! whatever they run (NATS, Redis, Postgres LISTEN/NOTIFY) by implementing
//! [`PubSub`]. [`LocalPubSub`] is an in-process implementation used in tests
//! and single-node setups that still want the distribution-gated features.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::broadcast;

use crate::TrackerError;

/// A join or leave replicated to every node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerDiff {
    pub action: DiffAction,
    pub topic: String,
    pub key: String,
    pub node: String,
    pub metadata: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffAction {
    Join,
    Leave,
}

/// Cluster fan-out substrate. Implementations must deliver published
/// payloads to every node subscribed to the topic, including the publisher.
#[async_trait]
pub trait PubSub: Send + Sync {
    async fn publish(&self, topic: &str, payload: Value) -> Result<(), TrackerError>;

    /// Subscribe to a topic; the receiver sees payloads published after the
    /// call, with no replay.
    fn subscribe(&self, topic: &str) -> broadcast::Receiver<Value>;
}

/// In-process substrate backed by broadcast channels, one per topic.
pub struct LocalPubSub {
    channels: Mutex<HashMap<String, broadcast::Sender<Value>>>,
    capacity: usize,
}

impl LocalPubSub {
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            capacity,
        }
    }

    fn channel(&self, topic: &str) -> broadcast::Sender<Value> {
        let mut channels = self.channels.lock().unwrap();
        channels
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }
}

impl Default for LocalPubSub {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PubSub for LocalPubSub {
    async fn publish(&self, topic: &str, payload: Value) -> Result<(), TrackerError> {
        // A send error only means nobody is subscribed yet.
        let _ = self.channel(topic).send(payload);
        Ok(())
    }

    fn subscribe(&self, topic: &str) -> broadcast::Receiver<Value> {
        self.channel(topic).subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_publish_reaches_subscriber() {
        let pubsub = LocalPubSub::new();
        let mut rx = pubsub.subscribe("alpha");
        pubsub.publish("alpha", json!({"n": 1})).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), json!({"n": 1}));
    }

    #[tokio::test]
    async fn test_topics_are_isolated() {
        let pubsub = LocalPubSub::new();
        let mut rx = pubsub.subscribe("alpha");
        pubsub.publish("beta", json!(1)).await.unwrap();
        pubsub.publish("alpha", json!(2)).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), json!(2));
    }

    #[test]
    fn test_diff_roundtrip() {
        let diff = TrackerDiff {
            action: DiffAction::Join,
            topic: "sessions".to_string(),
            key: "s-1".to_string(),
            node: "node-a".to_string(),
            metadata: json!({"stream": true}),
        };
        let encoded = serde_json::to_value(&diff).unwrap();
        let decoded: TrackerDiff = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded.action, DiffAction::Join);
        assert_eq!(decoded.key, "s-1");
    }
}
