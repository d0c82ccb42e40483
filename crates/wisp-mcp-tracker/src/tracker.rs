//! The tracker proper: three replicated topics over an optional substrate.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{RwLock, broadcast, mpsc};
use tracing::{debug, warn};

use crate::pubsub::{DiffAction, PubSub, TrackerDiff};
use crate::TrackerError;

const DIFFS_TOPIC: &str = "wisp:tracker:diffs";
const EVENTS_TOPIC: &str = "wisp:tracker:events";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Sessions,
    Requests,
    Resources,
}

impl Topic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::Sessions => "sessions",
            Topic::Requests => "requests",
            Topic::Resources => "resources",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "sessions" => Some(Topic::Sessions),
            "requests" => Some(Topic::Requests),
            "resources" => Some(Topic::Resources),
            _ => None,
        }
    }
}

/// A tracked process reference: the owning session id, the node it lives
/// on, and (when local) a sender into its mailbox. Remote entries carry no
/// sender; messages for them travel through the substrate.
pub struct SessionHandle<M> {
    pub owner: String,
    pub node: String,
    sender: Option<mpsc::Sender<M>>,
    pub metadata: Value,
}

// Manual impls: senders clone and print regardless of M.
impl<M> Clone for SessionHandle<M> {
    fn clone(&self) -> Self {
        Self {
            owner: self.owner.clone(),
            node: self.node.clone(),
            sender: self.sender.clone(),
            metadata: self.metadata.clone(),
        }
    }
}

impl<M> std::fmt::Debug for SessionHandle<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("owner", &self.owner)
            .field("node", &self.node)
            .field("local", &self.is_local())
            .field("metadata", &self.metadata)
            .finish()
    }
}

impl<M> SessionHandle<M> {
    pub fn local(
        owner: impl Into<String>,
        node: impl Into<String>,
        sender: mpsc::Sender<M>,
        metadata: Value,
    ) -> Self {
        Self {
            owner: owner.into(),
            node: node.into(),
            sender: Some(sender),
            metadata,
        }
    }

    pub fn remote(owner: impl Into<String>, node: impl Into<String>, metadata: Value) -> Self {
        Self {
            owner: owner.into(),
            node: node.into(),
            sender: None,
            metadata,
        }
    }

    pub fn is_local(&self) -> bool {
        self.sender.is_some()
    }

    /// Local entries are alive while their mailbox is open; remote entries
    /// are presumed alive until a leave diff arrives.
    pub fn is_alive(&self) -> bool {
        match &self.sender {
            Some(sender) => !sender.is_closed(),
            None => true,
        }
    }

    /// Deliver into the mailbox; `false` for remote or dead entries.
    pub fn send(&self, message: M) -> bool {
        match &self.sender {
            Some(sender) => sender.try_send(message).is_ok(),
            None => false,
        }
    }
}

/// The tracker. Shared via `Arc`; all maps are node-local with remote
/// entries merged in through replication.
pub struct Tracker<M> {
    node: String,
    topics: RwLock<HashMap<Topic, HashMap<String, Vec<SessionHandle<M>>>>>,
    pubsub: Option<Arc<dyn PubSub>>,
}

impl<M: Send + 'static> Tracker<M> {
    pub fn new(node: impl Into<String>, pubsub: Option<Arc<dyn PubSub>>) -> Arc<Self> {
        let tracker = Arc::new(Self {
            node: node.into(),
            topics: RwLock::new(HashMap::new()),
            pubsub,
        });
        if tracker.pubsub.is_some() {
            Self::spawn_replication(&tracker);
        }
        tracker
    }

    pub fn node(&self) -> &str {
        &self.node
    }

    /// Whether a substrate is configured. Gates `resources/subscribe`,
    /// logging fan-out and the GET SSE stream in the capability
    /// advertisement.
    pub fn is_distributed(&self) -> bool {
        self.pubsub.is_some()
    }

    // ------------------------------------------------------------------
    // sessions
    // ------------------------------------------------------------------

    /// Track the owning process of a session. Fails when a live owner
    /// already exists anywhere in the cluster.
    pub async fn track_session(&self, handle: SessionHandle<M>) -> Result<(), TrackerError> {
        let key = handle.owner.clone();
        let metadata = handle.metadata.clone();
        {
            let mut topics = self.topics.write().await;
            let sessions = topics.entry(Topic::Sessions).or_default();
            let entries = sessions.entry(key.clone()).or_default();
            entries.retain(|e| e.is_alive());
            if !entries.is_empty() {
                return Err(TrackerError::AlreadyTracked(key));
            }
            entries.push(handle);
        }
        self.publish_diff(DiffAction::Join, Topic::Sessions, &key, metadata)
            .await;
        Ok(())
    }

    /// First live owner for a session id, pruning dead entries on the way.
    pub async fn get_session(&self, session_id: &str) -> Option<SessionHandle<M>> {
        self.get_first_live(Topic::Sessions, session_id).await
    }

    pub async fn untrack_session(&self, session_id: &str) {
        self.remove_key(Topic::Sessions, session_id).await;
        self.publish_diff(DiffAction::Leave, Topic::Sessions, session_id, Value::Null)
            .await;
    }

    /// Atomically claim the one SSE stream slot of a session. The second
    /// claimer gets `AlreadyTracked`, which HTTP surfaces as 409.
    pub async fn claim_stream(&self, session_id: &str) -> Result<(), TrackerError> {
        let metadata = {
            let mut topics = self.topics.write().await;
            let entries = topics
                .entry(Topic::Sessions)
                .or_default()
                .entry(session_id.to_string())
                .or_default();
            entries.retain(|e| e.is_alive());
            let entry = entries
                .iter_mut()
                .next()
                .ok_or_else(|| TrackerError::NotFound(session_id.to_string()))?;
            if entry.metadata.get("stream").and_then(Value::as_bool) == Some(true) {
                return Err(TrackerError::AlreadyTracked(session_id.to_string()));
            }
            if let Value::Object(map) = &mut entry.metadata {
                map.insert("stream".to_string(), Value::Bool(true));
            } else {
                entry.metadata = serde_json::json!({ "stream": true });
            }
            entry.metadata.clone()
        };
        self.publish_diff(DiffAction::Join, Topic::Sessions, session_id, metadata)
            .await;
        Ok(())
    }

    /// Release the stream slot (stream closed but session still alive).
    pub async fn release_stream(&self, session_id: &str) {
        let metadata = {
            let mut topics = self.topics.write().await;
            let entries = match topics
                .get_mut(&Topic::Sessions)
                .and_then(|m| m.get_mut(session_id))
            {
                Some(entries) => entries,
                None => return,
            };
            let entry = match entries.iter_mut().next() {
                Some(entry) => entry,
                None => return,
            };
            if let Value::Object(map) = &mut entry.metadata {
                map.insert("stream".to_string(), Value::Bool(false));
            }
            entry.metadata.clone()
        };
        self.publish_diff(DiffAction::Join, Topic::Sessions, session_id, metadata)
            .await;
    }

    /// All live local session handles, for list-changed fan-out.
    pub async fn local_sessions(&self) -> Vec<SessionHandle<M>> {
        let topics = self.topics.read().await;
        topics
            .get(&Topic::Sessions)
            .map(|sessions| {
                sessions
                    .values()
                    .flatten()
                    .filter(|e| e.is_local() && e.is_alive())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    // ------------------------------------------------------------------
    // requests (URL-elicitation correlation)
    // ------------------------------------------------------------------

    pub async fn track_request(&self, request_id: &str, handle: SessionHandle<M>) {
        let metadata = handle.metadata.clone();
        {
            let mut topics = self.topics.write().await;
            topics
                .entry(Topic::Requests)
                .or_default()
                .insert(request_id.to_string(), vec![handle]);
        }
        self.publish_diff(DiffAction::Join, Topic::Requests, request_id, metadata)
            .await;
    }

    pub async fn get_request(&self, request_id: &str) -> Option<SessionHandle<M>> {
        self.get_first_live(Topic::Requests, request_id).await
    }

    pub async fn untrack_request(&self, request_id: &str) {
        self.remove_key(Topic::Requests, request_id).await;
        self.publish_diff(DiffAction::Leave, Topic::Requests, request_id, Value::Null)
            .await;
    }

    // ------------------------------------------------------------------
    // resources (subscriptions)
    // ------------------------------------------------------------------

    /// Subscribe a session to a resource URI. Needs the substrate: update
    /// events originate on arbitrary nodes.
    pub async fn subscribe_resource(
        &self,
        uri: &str,
        handle: SessionHandle<M>,
    ) -> Result<(), TrackerError> {
        if self.pubsub.is_none() {
            return Err(TrackerError::NotAvailable);
        }
        let metadata = handle.metadata.clone();
        {
            let mut topics = self.topics.write().await;
            let entries = topics
                .entry(Topic::Resources)
                .or_default()
                .entry(uri.to_string())
                .or_default();
            entries.retain(|e| e.is_alive() && e.owner != handle.owner);
            entries.push(handle);
        }
        self.publish_diff(DiffAction::Join, Topic::Resources, uri, metadata)
            .await;
        Ok(())
    }

    pub async fn unsubscribe_resource(&self, uri: &str, session_id: &str) {
        let mut topics = self.topics.write().await;
        if let Some(entries) = topics
            .get_mut(&Topic::Resources)
            .and_then(|m| m.get_mut(uri))
        {
            entries.retain(|e| e.owner != session_id && e.is_alive());
        }
    }

    /// Live local subscribers of a URI.
    pub async fn subscribers(&self, uri: &str) -> Vec<SessionHandle<M>> {
        let mut topics = self.topics.write().await;
        match topics.get_mut(&Topic::Resources).and_then(|m| m.get_mut(uri)) {
            Some(entries) => {
                entries.retain(|e| e.is_alive());
                entries.iter().filter(|e| e.is_local()).cloned().collect()
            }
            None => Vec::new(),
        }
    }

    /// Drop everything a session owns across all topics. Called on session
    /// termination.
    pub async fn untrack_owner(&self, session_id: &str) {
        {
            let mut topics = self.topics.write().await;
            for map in topics.values_mut() {
                map.retain(|_, entries| {
                    entries.retain(|e| e.owner != session_id);
                    !entries.is_empty()
                });
            }
        }
        self.publish_diff(DiffAction::Leave, Topic::Sessions, session_id, Value::Null)
            .await;
    }

    // ------------------------------------------------------------------
    // cluster events
    // ------------------------------------------------------------------

    /// Publish an application event (resource update, list change) to every
    /// node, including this one.
    pub async fn publish_event(&self, payload: Value) -> Result<(), TrackerError> {
        match &self.pubsub {
            Some(pubsub) => pubsub.publish(EVENTS_TOPIC, payload).await,
            None => Err(TrackerError::NotAvailable),
        }
    }

    /// Receiver of application events; `None` without a substrate.
    pub fn subscribe_events(&self) -> Option<broadcast::Receiver<Value>> {
        self.pubsub.as_ref().map(|p| p.subscribe(EVENTS_TOPIC))
    }

    // ------------------------------------------------------------------
    // internals
    // ------------------------------------------------------------------

    async fn get_first_live(&self, topic: Topic, key: &str) -> Option<SessionHandle<M>>
    where
        M: Send,
    {
        let mut topics = self.topics.write().await;
        let map = topics.get_mut(&topic)?;
        let entries = map.get_mut(key)?;
        let before = entries.len();
        entries.retain(|e| e.is_alive());
        if entries.len() < before {
            debug!(topic = topic.as_str(), key, "untracked dead entries during lookup");
        }
        if entries.is_empty() {
            map.remove(key);
            return None;
        }
        Some(entries[0].clone())
    }

    async fn remove_key(&self, topic: Topic, key: &str) {
        let mut topics = self.topics.write().await;
        if let Some(map) = topics.get_mut(&topic) {
            map.remove(key);
        }
    }

    async fn publish_diff(&self, action: DiffAction, topic: Topic, key: &str, metadata: Value) {
        let Some(pubsub) = &self.pubsub else { return };
        let diff = TrackerDiff {
            action,
            topic: topic.as_str().to_string(),
            key: key.to_string(),
            node: self.node.clone(),
            metadata,
        };
        let payload = match serde_json::to_value(&diff) {
            Ok(payload) => payload,
            Err(err) => {
                warn!("failed to encode tracker diff: {}", err);
                return;
            }
        };
        if let Err(err) = pubsub.publish(DIFFS_TOPIC, payload).await {
            warn!("failed to publish tracker diff: {}", err);
        }
    }

    fn spawn_replication(tracker: &Arc<Self>) {
        let Some(pubsub) = tracker.pubsub.clone() else { return };
        let mut receiver = pubsub.subscribe(DIFFS_TOPIC);
        let tracker = Arc::downgrade(tracker);
        tokio::spawn(async move {
            loop {
                let payload = match receiver.recv().await {
                    Ok(payload) => payload,
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "tracker replication lagged");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                let Some(tracker) = tracker.upgrade() else { break };
                let Ok(diff) = serde_json::from_value::<TrackerDiff>(payload) else {
                    continue;
                };
                if diff.node == tracker.node {
                    continue;
                }
                tracker.apply_remote_diff(diff).await;
            }
        });
    }

    async fn apply_remote_diff(&self, diff: TrackerDiff) {
        let Some(topic) = Topic::parse(&diff.topic) else { return };
        let mut topics = self.topics.write().await;
        let map = topics.entry(topic).or_default();
        match diff.action {
            DiffAction::Join => {
                let entries = map.entry(diff.key.clone()).or_default();
                entries.retain(|e| e.node != diff.node);
                entries.push(SessionHandle::remote(diff.key, diff.node, diff.metadata));
            }
            DiffAction::Leave => {
                if let Some(entries) = map.get_mut(&diff.key) {
                    entries.retain(|e| e.node != diff.node);
                    if entries.is_empty() {
                        map.remove(&diff.key);
                    }
                }
            }
        }
    }
}
