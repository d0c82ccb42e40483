//! The server core: one router, its registry catalog, the tracker, and the
//! cross-node fan-out glue. Transports share a single `Arc<ServerCore>`.

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::registry::{Registry, RegistryError};
use crate::router::Router;
use crate::session::SessionMessage;
use wisp_mcp_json_rpc::RequestId;
use wisp_mcp_protocol::elicitation::ElicitResult;
use wisp_mcp_protocol::notifications::ListKind;
use wisp_mcp_protocol::PageCursor;
use wisp_mcp_tracker::{PubSub, Tracker};

/// Recognized configuration, mirroring the transport-level options.
pub struct CoreOptions {
    /// Node name for tracker entries; random when unset
    pub node: Option<String>,
    /// Cluster substrate; `None` degrades to local-only
    pub pubsub: Option<Arc<dyn PubSub>>,
    /// Inactivity budget for idle sessions
    pub session_timeout: Duration,
    /// Keep-alive ping cadence on live streams
    pub keepalive_interval: Duration,
}

impl Default for CoreOptions {
    fn default() -> Self {
        Self {
            node: None,
            pubsub: None,
            session_timeout: Duration::from_secs(30 * 60),
            keepalive_interval: Duration::from_secs(30),
        }
    }
}

pub struct ServerCore {
    router: Arc<Router>,
    registry: Arc<Registry>,
    tracker: Arc<Tracker<SessionMessage>>,
    cursor: PageCursor,
    session_timeout: Duration,
    keepalive_interval: Duration,
    node: String,
}

impl ServerCore {
    pub fn new(router: Router, options: CoreOptions) -> Arc<Self> {
        let node = options
            .node
            .unwrap_or_else(|| format!("node-{}", Uuid::new_v4()));
        let registry = Arc::new(Registry::new());
        registry.register(&router);

        let tracker = Tracker::new(node.clone(), options.pubsub);
        let (key_hi, _) = Uuid::new_v4().as_u64_pair();

        let core = Arc::new(Self {
            router: Arc::new(router),
            registry,
            tracker,
            cursor: PageCursor::new(key_hi),
            session_timeout: options.session_timeout,
            keepalive_interval: options.keepalive_interval,
            node,
        });
        Self::spawn_event_listener(&core);
        core
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn tracker(&self) -> &Arc<Tracker<SessionMessage>> {
        &self.tracker
    }

    pub fn cursor(&self) -> &PageCursor {
        &self.cursor
    }

    pub fn session_timeout(&self) -> Duration {
        self.session_timeout
    }

    pub fn keepalive_interval(&self) -> Duration {
        self.keepalive_interval
    }

    // ------------------------------------------------------------------
    // runtime registry mutation, with list-changed fan-out
    // ------------------------------------------------------------------

    pub async fn add_tool(&self, spec: crate::tool::ToolSpec) -> Result<(), RegistryError> {
        self.registry.add_tool(&self.router, spec)?;
        self.notify_list_changed(ListKind::Tools).await;
        Ok(())
    }

    pub async fn add_prompt(&self, spec: crate::prompt::PromptSpec) -> Result<(), RegistryError> {
        self.registry.add_prompt(&self.router, spec)?;
        self.notify_list_changed(ListKind::Prompts).await;
        Ok(())
    }

    pub async fn add_resource(
        &self,
        spec: crate::resource::ResourceTemplateSpec,
    ) -> Result<(), RegistryError> {
        self.registry.add_template(&self.router, spec)?;
        self.notify_list_changed(ListKind::Resources).await;
        Ok(())
    }

    pub async fn remove(&self, kind: ListKind, name: &str) -> Result<bool, RegistryError> {
        let removed = self.registry.remove(self.router.name(), kind, name)?;
        if removed {
            self.notify_list_changed(kind).await;
        }
        Ok(removed)
    }

    // ------------------------------------------------------------------
    // broadcasts
    // ------------------------------------------------------------------

    /// List-changed: delivered to every local session (each drops it unless
    /// its allow-list for the kind is null) and replicated to other nodes.
    pub async fn notify_list_changed(&self, kind: ListKind) {
        for handle in self.tracker.local_sessions().await {
            handle.send(SessionMessage::ListChanged { kind });
        }
        let event = serde_json::json!({
            "type": "list_changed",
            "kind": kind,
            "node": self.node,
        });
        if let Err(err) = self.tracker.publish_event(event).await {
            debug!("list-changed not replicated: {}", err);
        }
    }

    /// Resource updated: delivered to local subscribers of the URI and
    /// replicated so other nodes can reach theirs.
    pub async fn notify_resource_updated(&self, uri: &str) {
        for handle in self.tracker.subscribers(uri).await {
            handle.send(SessionMessage::ResourceUpdated {
                uri: uri.to_string(),
            });
        }
        let event = serde_json::json!({
            "type": "resource_updated",
            "uri": uri,
            "node": self.node,
        });
        if let Err(err) = self.tracker.publish_event(event).await {
            debug!("resource-updated not replicated: {}", err);
        }
    }

    /// Complete a URL-mode elicitation from anywhere: locally when the
    /// session lives here, through the substrate otherwise. `true` when a
    /// target was found or the event was replicated.
    pub async fn complete_url_elicitation(
        &self,
        elicitation_id: &str,
        result: ElicitResult,
    ) -> bool {
        if let Some(handle) = self.tracker.get_request(elicitation_id).await {
            if handle.is_local() {
                if let Some(id) = handle
                    .metadata
                    .get("jsonrpc_id")
                    .and_then(RequestId::from_value)
                {
                    return handle.send(SessionMessage::ElicitResponse { id, result });
                }
                return false;
            }
        }
        let event = serde_json::json!({
            "type": "elicit_response",
            "elicitation_id": elicitation_id,
            "result": result,
            "node": self.node,
        });
        self.tracker.publish_event(event).await.is_ok()
    }

    // ------------------------------------------------------------------
    // cross-node event intake
    // ------------------------------------------------------------------

    fn spawn_event_listener(core: &Arc<Self>) {
        let Some(mut receiver) = core.tracker.subscribe_events() else {
            return;
        };
        let weak = Arc::downgrade(core);
        tokio::spawn(async move {
            loop {
                let payload = match receiver.recv().await {
                    Ok(payload) => payload,
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "event listener lagged");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                let Some(core) = weak.upgrade() else { break };
                core.handle_remote_event(payload).await;
            }
        });
    }

    async fn handle_remote_event(&self, payload: Value) {
        // The origin node already delivered locally.
        if payload.get("node").and_then(Value::as_str) == Some(self.node.as_str()) {
            return;
        }
        match payload.get("type").and_then(Value::as_str) {
            Some("list_changed") => {
                let Ok(kind) =
                    serde_json::from_value::<ListKind>(payload["kind"].clone())
                else {
                    return;
                };
                for handle in self.tracker.local_sessions().await {
                    handle.send(SessionMessage::ListChanged { kind });
                }
            }
            Some("resource_updated") => {
                let Some(uri) = payload.get("uri").and_then(Value::as_str) else {
                    return;
                };
                for handle in self.tracker.subscribers(uri).await {
                    if handle.is_local() {
                        handle.send(SessionMessage::ResourceUpdated {
                            uri: uri.to_string(),
                        });
                    }
                }
            }
            Some("elicit_response") => {
                let Some(elicitation_id) =
                    payload.get("elicitation_id").and_then(Value::as_str)
                else {
                    return;
                };
                let Ok(result) =
                    serde_json::from_value::<ElicitResult>(payload["result"].clone())
                else {
                    return;
                };
                if let Some(handle) = self.tracker.get_request(elicitation_id).await {
                    if handle.is_local() {
                        if let Some(id) = handle
                            .metadata
                            .get("jsonrpc_id")
                            .and_then(RequestId::from_value)
                        {
                            handle.send(SessionMessage::ElicitResponse { id, result });
                        }
                    }
                }
            }
            other => debug!(?other, "unknown tracker event ignored"),
        }
    }
}
