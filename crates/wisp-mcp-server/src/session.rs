//! The per-session event loop.
//!
//! One tokio task owns everything a session is: the pending-request map,
//! allow-lists, assigns, log level, elicitation callers and the outbound
//! stream. Events arrive through a single mailbox and are processed one at
//! a time, so state needs no locks and outbound frames are totally ordered
//! by the order events were handled.
//!
//! Parallelism exists only across sessions. Handlers run inline on the
//! session task; a handler that wants concurrency spawns its own task,
//! returns [`HandlerResult::NoReply`] and later resolves the request with
//! [`SessionContext::reply`].

use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{RwLock, mpsc, oneshot};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::core::ServerCore;
use crate::dispatcher;
use crate::frame::Frame;
use crate::router::{ConnectDecision, ConnectInfo, ConnectReject, TransportKind};
use wisp_mcp_json_rpc::{IncomingItem, JsonRpcRequest, RequestId};
use wisp_mcp_protocol::elicitation::{ElicitResult, Elicitation};
use wisp_mcp_protocol::logging::{LoggingLevel, LoggingMessageParams};
use wisp_mcp_protocol::notifications::{self, ListKind, ProgressParams};
use wisp_mcp_protocol::{ClientCapabilities, Implementation, McpError, McpResult};

/// How long a blocked elicitation waits for the client's reply.
pub const DEFAULT_ELICITATION_TIMEOUT: Duration = Duration::from_secs(300);

const MAILBOX_CAPACITY: usize = 256;

/// The parsed request record handlers receive alongside their params.
#[derive(Debug, Clone)]
pub struct RequestMeta {
    pub id: RequestId,
    pub method: String,
    pub params: Option<Value>,
    pub progress_token: Option<Value>,
}

impl From<&JsonRpcRequest> for RequestMeta {
    fn from(request: &JsonRpcRequest) -> Self {
        Self {
            id: request.id.clone(),
            method: request.method.clone(),
            params: request.params.clone(),
            progress_token: request.progress_token().cloned(),
        }
    }
}

/// What a handler returns: a reply now, a deferred reply, or an error.
/// Elicitation-required surfaces as `Error(McpError::ElicitationRequired)`.
#[derive(Debug)]
pub enum HandlerResult {
    Reply(Value),
    NoReply,
    Error(McpError),
}

impl HandlerResult {
    /// Serialize a result type into a reply.
    pub fn reply<T: Serialize>(value: T) -> Self {
        match serde_json::to_value(value) {
            Ok(value) => HandlerResult::Reply(value),
            Err(err) => HandlerResult::Error(McpError::from(err)),
        }
    }

    pub fn error(err: McpError) -> Self {
        HandlerResult::Error(err)
    }
}

/// Everything a session can be told.
#[derive(Debug)]
pub enum SessionMessage {
    /// A batch of inbound envelopes plus the stream their replies go to
    Dispatch {
        items: Vec<IncomingItem>,
        reply_to: mpsc::Sender<Frame>,
    },
    /// A deferred reply from a handler's background task
    AsyncReply {
        id: RequestId,
        result: McpResult<Value>,
    },
    Log {
        params: LoggingMessageParams,
    },
    Progress {
        token: Option<Value>,
        progress: f64,
        total: Option<f64>,
        message: Option<String>,
    },
    Ping,
    ResourceUpdated {
        uri: String,
    },
    ListChanged {
        kind: ListKind,
    },
    SetLogLevel {
        level: LoggingLevel,
    },
    /// Server-initiated elicitation; the responder is released when the
    /// correlated client response arrives
    Elicit {
        elicitation: Elicitation,
        responder: oneshot::Sender<ElicitResult>,
    },
    /// A client response routed in from another connection or an external
    /// URL-elicitation callback
    ElicitResponse {
        id: RequestId,
        result: ElicitResult,
    },
    /// A GET stream became the session's long-lived owner stream
    AttachStream {
        stream: mpsc::Sender<Frame>,
    },
    /// The stdio reader hit EOF or an error
    ReaderClosed,
    Finish,
    Terminate {
        reason: String,
    },
}

enum Flow {
    Continue,
    Stop,
}

/// Counts the deferred replies of one inbound batch; the `closed` frame for
/// the batch's stream goes out when the count drains.
pub(crate) struct BatchGate {
    remaining: AtomicUsize,
    reply_to: mpsc::Sender<Frame>,
}

impl BatchGate {
    pub(crate) fn new(reply_to: mpsc::Sender<Frame>) -> Arc<Self> {
        Arc::new(Self {
            remaining: AtomicUsize::new(0),
            reply_to,
        })
    }

    pub(crate) fn arm(&self, count: usize) {
        self.remaining.store(count, Ordering::Release);
    }

    pub(crate) fn complete_one(&self) {
        if self.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
            let _ = self.reply_to.try_send(Frame::closed("finished"));
        }
    }
}

pub(crate) struct PendingReply {
    pub reply_to: mpsc::Sender<Frame>,
    pub gate: Arc<BatchGate>,
}

/// Cheap handle into a session, given to handlers and background tasks.
#[derive(Clone)]
pub struct SessionContext {
    pub session_id: String,
    handle: mpsc::Sender<SessionMessage>,
    assigns: Arc<RwLock<HashMap<String, Value>>>,
}

impl SessionContext {
    pub fn handle(&self) -> mpsc::Sender<SessionMessage> {
        self.handle.clone()
    }

    pub async fn assign(&self, key: impl Into<String>, value: Value) {
        self.assigns.write().await.insert(key.into(), value);
    }

    pub async fn get_assign(&self, key: &str) -> Option<Value> {
        self.assigns.read().await.get(key).cloned()
    }

    /// Resolve a request that earlier returned `NoReply`. A send into a
    /// dead session is a no-op.
    pub fn reply(&self, id: RequestId, result: McpResult<Value>) {
        if self
            .handle
            .try_send(SessionMessage::AsyncReply { id, result })
            .is_err()
        {
            warn!(session = %self.session_id, "async reply dropped; session is gone");
        }
    }

    /// Emit a `notifications/message` frame, subject to the session's
    /// current log level.
    pub fn log(&self, level: LoggingLevel, data: Value) {
        let _ = self.handle.try_send(SessionMessage::Log {
            params: LoggingMessageParams::new(level, data),
        });
    }

    /// Emit `notifications/progress`; without a token the session degrades
    /// it to a ping.
    pub fn progress(
        &self,
        token: Option<Value>,
        progress: f64,
        total: Option<f64>,
        message: Option<String>,
    ) {
        let _ = self.handle.try_send(SessionMessage::Progress {
            token,
            progress,
            total,
            message,
        });
    }

    /// Server-initiated elicitation with the default five-minute budget.
    ///
    /// Blocks until the client answers on another connection, so this must
    /// be called from a handler's background task, never inline on the
    /// session task.
    pub async fn elicit(&self, elicitation: Elicitation) -> McpResult<ElicitResult> {
        self.elicit_with_timeout(elicitation, DEFAULT_ELICITATION_TIMEOUT)
            .await
    }

    pub async fn elicit_with_timeout(
        &self,
        elicitation: Elicitation,
        timeout: Duration,
    ) -> McpResult<ElicitResult> {
        let (responder, receiver) = oneshot::channel();
        self.handle
            .send(SessionMessage::Elicit {
                elicitation,
                responder,
            })
            .await
            .map_err(|_| McpError::Connection("session is gone".to_string()))?;
        match tokio::time::timeout(timeout, receiver).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(_)) => Err(McpError::Connection("session terminated".to_string())),
            Err(_) => Err(McpError::internal("elicitation timed out")),
        }
    }
}

pub(crate) struct SessionState {
    pub id: String,
    pub core: Arc<ServerCore>,
    pub handle: mpsc::Sender<SessionMessage>,
    pub stream: Option<mpsc::Sender<Frame>>,
    pub pending: HashMap<RequestId, PendingReply>,
    pub allow_tools: Option<HashSet<String>>,
    pub allow_prompts: Option<HashSet<String>>,
    pub allow_resources: Option<HashSet<String>>,
    pub assigns: Arc<RwLock<HashMap<String, Value>>>,
    pub client_capabilities: Option<ClientCapabilities>,
    pub client_info: Option<Implementation>,
    pub log_level: LoggingLevel,
    pub last_activity: Instant,
    pub close_after_complete: bool,
    pub initialized: bool,
    pending_elicitations: HashMap<RequestId, oneshot::Sender<ElicitResult>>,
    elicitation_ids: HashMap<RequestId, String>,
}

impl SessionState {
    pub(crate) fn context(&self) -> SessionContext {
        SessionContext {
            session_id: self.id.clone(),
            handle: self.handle.clone(),
            assigns: self.assigns.clone(),
        }
    }

    /// Write a frame to the owner stream; dropped with a warning when the
    /// session is unreachable.
    fn emit(&self, frame: Frame) {
        let delivered = match &self.stream {
            Some(stream) => stream.try_send(frame).is_ok(),
            None => false,
        };
        if !delivered {
            warn!(session = %self.id, "no live stream; dropping outbound frame");
        }
    }

    fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    async fn handle_message(&mut self, message: SessionMessage) -> Flow {
        match message {
            SessionMessage::Dispatch { items, reply_to } => {
                self.touch();
                // A POST-only session's most recent reply stream is also
                // where server-initiated frames go.
                if self.close_after_complete {
                    self.stream = Some(reply_to.clone());
                }
                dispatcher::process_batch(self, items, reply_to).await;
                Flow::Continue
            }
            SessionMessage::AsyncReply { id, result } => {
                self.touch();
                match self.pending.remove(&id) {
                    Some(pending) => {
                        let frame = match result {
                            Ok(value) => Frame::message(
                                wisp_mcp_json_rpc::JsonRpcResponse::new(id, value).into(),
                            ),
                            Err(err) => Frame::error(wisp_mcp_json_rpc::JsonRpcError::new(
                                Some(id),
                                err.to_error_object(),
                            )),
                        };
                        if pending.reply_to.send(frame).await.is_err() {
                            warn!(session = %self.id, "async reply dropped; stream is gone");
                        }
                        pending.gate.complete_one();
                    }
                    None => {
                        warn!(session = %self.id, %id, "async reply for unknown request id dropped");
                    }
                }
                if self.close_after_complete && self.pending.is_empty() {
                    // The batch gate already closed the stream.
                    return Flow::Stop;
                }
                Flow::Continue
            }
            SessionMessage::Log { params } => {
                if params.level.passes(self.log_level) {
                    self.emit(Frame::notification(notifications::log_message(&params)));
                }
                Flow::Continue
            }
            SessionMessage::Progress {
                token,
                progress,
                total,
                message,
            } => {
                match token {
                    Some(progress_token) => {
                        self.emit(Frame::notification(notifications::progress(&ProgressParams {
                            progress_token,
                            progress,
                            total,
                            message,
                        })));
                    }
                    None => self.emit(Frame::ping()),
                }
                Flow::Continue
            }
            SessionMessage::Ping => {
                self.emit(Frame::ping());
                Flow::Continue
            }
            SessionMessage::ResourceUpdated { uri } => {
                self.emit(Frame::notification(notifications::resource_updated(&uri)));
                Flow::Continue
            }
            SessionMessage::ListChanged { kind } => {
                // An allow-listed session's view is frozen.
                let unrestricted = match kind {
                    ListKind::Tools => self.allow_tools.is_none(),
                    ListKind::Prompts => self.allow_prompts.is_none(),
                    ListKind::Resources => self.allow_resources.is_none(),
                };
                if unrestricted {
                    self.emit(Frame::notification(notifications::list_changed(kind)));
                }
                Flow::Continue
            }
            SessionMessage::SetLogLevel { level } => {
                self.log_level = level;
                Flow::Continue
            }
            SessionMessage::Elicit {
                elicitation,
                responder,
            } => {
                self.start_elicitation(elicitation, responder).await;
                Flow::Continue
            }
            SessionMessage::ElicitResponse { id, result } => {
                self.resolve_elicitation(id, result).await;
                Flow::Continue
            }
            SessionMessage::AttachStream { stream } => {
                self.stream = Some(stream);
                self.close_after_complete = false;
                Flow::Continue
            }
            SessionMessage::ReaderClosed => {
                debug!(session = %self.id, "reader closed; terminating");
                self.core.router().run_terminate(self.id.clone()).await;
                Flow::Stop
            }
            SessionMessage::Finish => {
                self.emit(Frame::closed("finished"));
                Flow::Stop
            }
            SessionMessage::Terminate { reason } => {
                self.emit(Frame::closed(&reason));
                Flow::Stop
            }
        }
    }

    async fn start_elicitation(
        &mut self,
        elicitation: Elicitation,
        responder: oneshot::Sender<ElicitResult>,
    ) {
        let id = RequestId::String(format!("el-{}", Uuid::now_v7()));
        let envelope = serde_json::json!({
            "jsonrpc": "2.0",
            "id": id.clone(),
            "method": wisp_mcp_protocol::methods::ELICITATION_CREATE,
            "params": &elicitation,
        });

        // URL mode is correlated cluster-wide so an external callback can
        // complete it from any node.
        if let Some(elicitation_id) = &elicitation.elicitation_id {
            let handle = wisp_mcp_tracker::SessionHandle::local(
                self.id.clone(),
                self.core.tracker().node().to_string(),
                self.handle.clone(),
                serde_json::json!({ "jsonrpc_id": id.clone() }),
            );
            self.core
                .tracker()
                .track_request(elicitation_id, handle)
                .await;
            self.elicitation_ids.insert(id.clone(), elicitation_id.clone());
        }

        self.pending_elicitations.insert(id.clone(), responder);
        self.emit(Frame::request(id, envelope));
    }

    pub(crate) async fn resolve_elicitation(&mut self, id: RequestId, result: ElicitResult) {
        if let Some(elicitation_id) = self.elicitation_ids.remove(&id) {
            self.core.tracker().untrack_request(&elicitation_id).await;
        }
        match self.pending_elicitations.remove(&id) {
            Some(responder) => {
                let _ = responder.send(result);
            }
            None => warn!(session = %self.id, %id, "elicitation response without a caller"),
        }
    }
}

/// An opened session as seen by a transport.
pub struct OpenedSession {
    pub id: String,
    pub handle: mpsc::Sender<SessionMessage>,
}

pub struct Session;

impl Session {
    /// Run the connect callback, register with the tracker and start the
    /// session task. The returned handle is the session's mailbox.
    pub async fn open(
        core: Arc<ServerCore>,
        stream: mpsc::Sender<Frame>,
        close_after_complete: bool,
        transport: TransportKind,
        headers: HashMap<String, String>,
    ) -> Result<OpenedSession, ConnectReject> {
        let id = Uuid::now_v7().to_string();
        let info = ConnectInfo {
            session_id: id.clone(),
            transport,
            headers,
        };

        let accept = match core.router().run_connect(info).await {
            ConnectDecision::Accept(accept) => accept,
            ConnectDecision::Unauthorized(header) => {
                return Err(ConnectReject::Unauthorized(header));
            }
            ConnectDecision::Forbidden(message) => {
                return Err(ConnectReject::Forbidden(message));
            }
        };

        let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY);
        let state = SessionState {
            id: id.clone(),
            core: core.clone(),
            handle: tx.clone(),
            stream: Some(stream),
            pending: HashMap::new(),
            allow_tools: accept.allow_tools,
            allow_prompts: accept.allow_prompts,
            allow_resources: accept.allow_resources,
            assigns: Arc::new(RwLock::new(accept.assigns)),
            client_capabilities: None,
            client_info: None,
            log_level: LoggingLevel::Info,
            last_activity: Instant::now(),
            close_after_complete,
            initialized: false,
            pending_elicitations: HashMap::new(),
            elicitation_ids: HashMap::new(),
        };

        let handle = wisp_mcp_tracker::SessionHandle::local(
            id.clone(),
            core.tracker().node().to_string(),
            tx.clone(),
            serde_json::json!({ "stream": false }),
        );
        if let Err(err) = core.tracker().track_session(handle).await {
            error!(session = %id, "failed to track session: {}", err);
            return Err(ConnectReject::Forbidden(Some(
                "session id collision".to_string(),
            )));
        }

        tokio::spawn(run_loop(state, rx));
        debug!(session = %id, "session opened");
        Ok(OpenedSession { id, handle: tx })
    }
}

async fn run_loop(mut state: SessionState, mut rx: mpsc::Receiver<SessionMessage>) {
    let keepalive = state.core.keepalive_interval();
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + keepalive, keepalive);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            message = rx.recv() => match message {
                Some(message) => {
                    if let Flow::Stop = state.handle_message(message).await {
                        break;
                    }
                }
                None => break,
            },
            _ = ticker.tick() => {
                // Inactivity probe: close idle sessions with no in-flight
                // work, keep live ones warm with a ping.
                if state.pending.is_empty()
                    && state.last_activity.elapsed() >= state.core.session_timeout()
                {
                    state.emit(Frame::closed("inactivity"));
                    break;
                }
                state.emit(Frame::ping());
            }
        }
    }

    // Pending deferred replies are abandoned; background tasks sending into
    // the dead mailbox are no-ops.
    state.core.tracker().untrack_owner(&state.id).await;
    state.core.router().run_disconnect(state.id.clone()).await;
    debug!(session = %state.id, "session terminated");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handler_result_reply_serializes() {
        #[derive(Serialize)]
        struct Out {
            ok: bool,
        }
        match HandlerResult::reply(Out { ok: true }) {
            HandlerResult::Reply(value) => assert_eq!(value["ok"], true),
            other => panic!("expected reply, got {:?}", other),
        }
    }

    #[test]
    fn test_request_meta_extracts_progress_token() {
        let request = JsonRpcRequest::new(
            RequestId::Number(5),
            "tools/call",
            Some(serde_json::json!({"name": "t", "_meta": {"progressToken": 9}})),
        );
        let meta = RequestMeta::from(&request);
        assert_eq!(meta.progress_token, Some(serde_json::json!(9)));
    }
}
