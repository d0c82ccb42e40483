//! The HTTP request handler: intake checks, session lookup/creation, and
//! SSE response assembly for POST / GET / DELETE / OPTIONS.

use bytes::Bytes;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full, StreamBody};
use hyper::header::{CACHE_CONTROL, CONTENT_TYPE, HeaderValue};
use hyper::{HeaderMap, Method, Request, Response, StatusCode};
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::cors;
use crate::sse;
use crate::{MCP_SESSION_HEADER, ServerConfig};
use wisp_mcp_json_rpc::{JsonRpcError, JsonRpcErrorObject, parse_body};
use wisp_mcp_server::{
    ConnectReject, Frame, ServerCore, Session, SessionMessage, TransportKind,
};
use wisp_mcp_tracker::TrackerError;

pub type HttpResponse = Response<UnsyncBoxBody<Bytes, Infallible>>;

const FRAME_CHANNEL_CAPACITY: usize = 256;

pub struct McpHttpHandler {
    core: Arc<ServerCore>,
    config: ServerConfig,
}

impl McpHttpHandler {
    pub fn new(core: Arc<ServerCore>, config: ServerConfig) -> Self {
        Self { core, config }
    }

    pub fn core(&self) -> &Arc<ServerCore> {
        &self.core
    }

    /// Handle one request. Never errors; every failure mode is a response.
    pub async fn handle<B>(&self, req: Request<B>) -> HttpResponse
    where
        B: http_body::Body,
        B::Error: std::fmt::Display,
    {
        let origin = header_string(req.headers(), "origin");
        let method = req.method().clone();

        if method == Method::OPTIONS {
            return self.preflight(origin.as_deref());
        }

        if self.config.validate_origin && !self.config.origins.allows(origin.as_deref()) {
            warn!(?origin, "origin rejected");
            return error_response(
                StatusCode::FORBIDDEN,
                JsonRpcError::invalid_request(None, Some("Origin not allowed".to_string())),
                origin.as_deref(),
                None,
            );
        }

        match method {
            Method::POST => self.handle_post(req, origin.as_deref()).await,
            Method::GET => self.handle_get(req, origin.as_deref()).await,
            Method::DELETE => self.handle_delete(req, origin.as_deref()).await,
            _ => {
                let mut response = error_response(
                    StatusCode::METHOD_NOT_ALLOWED,
                    JsonRpcError::invalid_request(None, Some("Method not allowed".to_string())),
                    origin.as_deref(),
                    None,
                );
                response
                    .headers_mut()
                    .insert("Allow", HeaderValue::from_static("GET, POST, DELETE, OPTIONS"));
                response
            }
        }
    }

    fn preflight(&self, origin: Option<&str>) -> HttpResponse {
        if self.config.validate_origin && !self.config.origins.allows(origin) {
            return error_response(
                StatusCode::FORBIDDEN,
                JsonRpcError::invalid_request(None, Some("Origin not allowed".to_string())),
                origin,
                None,
            );
        }
        let mut response = Response::builder()
            .status(StatusCode::NO_CONTENT)
            .body(empty_body())
            .expect("static response");
        cors::apply_preflight_headers(response.headers_mut(), origin);
        response
    }

    async fn handle_post<B>(&self, req: Request<B>, origin: Option<&str>) -> HttpResponse
    where
        B: http_body::Body,
        B::Error: std::fmt::Display,
    {
        let content_type = header_string(req.headers(), CONTENT_TYPE.as_str()).unwrap_or_default();
        if !content_type.starts_with("application/json") {
            return error_response(
                StatusCode::BAD_REQUEST,
                JsonRpcError::invalid_request(
                    None,
                    Some("Content-Type must be application/json".to_string()),
                ),
                origin,
                None,
            );
        }

        if let Some(length) = req
            .headers()
            .get("content-length")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<usize>().ok())
        {
            if length > self.config.max_request_size {
                return too_large(origin);
            }
        }

        let session_header = header_string(req.headers(), MCP_SESSION_HEADER);
        let headers = plain_headers(req.headers());

        let body = match req.into_body().collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(err) => {
                return error_response(
                    StatusCode::BAD_REQUEST,
                    JsonRpcError::invalid_request(
                        None,
                        Some(format!("Failed to read request body: {}", err)),
                    ),
                    origin,
                    None,
                );
            }
        };
        if body.len() > self.config.max_request_size {
            return too_large(origin);
        }

        let body = match std::str::from_utf8(&body) {
            Ok(body) => body,
            Err(_) => {
                return error_response(
                    StatusCode::BAD_REQUEST,
                    JsonRpcError::parse_error(),
                    origin,
                    None,
                );
            }
        };

        let items = match parse_body(body) {
            Ok(items) => items,
            Err(err) => {
                return error_response(StatusCode::BAD_REQUEST, err, origin, None);
            }
        };

        let (frame_tx, frame_rx) = mpsc::channel::<Frame>(FRAME_CHANNEL_CAPACITY);

        let session_id = match session_header {
            Some(session_id) => {
                let Some(handle) = self.core.tracker().get_session(&session_id).await else {
                    return unknown_session(origin);
                };
                if !handle.send(SessionMessage::Dispatch {
                    items,
                    reply_to: frame_tx,
                }) {
                    return unknown_session(origin);
                }
                session_id
            }
            None => {
                // First request of a conversation: create the session.
                let opened = match Session::open(
                    self.core.clone(),
                    frame_tx.clone(),
                    true,
                    TransportKind::Http,
                    headers,
                )
                .await
                {
                    Ok(opened) => opened,
                    Err(reject) => return rejection_response(reject, origin),
                };
                if opened
                    .handle
                    .send(SessionMessage::Dispatch {
                        items,
                        reply_to: frame_tx,
                    })
                    .await
                    .is_err()
                {
                    return unknown_session(origin);
                }
                opened.id
            }
        };

        debug!(session = %session_id, "POST stream opened");
        sse_response(StatusCode::OK, &session_id, origin, frame_rx, None)
    }

    async fn handle_get<B>(&self, req: Request<B>, origin: Option<&str>) -> HttpResponse {
        if !self.core.tracker().is_distributed() {
            let mut response = error_response(
                StatusCode::METHOD_NOT_ALLOWED,
                JsonRpcError::invalid_request(
                    None,
                    Some("SSE stream requires a pub/sub substrate".to_string()),
                ),
                origin,
                None,
            );
            response
                .headers_mut()
                .insert("Allow", HeaderValue::from_static("POST, DELETE, OPTIONS"));
            return response;
        }

        let Some(session_id) = header_string(req.headers(), MCP_SESSION_HEADER) else {
            return error_response(
                StatusCode::BAD_REQUEST,
                JsonRpcError::invalid_request(None, Some("Missing mcp-session-id".to_string())),
                origin,
                None,
            );
        };

        let Some(handle) = self.core.tracker().get_session(&session_id).await else {
            return unknown_session(origin);
        };

        match self.core.tracker().claim_stream(&session_id).await {
            Ok(()) => {}
            Err(TrackerError::AlreadyTracked(_)) => {
                return error_response(
                    StatusCode::CONFLICT,
                    JsonRpcError::new(
                        None,
                        JsonRpcErrorObject::connection(
                            "Only one SSE stream is allowed per session",
                        ),
                    ),
                    origin,
                    Some(&session_id),
                );
            }
            Err(_) => return unknown_session(origin),
        }

        let (frame_tx, frame_rx) = mpsc::channel::<Frame>(FRAME_CHANNEL_CAPACITY);
        if !handle.send(SessionMessage::AttachStream { stream: frame_tx }) {
            self.core.tracker().release_stream(&session_id).await;
            return unknown_session(origin);
        }

        debug!(session = %session_id, "GET stream opened");
        let guard = StreamSlotGuard {
            core: self.core.clone(),
            session_id: session_id.clone(),
        };
        sse_response(
            StatusCode::ACCEPTED,
            &session_id,
            origin,
            frame_rx,
            Some(guard),
        )
    }

    async fn handle_delete<B>(&self, req: Request<B>, origin: Option<&str>) -> HttpResponse {
        let Some(session_id) = header_string(req.headers(), MCP_SESSION_HEADER) else {
            return error_response(
                StatusCode::BAD_REQUEST,
                JsonRpcError::invalid_request(None, Some("Missing mcp-session-id".to_string())),
                origin,
                None,
            );
        };

        let Some(handle) = self.core.tracker().get_session(&session_id).await else {
            return unknown_session(origin);
        };

        let terminated_ok = self.core.router().run_terminate(session_id.clone()).await;
        handle.send(SessionMessage::Terminate {
            reason: "terminate".to_string(),
        });
        self.core.tracker().untrack_session(&session_id).await;

        let status = if terminated_ok {
            StatusCode::OK
        } else {
            StatusCode::NO_CONTENT
        };
        debug!(session = %session_id, %status, "session deleted");

        let mut response = Response::builder()
            .status(status)
            .body(empty_body())
            .expect("static response");
        cors::apply_cors_headers(response.headers_mut(), origin);
        if let Ok(value) = HeaderValue::from_str(&session_id) {
            response.headers_mut().insert(MCP_SESSION_HEADER, value);
        }
        response
    }
}

/// Releases a session's GET stream slot when the response body is dropped,
/// whether the stream completed or the client vanished mid-flight.
struct StreamSlotGuard {
    core: Arc<ServerCore>,
    session_id: String,
}

impl Drop for StreamSlotGuard {
    fn drop(&mut self) {
        let core = self.core.clone();
        let session_id = std::mem::take(&mut self.session_id);
        tokio::spawn(async move {
            core.tracker().release_stream(&session_id).await;
            debug!(session = %session_id, "GET stream slot released");
        });
    }
}

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

fn plain_headers(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.as_str().to_string(), value.to_string()))
        })
        .collect()
}

fn empty_body() -> UnsyncBoxBody<Bytes, Infallible> {
    Full::new(Bytes::new()).boxed_unsync()
}

fn json_body(value: &impl serde::Serialize) -> UnsyncBoxBody<Bytes, Infallible> {
    let bytes = serde_json::to_vec(value).unwrap_or_default();
    Full::new(Bytes::from(bytes)).boxed_unsync()
}

fn error_response(
    status: StatusCode,
    error: JsonRpcError,
    origin: Option<&str>,
    session_id: Option<&str>,
) -> HttpResponse {
    let mut response = Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "application/json")
        .body(json_body(&error))
        .expect("static response");
    cors::apply_cors_headers(response.headers_mut(), origin);
    if let Some(value) = session_id.and_then(|id| HeaderValue::from_str(id).ok()) {
        response.headers_mut().insert(MCP_SESSION_HEADER, value);
    }
    response
}

fn too_large(origin: Option<&str>) -> HttpResponse {
    error_response(
        StatusCode::PAYLOAD_TOO_LARGE,
        JsonRpcError::invalid_request(None, Some("Request body too large".to_string())),
        origin,
        None,
    )
}

fn unknown_session(origin: Option<&str>) -> HttpResponse {
    error_response(
        StatusCode::NOT_FOUND,
        JsonRpcError::invalid_request(None, Some("Unknown session".to_string())),
        origin,
        None,
    )
}

fn rejection_response(reject: ConnectReject, origin: Option<&str>) -> HttpResponse {
    match reject {
        ConnectReject::Unauthorized(header) => {
            let mut response = error_response(
                StatusCode::UNAUTHORIZED,
                JsonRpcError::new(None, JsonRpcErrorObject::connection("Unauthorized")),
                origin,
                None,
            );
            if let Some(value) = header
                .map(|h| h.to_header_value())
                .and_then(|v| HeaderValue::from_str(&v).ok())
            {
                response.headers_mut().insert("WWW-Authenticate", value);
            }
            response
        }
        ConnectReject::Forbidden(message) => error_response(
            StatusCode::FORBIDDEN,
            JsonRpcError::new(
                None,
                JsonRpcErrorObject::connection(message.as_deref().unwrap_or("Forbidden")),
            ),
            origin,
            None,
        ),
    }
}

/// Build the chunked SSE response: frames stream until the terminal
/// `closed` frame (inclusive) or the session goes away.
fn sse_response(
    status: StatusCode,
    session_id: &str,
    origin: Option<&str>,
    mut frames: mpsc::Receiver<Frame>,
    guard: Option<StreamSlotGuard>,
) -> HttpResponse {
    let stream = async_stream::stream! {
        let _guard = guard;
        while let Some(frame) = frames.recv().await {
            let terminal = frame.is_terminal();
            let formatted = sse::format_frame(&frame);
            yield Ok::<_, Infallible>(http_body::Frame::data(Bytes::from(formatted)));
            if terminal {
                break;
            }
        }
    };

    let mut response = Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "text/event-stream")
        .header(CACHE_CONTROL, "no-cache")
        .header("connection", "keep-alive")
        .header("x-accel-buffering", "no")
        .body(StreamBody::new(stream).boxed_unsync())
        .expect("static response");
    cors::apply_cors_headers(response.headers_mut(), origin);
    if let Ok(value) = HeaderValue::from_str(session_id) {
        response.headers_mut().insert(MCP_SESSION_HEADER, value);
    }
    response
}
