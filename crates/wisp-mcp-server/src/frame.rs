//! Outbound frames.
//!
//! Everything a session says to its client is one of these; the transport
//! decides how to put it on the wire (SSE event or stdout line). Frames for
//! one session are produced only by the session task, which is what makes
//! the per-session total order hold.

use serde_json::Value;

use wisp_mcp_json_rpc::{JsonRpcError, JsonRpcMessage, JsonRpcNotification, RequestId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameEvent {
    /// A reply, error or notification envelope
    Message,
    /// Terminal frame; data carries the reason
    Closed,
    /// Keep-alive
    Ping,
}

impl FrameEvent {
    pub fn name(&self) -> &'static str {
        match self {
            FrameEvent::Message => "message",
            FrameEvent::Closed => "closed",
            FrameEvent::Ping => "ping",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Frame {
    /// Echoes the request id for replies; blank for notifications
    pub id: Option<RequestId>,
    pub event: FrameEvent,
    pub data: Option<Value>,
}

impl Frame {
    /// Terminal frame for a request: success or error envelope.
    pub fn message(message: JsonRpcMessage) -> Self {
        let id = message.id().cloned();
        Self {
            id,
            event: FrameEvent::Message,
            data: serde_json::to_value(&message).ok(),
        }
    }

    pub fn error(error: JsonRpcError) -> Self {
        Self {
            id: error.id.clone(),
            event: FrameEvent::Message,
            data: serde_json::to_value(&error).ok(),
        }
    }

    /// A server-initiated notification (no id).
    pub fn notification(notification: JsonRpcNotification) -> Self {
        Self {
            id: None,
            event: FrameEvent::Message,
            data: serde_json::to_value(&notification).ok(),
        }
    }

    /// A server-initiated request (elicitation) carrying its own fresh id.
    pub fn request(id: RequestId, envelope: Value) -> Self {
        Self {
            id: Some(id),
            event: FrameEvent::Message,
            data: Some(envelope),
        }
    }

    pub fn closed(reason: &str) -> Self {
        Self {
            id: None,
            event: FrameEvent::Closed,
            data: Some(serde_json::json!({ "reason": reason })),
        }
    }

    pub fn ping() -> Self {
        Self {
            id: None,
            event: FrameEvent::Ping,
            data: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.event == FrameEvent::Closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wisp_mcp_json_rpc::JsonRpcResponse;

    #[test]
    fn test_message_frame_echoes_id() {
        let frame = Frame::message(JsonRpcResponse::new(RequestId::Number(1), json!({})).into());
        assert_eq!(frame.id, Some(RequestId::Number(1)));
        assert_eq!(frame.event.name(), "message");
        assert_eq!(frame.data.unwrap()["jsonrpc"], "2.0");
    }

    #[test]
    fn test_closed_frame_reason() {
        let frame = Frame::closed("inactivity");
        assert!(frame.is_terminal());
        assert_eq!(frame.data.unwrap()["reason"], "inactivity");
    }

    #[test]
    fn test_ping_frame_has_no_data() {
        let frame = Frame::ping();
        assert!(frame.data.is_none());
        assert_eq!(frame.event.name(), "ping");
    }
}
