//! # JSON-RPC 2.0 Envelope Layer
//!
//! Transport-agnostic JSON-RPC 2.0 types for the wisp MCP framework: request,
//! response, notification and error envelopes, the MCP error-code taxonomy,
//! and batch intake (a body may be one object or an array of them).
//!
//! Handlers and dispatch live in `wisp-mcp-server`; this crate only knows how
//! to decode, build and serialize envelopes.

pub mod batch;
pub mod error;
pub mod notification;
pub mod request;
pub mod response;
pub mod types;

pub use batch::{IncomingItem, parse_body};
pub use error::{JsonRpcError, JsonRpcErrorCode, JsonRpcErrorObject};
pub use notification::JsonRpcNotification;
pub use request::JsonRpcRequest;
pub use response::{JsonRpcMessage, JsonRpcResponse};
pub use types::{JsonRpcVersion, RequestId};

/// JSON-RPC 2.0 version constant
pub const JSONRPC_VERSION: &str = "2.0";

/// Error codes used on the wire
pub mod error_codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;

    /// Connection-phase rejection (unauthorized, closed)
    pub const CONNECTION: i64 = -32000;
    /// URI did not match any template, or the handler returned nothing
    pub const RESOURCE_NOT_FOUND: i64 = -32002;
    /// Tool cannot proceed without client input
    pub const ELICITATION_REQUIRED: i64 = -32042;
}
