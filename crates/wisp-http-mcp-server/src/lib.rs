//! # wisp-http-mcp-server
//!
//! Streamable HTTP transport for the wisp MCP framework.
//!
//! - `POST /`: a JSON-RPC object or array; the response is an SSE stream
//!   of per-request `message` frames ending with a `closed` frame.
//! - `GET /`: the session's one long-lived SSE stream (requires a pub/sub
//!   substrate; a second stream for the same session gets 409).
//! - `DELETE /`: terminate the session.
//! - `OPTIONS /`: CORS preflight.

pub mod cors;
pub mod handler;
pub mod server;
pub mod sse;

pub use cors::OriginPolicy;
pub use handler::McpHttpHandler;
pub use server::HttpMcpServer;

pub const MCP_SESSION_HEADER: &str = "mcp-session-id";

/// Transport configuration. The router, pub/sub substrate and timeouts
/// live on [`wisp_mcp_server::CoreOptions`]; this covers the HTTP surface.
#[derive(Clone)]
pub struct ServerConfig {
    pub origins: OriginPolicy,
    /// Disable to skip origin validation entirely (e.g. behind a gateway
    /// that already enforces it)
    pub validate_origin: bool,
    /// POST bodies above this many bytes get 413
    pub max_request_size: usize,
    /// Bind address for [`HttpMcpServer::serve`]
    pub bind_addr: std::net::SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            origins: OriginPolicy::Any,
            validate_origin: true,
            max_request_size: 4 * 1024 * 1024,
            bind_addr: ([127, 0, 0, 1], 8080).into(),
        }
    }
}
