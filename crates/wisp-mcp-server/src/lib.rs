//! # wisp-mcp-server
//!
//! The framework core: a per-session event loop multiplexing request
//! dispatch, async replies, log and progress notifications, resource
//! updates, elicitation and timeouts over a single client stream, plus the
//! registry/validator/dispatch machinery behind it.
//!
//! An application builds a [`Router`] (tools, prompts, resource templates,
//! lifecycle callbacks), wraps it in a [`ServerCore`], and hands the core
//! to a transport: `wisp-http-mcp-server` for Streamable HTTP, or
//! [`stdio::StdioTransport`] for line-delimited JSON on a byte-stream pair.

pub mod core;
pub mod dispatcher;
pub mod frame;
pub mod prompt;
pub mod registry;
pub mod resource;
pub mod router;
pub mod session;
pub mod stdio;
pub mod tool;
pub mod uri_template;
pub mod validator;

pub use self::core::{CoreOptions, ServerCore};
pub use frame::{Frame, FrameEvent};
pub use prompt::{PromptHandler, PromptSpec};
pub use registry::{Registry, RegistryError};
pub use resource::{ResourceHandler, ResourceTemplateSpec};
pub use router::{
    AuthHeader, ConnectAccept, ConnectDecision, ConnectInfo, ConnectReject, Router, RouterBuilder,
    TransportKind,
};
pub use session::{
    HandlerResult, OpenedSession, RequestMeta, Session, SessionContext, SessionMessage,
    DEFAULT_ELICITATION_TIMEOUT,
};
pub use stdio::{LogTarget, StdioTransport};
pub use tool::{completion_fn, CompletionHandler, ToolHandler, ToolSpec};
pub use uri_template::UriTemplate;

pub use wisp_mcp_protocol::{McpError, McpResult};
