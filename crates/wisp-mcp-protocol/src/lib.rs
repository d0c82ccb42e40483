//! # MCP Protocol Types
//!
//! Wire-level types for the Model Context Protocol: initialization and
//! capability advertisement, content blocks, logging levels, elicitation,
//! completion, pagination cursors, notification parameter shapes, and the
//! input-schema DSL that tool/prompt arguments are validated against.
//!
//! The dispatch logic that uses these types lives in `wisp-mcp-server`.

pub mod completion;
pub mod content;
pub mod cursor;
pub mod elicitation;
pub mod error;
pub mod initialize;
pub mod logging;
pub mod methods;
pub mod notifications;
pub mod schema;

pub use completion::{CompleteParams, CompleteResult, CompletionRef, CompletionValues};
pub use content::{
    Content, CallToolResult, GetPromptResult, PromptMessage, ReadResourceResult, ResourceContents,
    ResourceLink,
};
pub use cursor::PageCursor;
pub use elicitation::{
    Elicitation, ElicitationAction, ElicitCreateParams, ElicitResult, ElicitationMode,
};
pub use error::{McpError, McpResult};
pub use initialize::{
    ClientCapabilities, Implementation, InitializeParams, InitializeResult, ServerCapabilities,
};
pub use logging::{LoggingLevel, LoggingMessageParams, SetLevelParams};
pub use schema::{CustomValidator, FieldKind, FieldSchema, InputSchema};

/// The single protocol revision this framework speaks.
pub const PROTOCOL_VERSION: &str = "2025-03-26";

/// Page size for list endpoints and completion values.
pub const PAGE_LIMIT: usize = 100;
