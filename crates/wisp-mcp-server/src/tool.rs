//! Tool specs: a name, an input schema, a handler and an optional
//! completion function, registered on a router and surfaced through
//! `tools/list` / `tools/call`.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::Arc;

use crate::session::{HandlerResult, RequestMeta, SessionContext};
use wisp_mcp_protocol::{InputSchema, McpResult};

/// A tool implementation. `args` arrive validated and with defaults
/// injected per the tool's input schema.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(
        &self,
        args: Map<String, Value>,
        request: &RequestMeta,
        session: &SessionContext,
    ) -> HandlerResult;
}

/// Argument-value completion for prompts and resource templates.
#[async_trait]
pub trait CompletionHandler: Send + Sync {
    async fn complete(
        &self,
        argument: &str,
        value: &str,
        session: &SessionContext,
    ) -> McpResult<Vec<String>>;
}

struct FnTool<F>(F);

#[async_trait]
impl<F, Fut> ToolHandler for FnTool<F>
where
    F: Fn(Map<String, Value>, RequestMeta, SessionContext) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    async fn call(
        &self,
        args: Map<String, Value>,
        request: &RequestMeta,
        session: &SessionContext,
    ) -> HandlerResult {
        (self.0)(args, request.clone(), session.clone()).await
    }
}

struct FnCompletion<F>(F);

#[async_trait]
impl<F, Fut> CompletionHandler for FnCompletion<F>
where
    F: Fn(String, String) -> Fut + Send + Sync,
    Fut: Future<Output = McpResult<Vec<String>>> + Send + 'static,
{
    async fn complete(
        &self,
        argument: &str,
        value: &str,
        _session: &SessionContext,
    ) -> McpResult<Vec<String>> {
        (self.0)(argument.to_string(), value.to_string()).await
    }
}

/// Wrap a closure as a [`CompletionHandler`].
pub fn completion_fn<F, Fut>(f: F) -> Arc<dyn CompletionHandler>
where
    F: Fn(String, String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = McpResult<Vec<String>>> + Send + 'static,
{
    Arc::new(FnCompletion(f))
}

/// One registered tool
#[derive(Clone)]
pub struct ToolSpec {
    pub name: String,
    pub description: Option<String>,
    pub input: InputSchema,
    pub handler: Arc<dyn ToolHandler>,
}

impl ToolSpec {
    pub fn new<F, Fut>(name: impl Into<String>, input: InputSchema, handler: F) -> Self
    where
        F: Fn(Map<String, Value>, RequestMeta, SessionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: None,
            input,
            handler: Arc::new(FnTool(handler)),
        }
    }

    pub fn with_handler(
        name: impl Into<String>,
        input: InputSchema,
        handler: Arc<dyn ToolHandler>,
    ) -> Self {
        Self {
            name: name.into(),
            description: None,
            input,
            handler,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// The `tools/list` entry.
    pub fn descriptor(&self) -> Value {
        let mut entry = serde_json::json!({
            "name": self.name,
            "inputSchema": self.input.to_json_schema(),
        });
        if let Some(description) = &self.description {
            entry["description"] = Value::String(description.clone());
        }
        entry
    }
}

impl std::fmt::Debug for ToolSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolSpec")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish()
    }
}
