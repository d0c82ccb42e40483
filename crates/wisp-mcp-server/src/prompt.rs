//! Prompt specs, surfaced through `prompts/list` / `prompts/get`.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::Arc;

use crate::session::{HandlerResult, RequestMeta, SessionContext};
use crate::tool::CompletionHandler;
use wisp_mcp_protocol::{FieldSchema, InputSchema};

#[async_trait]
pub trait PromptHandler: Send + Sync {
    async fn get(
        &self,
        args: Map<String, Value>,
        request: &RequestMeta,
        session: &SessionContext,
    ) -> HandlerResult;
}

struct FnPrompt<F>(F);

#[async_trait]
impl<F, Fut> PromptHandler for FnPrompt<F>
where
    F: Fn(Map<String, Value>, RequestMeta, SessionContext) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    async fn get(
        &self,
        args: Map<String, Value>,
        request: &RequestMeta,
        session: &SessionContext,
    ) -> HandlerResult {
        (self.0)(args, request.clone(), session.clone()).await
    }
}

/// One registered prompt
#[derive(Clone)]
pub struct PromptSpec {
    pub name: String,
    pub description: Option<String>,
    pub arguments: InputSchema,
    pub handler: Arc<dyn PromptHandler>,
    pub completion: Option<Arc<dyn CompletionHandler>>,
}

impl PromptSpec {
    pub fn new<F, Fut>(name: impl Into<String>, arguments: InputSchema, handler: F) -> Self
    where
        F: Fn(Map<String, Value>, RequestMeta, SessionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: None,
            arguments,
            handler: Arc::new(FnPrompt(handler)),
            completion: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_completion(mut self, completion: Arc<dyn CompletionHandler>) -> Self {
        self.completion = Some(completion);
        self
    }

    /// The `prompts/list` entry; arguments render as the MCP prompt
    /// argument list rather than raw JSON Schema.
    pub fn descriptor(&self) -> Value {
        let mut entry = serde_json::json!({ "name": self.name });
        if let Some(description) = &self.description {
            entry["description"] = Value::String(description.clone());
        }
        if let InputSchema::Fields(fields) = &self.arguments {
            let arguments: Vec<Value> = fields
                .iter()
                .map(|(name, field)| prompt_argument(name, field))
                .collect();
            if !arguments.is_empty() {
                entry["arguments"] = Value::Array(arguments);
            }
        }
        entry
    }
}

fn prompt_argument(name: &str, field: &FieldSchema) -> Value {
    let mut argument = serde_json::json!({
        "name": name,
        "required": field.required,
    });
    if let Some(description) = &field.description {
        argument["description"] = Value::String(description.clone());
    }
    argument
}

impl std::fmt::Debug for PromptSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromptSpec")
            .field("name", &self.name)
            .field("has_completion", &self.completion.is_some())
            .finish()
    }
}
