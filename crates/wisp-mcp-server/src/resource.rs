//! Resource-template specs: a compiled URI template plus a read handler,
//! surfaced through `resources/templates/list` and `resources/read`.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use crate::session::{HandlerResult, RequestMeta, SessionContext};
use crate::tool::CompletionHandler;
use crate::uri_template::UriTemplate;
use wisp_mcp_protocol::McpResult;

/// Reads one resource. `params` is the decoded path-parameter map from the
/// template match. Returning `Reply(Value::Null)` means "nothing here" and
/// surfaces as `resource_not_found`.
#[async_trait]
pub trait ResourceHandler: Send + Sync {
    async fn read(
        &self,
        params: HashMap<String, String>,
        request: &RequestMeta,
        session: &SessionContext,
    ) -> HandlerResult;
}

struct FnResource<F>(F);

#[async_trait]
impl<F, Fut> ResourceHandler for FnResource<F>
where
    F: Fn(HashMap<String, String>, RequestMeta, SessionContext) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    async fn read(
        &self,
        params: HashMap<String, String>,
        request: &RequestMeta,
        session: &SessionContext,
    ) -> HandlerResult {
        (self.0)(params, request.clone(), session.clone()).await
    }
}

/// One registered resource template
#[derive(Clone)]
pub struct ResourceTemplateSpec {
    pub name: String,
    pub template: UriTemplate,
    pub description: Option<String>,
    pub mime_type: Option<String>,
    pub handler: Arc<dyn ResourceHandler>,
    pub completion: Option<Arc<dyn CompletionHandler>>,
}

impl ResourceTemplateSpec {
    pub fn new<F, Fut>(name: impl Into<String>, pattern: &str, handler: F) -> McpResult<Self>
    where
        F: Fn(HashMap<String, String>, RequestMeta, SessionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        Ok(Self {
            name: name.into(),
            template: UriTemplate::compile(pattern)?,
            description: None,
            mime_type: None,
            handler: Arc::new(FnResource(handler)),
            completion: None,
        })
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    pub fn with_completion(mut self, completion: Arc<dyn CompletionHandler>) -> Self {
        self.completion = Some(completion);
        self
    }

    /// The `resources/templates/list` entry.
    pub fn descriptor(&self) -> Value {
        let mut entry = serde_json::json!({
            "name": self.name,
            "uriTemplate": self.template.pattern(),
        });
        if let Some(description) = &self.description {
            entry["description"] = Value::String(description.clone());
        }
        if let Some(mime_type) = &self.mime_type {
            entry["mimeType"] = Value::String(mime_type.clone());
        }
        entry
    }
}

impl std::fmt::Debug for ResourceTemplateSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceTemplateSpec")
            .field("name", &self.name)
            .field("pattern", &self.template.pattern())
            .finish()
    }
}
