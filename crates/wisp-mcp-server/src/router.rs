//! The router: what an application declares and hands to a transport.
//!
//! A router carries the tool/prompt/resource-template declarations, the
//! named validator and schema tables they may reference, server identity
//! (name, version, instructions) and the lifecycle callbacks: `connect`
//! (authorize, set allow-lists and assigns), `disconnect`, `terminate`,
//! the optional `resources/list` delegate, and the exception hook fired
//! after a batch with handler panics.

use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;

use crate::prompt::PromptSpec;
use crate::resource::ResourceTemplateSpec;
use crate::session::SessionContext;
use crate::tool::ToolSpec;
use wisp_mcp_protocol::{InputSchema, McpResult, ResourceLink};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Http,
    Stdio,
}

/// What the connect callback sees
#[derive(Debug, Clone)]
pub struct ConnectInfo {
    pub session_id: String,
    pub transport: TransportKind,
    /// Request headers on HTTP; empty on stdio
    pub headers: HashMap<String, String>,
}

/// An RFC 9728 `WWW-Authenticate` challenge: method plus quoted fields.
#[derive(Debug, Clone)]
pub struct AuthHeader {
    pub method: String,
    pub fields: Vec<(String, String)>,
}

impl AuthHeader {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((key.into(), value.into()));
        self
    }

    /// Serialize to the header value: `Method k1="v1", k2="v2"`.
    pub fn to_header_value(&self) -> String {
        if self.fields.is_empty() {
            return self.method.clone();
        }
        let fields: Vec<String> = self
            .fields
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", k, v.replace('"', "\\\"")))
            .collect();
        format!("{} {}", self.method, fields.join(", "))
    }
}

/// Session setup produced by an accepting connect callback
#[derive(Debug, Clone, Default)]
pub struct ConnectAccept {
    /// `None` means all tools are visible
    pub allow_tools: Option<HashSet<String>>,
    pub allow_prompts: Option<HashSet<String>>,
    pub allow_resources: Option<HashSet<String>>,
    pub assigns: HashMap<String, Value>,
}

impl ConnectAccept {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn allow_tools(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.allow_tools = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn allow_prompts(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.allow_prompts = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn allow_resources(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.allow_resources = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn assign(mut self, key: impl Into<String>, value: Value) -> Self {
        self.assigns.insert(key.into(), value);
        self
    }
}

#[derive(Debug)]
pub enum ConnectDecision {
    Accept(ConnectAccept),
    Unauthorized(Option<AuthHeader>),
    Forbidden(Option<String>),
}

/// Connection-phase rejection as seen by the transport
#[derive(Debug)]
pub enum ConnectReject {
    Unauthorized(Option<AuthHeader>),
    Forbidden(Option<String>),
}

pub type ConnectFn = Arc<dyn Fn(ConnectInfo) -> BoxFuture<'static, ConnectDecision> + Send + Sync>;
pub type DisconnectFn = Arc<dyn Fn(String) -> BoxFuture<'static, ()> + Send + Sync>;
pub type TerminateFn = Arc<dyn Fn(String) -> BoxFuture<'static, bool> + Send + Sync>;
pub type ListResourcesFn = Arc<
    dyn Fn(
            Option<String>,
            SessionContext,
        ) -> BoxFuture<'static, McpResult<(Vec<ResourceLink>, Option<String>)>>
        + Send
        + Sync,
>;
pub type NamedValidatorFn = Arc<dyn Fn(&Value) -> Result<(), String> + Send + Sync>;
pub type ExceptionsFn = Arc<dyn Fn(Vec<String>) + Send + Sync>;

pub struct Router {
    name: String,
    version: String,
    instructions: Option<String>,
    tools: Vec<ToolSpec>,
    prompts: Vec<PromptSpec>,
    templates: Vec<ResourceTemplateSpec>,
    named_validators: HashMap<String, NamedValidatorFn>,
    named_schemas: HashMap<String, InputSchema>,
    connect: Option<ConnectFn>,
    disconnect: Option<DisconnectFn>,
    terminate: Option<TerminateFn>,
    list_resources: Option<ListResourcesFn>,
    on_exceptions: Option<ExceptionsFn>,
}

impl Router {
    pub fn builder(name: impl Into<String>, version: impl Into<String>) -> RouterBuilder {
        RouterBuilder {
            router: Router {
                name: name.into(),
                version: version.into(),
                instructions: None,
                tools: Vec::new(),
                prompts: Vec::new(),
                templates: Vec::new(),
                named_validators: HashMap::new(),
                named_schemas: HashMap::new(),
                connect: None,
                disconnect: None,
                terminate: None,
                list_resources: None,
                on_exceptions: None,
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn instructions(&self) -> Option<&str> {
        self.instructions.as_deref()
    }

    pub(crate) fn declared_tools(&self) -> &[ToolSpec] {
        &self.tools
    }

    pub(crate) fn declared_prompts(&self) -> &[PromptSpec] {
        &self.prompts
    }

    pub(crate) fn declared_templates(&self) -> &[ResourceTemplateSpec] {
        &self.templates
    }

    pub fn has_named_validator(&self, name: &str) -> bool {
        self.named_validators.contains_key(name)
    }

    pub fn named_validator(&self, name: &str) -> Option<NamedValidatorFn> {
        self.named_validators.get(name).cloned()
    }

    pub fn has_named_schema(&self, name: &str) -> bool {
        self.named_schemas.contains_key(name)
    }

    pub fn named_schema(&self, name: &str) -> Option<InputSchema> {
        self.named_schemas.get(name).cloned()
    }

    /// Run the connect callback; accept-all when none is configured.
    pub async fn run_connect(&self, info: ConnectInfo) -> ConnectDecision {
        match &self.connect {
            Some(connect) => connect(info).await,
            None => ConnectDecision::Accept(ConnectAccept::all()),
        }
    }

    pub async fn run_disconnect(&self, session_id: String) {
        if let Some(disconnect) = &self.disconnect {
            disconnect(session_id).await;
        }
    }

    /// Run the terminate callback; `true` (HTTP 200) when it succeeds,
    /// `false` (HTTP 204) when absent or failing.
    pub async fn run_terminate(&self, session_id: String) -> bool {
        match &self.terminate {
            Some(terminate) => terminate(session_id).await,
            None => false,
        }
    }

    pub fn list_resources_fn(&self) -> Option<ListResourcesFn> {
        self.list_resources.clone()
    }

    pub(crate) fn report_exceptions(&self, exceptions: Vec<String>) {
        if let Some(hook) = &self.on_exceptions {
            hook(exceptions);
        }
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("tools", &self.tools.len())
            .field("prompts", &self.prompts.len())
            .field("templates", &self.templates.len())
            .finish()
    }
}

pub struct RouterBuilder {
    router: Router,
}

impl RouterBuilder {
    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        self.router.instructions = Some(instructions.into());
        self
    }

    pub fn tool(mut self, spec: ToolSpec) -> Self {
        self.router.tools.push(spec);
        self
    }

    pub fn prompt(mut self, spec: PromptSpec) -> Self {
        self.router.prompts.push(spec);
        self
    }

    pub fn resource(mut self, spec: ResourceTemplateSpec) -> Self {
        self.router.templates.push(spec);
        self
    }

    pub fn named_validator<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Value) -> Result<(), String> + Send + Sync + 'static,
    {
        self.router.named_validators.insert(name.into(), Arc::new(f));
        self
    }

    pub fn named_schema(mut self, name: impl Into<String>, schema: InputSchema) -> Self {
        self.router.named_schemas.insert(name.into(), schema);
        self
    }

    pub fn on_connect<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(ConnectInfo) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ConnectDecision> + Send + 'static,
    {
        self.router.connect = Some(Arc::new(move |info| Box::pin(f(info))));
        self
    }

    pub fn on_disconnect<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.router.disconnect = Some(Arc::new(move |id| Box::pin(f(id))));
        self
    }

    pub fn on_terminate<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        self.router.terminate = Some(Arc::new(move |id| Box::pin(f(id))));
        self
    }

    pub fn list_resources<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Option<String>, SessionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = McpResult<(Vec<ResourceLink>, Option<String>)>> + Send + 'static,
    {
        self.router.list_resources = Some(Arc::new(move |cursor, ctx| Box::pin(f(cursor, ctx))));
        self
    }

    pub fn on_exceptions<F>(mut self, f: F) -> Self
    where
        F: Fn(Vec<String>) + Send + Sync + 'static,
    {
        self.router.on_exceptions = Some(Arc::new(f));
        self
    }

    pub fn build(self) -> Router {
        self.router
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_header_serialization() {
        let header = AuthHeader::new("Bearer")
            .field("realm", "mcp")
            .field("error", "invalid_token");
        assert_eq!(
            header.to_header_value(),
            "Bearer realm=\"mcp\", error=\"invalid_token\""
        );

        let bare = AuthHeader::new("Bearer");
        assert_eq!(bare.to_header_value(), "Bearer");
    }

    #[tokio::test]
    async fn test_default_connect_accepts_all() {
        let router = Router::builder("r", "1.0").build();
        let decision = router
            .run_connect(ConnectInfo {
                session_id: "s".to_string(),
                transport: TransportKind::Http,
                headers: HashMap::new(),
            })
            .await;
        match decision {
            ConnectDecision::Accept(accept) => {
                assert!(accept.allow_tools.is_none());
                assert!(accept.assigns.is_empty());
            }
            other => panic!("expected accept, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_terminate_defaults_to_false() {
        let router = Router::builder("r", "1.0").build();
        assert!(!router.run_terminate("s".to_string()).await);

        let router = Router::builder("r", "1.0")
            .on_terminate(|_id| async { true })
            .build();
        assert!(router.run_terminate("s".to_string()).await);
    }
}
