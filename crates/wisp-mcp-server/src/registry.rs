//! Process-wide catalog of tools, prompts and resource templates, keyed by
//! router name. Populated once from the router's declarations and mutable
//! at runtime through `add`/`remove`; the caller broadcasts list-changed
//! after a successful mutation.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use thiserror::Error;
use tracing::{debug, warn};

use crate::prompt::PromptSpec;
use crate::resource::ResourceTemplateSpec;
use crate::router::Router;
use crate::tool::ToolSpec;
use wisp_mcp_protocol::notifications::ListKind;
use wisp_mcp_protocol::{CustomValidator, FieldKind, FieldSchema, InputSchema};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("router not found: {0}")]
    RouterNotFound(String),

    #[error("duplicate {kind:?} name: {name}")]
    DuplicateName { kind: ListKind, name: String },

    #[error("unresolvable handler reference '{reference}' in spec '{name}'")]
    InvalidHandler { name: String, reference: String },
}

#[derive(Default)]
struct Catalog {
    tools: Vec<ToolSpec>,
    prompts: Vec<PromptSpec>,
    templates: Vec<ResourceTemplateSpec>,
}

pub struct Registry {
    routers: RwLock<HashMap<String, Catalog>>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            routers: RwLock::new(HashMap::new()),
        }
    }

    /// Load a router's declarations. Idempotent: a second registration of
    /// the same router name is a no-op. Duplicate names inside the
    /// declarations keep the first spec and warn; runtime `add` is where
    /// duplicates become hard errors.
    pub fn register(&self, router: &Router) {
        let mut routers = self.routers.write().unwrap();
        if routers.contains_key(router.name()) {
            debug!(router = router.name(), "router already registered");
            return;
        }

        let mut catalog = Catalog::default();
        for spec in router.declared_tools() {
            if catalog.tools.iter().any(|t| t.name == spec.name) {
                warn!(name = %spec.name, "duplicate tool declaration ignored");
                continue;
            }
            catalog.tools.push(spec.clone());
        }
        for spec in router.declared_prompts() {
            if catalog.prompts.iter().any(|p| p.name == spec.name) {
                warn!(name = %spec.name, "duplicate prompt declaration ignored");
                continue;
            }
            catalog.prompts.push(spec.clone());
        }
        for spec in router.declared_templates() {
            if catalog.templates.iter().any(|t| t.name == spec.name) {
                warn!(name = %spec.name, "duplicate resource template declaration ignored");
                continue;
            }
            catalog.templates.push(spec.clone());
        }
        routers.insert(router.name().to_string(), catalog);
    }

    pub fn add_tool(&self, router: &Router, spec: ToolSpec) -> Result<(), RegistryError> {
        check_references(&spec.name, &spec.input, router)?;
        let mut routers = self.routers.write().unwrap();
        let catalog = routers
            .get_mut(router.name())
            .ok_or_else(|| RegistryError::RouterNotFound(router.name().to_string()))?;
        if catalog.tools.iter().any(|t| t.name == spec.name) {
            return Err(RegistryError::DuplicateName {
                kind: ListKind::Tools,
                name: spec.name,
            });
        }
        catalog.tools.push(spec);
        Ok(())
    }

    pub fn add_prompt(&self, router: &Router, spec: PromptSpec) -> Result<(), RegistryError> {
        check_references(&spec.name, &spec.arguments, router)?;
        let mut routers = self.routers.write().unwrap();
        let catalog = routers
            .get_mut(router.name())
            .ok_or_else(|| RegistryError::RouterNotFound(router.name().to_string()))?;
        if catalog.prompts.iter().any(|p| p.name == spec.name) {
            return Err(RegistryError::DuplicateName {
                kind: ListKind::Prompts,
                name: spec.name,
            });
        }
        catalog.prompts.push(spec);
        Ok(())
    }

    pub fn add_template(
        &self,
        router: &Router,
        spec: ResourceTemplateSpec,
    ) -> Result<(), RegistryError> {
        let mut routers = self.routers.write().unwrap();
        let catalog = routers
            .get_mut(router.name())
            .ok_or_else(|| RegistryError::RouterNotFound(router.name().to_string()))?;
        if catalog.templates.iter().any(|t| t.name == spec.name) {
            return Err(RegistryError::DuplicateName {
                kind: ListKind::Resources,
                name: spec.name,
            });
        }
        catalog.templates.push(spec);
        Ok(())
    }

    /// Remove by kind and name; `Ok(true)` when something was removed.
    pub fn remove(
        &self,
        router_name: &str,
        kind: ListKind,
        name: &str,
    ) -> Result<bool, RegistryError> {
        let mut routers = self.routers.write().unwrap();
        let catalog = routers
            .get_mut(router_name)
            .ok_or_else(|| RegistryError::RouterNotFound(router_name.to_string()))?;
        let removed = match kind {
            ListKind::Tools => {
                let before = catalog.tools.len();
                catalog.tools.retain(|t| t.name != name);
                catalog.tools.len() < before
            }
            ListKind::Prompts => {
                let before = catalog.prompts.len();
                catalog.prompts.retain(|p| p.name != name);
                catalog.prompts.len() < before
            }
            ListKind::Resources => {
                let before = catalog.templates.len();
                catalog.templates.retain(|t| t.name != name);
                catalog.templates.len() < before
            }
        };
        Ok(removed)
    }

    /// Tools visible to a session: the full list when `allow` is `None`,
    /// otherwise the allow-listed subset in registry order.
    pub fn list_tools(&self, router_name: &str, allow: Option<&HashSet<String>>) -> Vec<ToolSpec> {
        let routers = self.routers.read().unwrap();
        match routers.get(router_name) {
            Some(catalog) => filtered(&catalog.tools, allow, |t| &t.name),
            None => Vec::new(),
        }
    }

    pub fn list_prompts(
        &self,
        router_name: &str,
        allow: Option<&HashSet<String>>,
    ) -> Vec<PromptSpec> {
        let routers = self.routers.read().unwrap();
        match routers.get(router_name) {
            Some(catalog) => filtered(&catalog.prompts, allow, |p| &p.name),
            None => Vec::new(),
        }
    }

    pub fn list_templates(
        &self,
        router_name: &str,
        allow: Option<&HashSet<String>>,
    ) -> Vec<ResourceTemplateSpec> {
        let routers = self.routers.read().unwrap();
        match routers.get(router_name) {
            Some(catalog) => filtered(&catalog.templates, allow, |t| &t.name),
            None => Vec::new(),
        }
    }

    pub fn get_tool(
        &self,
        router_name: &str,
        allow: Option<&HashSet<String>>,
        name: &str,
    ) -> Option<ToolSpec> {
        self.list_tools(router_name, allow)
            .into_iter()
            .find(|t| t.name == name)
    }

    pub fn get_prompt(
        &self,
        router_name: &str,
        allow: Option<&HashSet<String>>,
        name: &str,
    ) -> Option<PromptSpec> {
        self.list_prompts(router_name, allow)
            .into_iter()
            .find(|p| p.name == name)
    }

    /// Greedy template match: first registered template of the URI's scheme
    /// that matches wins.
    pub fn match_resource(
        &self,
        router_name: &str,
        allow: Option<&HashSet<String>>,
        uri: &str,
    ) -> Option<(ResourceTemplateSpec, HashMap<String, String>)> {
        self.list_templates(router_name, allow)
            .into_iter()
            .find_map(|spec| spec.template.extract(uri).map(|params| (spec, params)))
    }

    /// Whether any visible spec declares a completion function; drives the
    /// `completions` capability.
    pub fn has_completions(&self, router_name: &str, allow_prompts: Option<&HashSet<String>>, allow_resources: Option<&HashSet<String>>) -> bool {
        self.list_prompts(router_name, allow_prompts)
            .iter()
            .any(|p| p.completion.is_some())
            || self
                .list_templates(router_name, allow_resources)
                .iter()
                .any(|t| t.completion.is_some())
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

fn filtered<T: Clone>(specs: &[T], allow: Option<&HashSet<String>>, name: impl Fn(&T) -> &String) -> Vec<T> {
    match allow {
        None => specs.to_vec(),
        Some(allowed) => specs
            .iter()
            .filter(|spec| allowed.contains(name(spec)))
            .cloned()
            .collect(),
    }
}

/// Runtime `add` rejects specs whose named validators or schema references
/// do not resolve against the router's tables.
fn check_references(
    spec_name: &str,
    schema: &InputSchema,
    router: &Router,
) -> Result<(), RegistryError> {
    fn walk(field: &FieldSchema, router: &Router, spec_name: &str) -> Result<(), RegistryError> {
        if let Some(CustomValidator::Named(name)) = &field.custom {
            if !router.has_named_validator(name) {
                return Err(RegistryError::InvalidHandler {
                    name: spec_name.to_string(),
                    reference: name.clone(),
                });
            }
        }
        match &field.kind {
            FieldKind::Ref(name) => {
                if !router.has_named_schema(name) {
                    return Err(RegistryError::InvalidHandler {
                        name: spec_name.to_string(),
                        reference: name.clone(),
                    });
                }
            }
            FieldKind::Array(items) => walk(items, router, spec_name)?,
            FieldKind::Object(fields) => {
                for (_, nested) in fields {
                    walk(nested, router, spec_name)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    if let InputSchema::Fields(fields) = schema {
        for (_, field) in fields {
            walk(field, router, spec_name)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::Router;
    use crate::session::HandlerResult;
    use wisp_mcp_protocol::FieldSchema;

    fn echo_tool(name: &str) -> ToolSpec {
        ToolSpec::new(
            name,
            InputSchema::fields(vec![("message", FieldSchema::string().required())]),
            |_a, _r, _c| async { HandlerResult::NoReply },
        )
    }

    fn router_with_tool() -> Router {
        Router::builder("test-router", "1.0")
            .tool(echo_tool("echo_tool"))
            .build()
    }

    #[test]
    fn test_register_is_idempotent() {
        let registry = Registry::new();
        let router = router_with_tool();
        registry.register(&router);
        registry.register(&router);
        assert_eq!(registry.list_tools(router.name(), None).len(), 1);
    }

    #[test]
    fn test_add_duplicate_fails() {
        let registry = Registry::new();
        let router = router_with_tool();
        registry.register(&router);

        let err = registry.add_tool(&router, echo_tool("echo_tool")).unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateName { .. }));

        registry.add_tool(&router, echo_tool("other_tool")).unwrap();
        assert_eq!(registry.list_tools(router.name(), None).len(), 2);
    }

    #[test]
    fn test_unknown_router() {
        let registry = Registry::new();
        let router = router_with_tool();
        // Not registered yet: add must fail.
        let err = registry.add_tool(&router, echo_tool("x")).unwrap_err();
        assert!(matches!(err, RegistryError::RouterNotFound(_)));
    }

    #[test]
    fn test_unresolvable_named_validator() {
        let registry = Registry::new();
        let router = router_with_tool();
        registry.register(&router);

        let spec = ToolSpec::new(
            "picky_tool",
            InputSchema::fields(vec![(
                "code",
                FieldSchema::string().with_named_validator("no_such_validator"),
            )]),
            |_a, _r, _c| async { HandlerResult::NoReply },
        );
        let err = registry.add_tool(&router, spec).unwrap_err();
        assert!(matches!(err, RegistryError::InvalidHandler { .. }));
    }

    #[test]
    fn test_allow_list_filtering() {
        let registry = Registry::new();
        let router = Router::builder("r", "1.0")
            .tool(echo_tool("a"))
            .tool(echo_tool("b"))
            .build();
        registry.register(&router);

        let allow: HashSet<String> = ["b".to_string()].into_iter().collect();
        let visible = registry.list_tools(router.name(), Some(&allow));
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].name, "b");

        // Null allow-list is identity.
        assert_eq!(registry.list_tools(router.name(), None).len(), 2);
    }

    #[test]
    fn test_remove() {
        let registry = Registry::new();
        let router = router_with_tool();
        registry.register(&router);

        assert!(registry.remove(router.name(), ListKind::Tools, "echo_tool").unwrap());
        assert!(!registry.remove(router.name(), ListKind::Tools, "echo_tool").unwrap());
        assert!(registry.list_tools(router.name(), None).is_empty());
    }
}
