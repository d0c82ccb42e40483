//! URI templates for resource routing.
//!
//! Patterns look like `test:///text/:id`: a scheme, then path segments
//! where `:var` segments capture one percent-decoded path parameter.
//! Templates compile to an anchored regex at registration; read-time
//! matching walks registered templates of the scheme in registration order
//! and the first match wins.

use regex::Regex;
use std::collections::HashMap;

use wisp_mcp_protocol::{McpError, McpResult};

#[derive(Debug, Clone)]
pub struct UriTemplate {
    pattern: String,
    scheme: String,
    regex: Regex,
    variables: Vec<String>,
}

impl UriTemplate {
    /// Compile a pattern. Fails on a missing scheme, an empty variable name
    /// or a duplicate variable.
    pub fn compile(pattern: &str) -> McpResult<Self> {
        let (scheme, path) = pattern
            .split_once("://")
            .ok_or_else(|| McpError::invalid_params(format!("Template has no scheme: {}", pattern)))?;
        if scheme.is_empty() {
            return Err(McpError::invalid_params(format!(
                "Template has no scheme: {}",
                pattern
            )));
        }

        let mut variables = Vec::new();
        let mut regex_pattern = format!("^{}://", regex::escape(scheme));
        for (index, segment) in path.split('/').enumerate() {
            if index > 0 {
                regex_pattern.push('/');
            }
            if let Some(name) = segment.strip_prefix(':') {
                if name.is_empty() {
                    return Err(McpError::invalid_params(format!(
                        "Empty variable in template: {}",
                        pattern
                    )));
                }
                if variables.iter().any(|v| v == name) {
                    return Err(McpError::invalid_params(format!(
                        "Duplicate variable '{}' in template: {}",
                        name, pattern
                    )));
                }
                variables.push(name.to_string());
                regex_pattern.push_str("([^/]+)");
            } else {
                regex_pattern.push_str(&regex::escape(segment));
            }
        }
        regex_pattern.push('$');

        let regex = Regex::new(&regex_pattern)
            .map_err(|e| McpError::internal(format!("Template failed to compile: {}", e)))?;

        Ok(Self {
            pattern: pattern.to_string(),
            scheme: scheme.to_string(),
            regex,
            variables,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    /// Match a URI and extract the decoded path-parameter map.
    pub fn extract(&self, uri: &str) -> Option<HashMap<String, String>> {
        let captures = self.regex.captures(uri)?;
        let mut params = HashMap::new();
        for (index, name) in self.variables.iter().enumerate() {
            let raw = captures.get(index + 1)?.as_str();
            let decoded = urlencoding::decode(raw).ok()?.into_owned();
            params.insert(name.clone(), decoded);
        }
        Some(params)
    }

    pub fn matches(&self, uri: &str) -> bool {
        self.regex.is_match(uri)
    }

    /// Reverse construction: fill `:var` segments from the map. Missing
    /// keys error; values are percent-encoded.
    pub fn expand(&self, params: &HashMap<String, String>) -> McpResult<String> {
        let (_, path) = self.pattern.split_once("://").expect("validated at compile");
        let mut uri = format!("{}://", self.scheme);
        for (index, segment) in path.split('/').enumerate() {
            if index > 0 {
                uri.push('/');
            }
            if let Some(name) = segment.strip_prefix(':') {
                let value = params.get(name).ok_or_else(|| McpError::missing_param(name))?;
                uri.push_str(&urlencoding::encode(value));
            } else {
                uri.push_str(segment);
            }
        }
        Ok(uri)
    }
}
