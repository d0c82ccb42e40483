use serde_json::Value;
use thiserror::Error;

use crate::elicitation::Elicitation;
use wisp_mcp_json_rpc::JsonRpcErrorObject;

pub type McpResult<T> = Result<T, McpError>;

/// Domain errors raised by handlers and framework internals.
///
/// Every variant has a deterministic mapping to a wire error object; the
/// dispatcher never invents codes on its own.
#[derive(Debug, Error)]
pub enum McpError {
    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("Validation failed")]
    Validation(Vec<String>),

    #[error("Method '{0}' not found")]
    MethodNotFound(String),

    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Tool '{0}' not found")]
    ToolNotFound(String),

    #[error("Prompt '{0}' not found")]
    PromptNotFound(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Elicitation required")]
    ElicitationRequired(Vec<Elicitation>),

    #[error("Unsupported protocol version: {requested}")]
    UnsupportedVersion { supported: String, requested: String },

    #[error("Capability not available: {0}")]
    NotAvailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl McpError {
    pub fn invalid_params(message: impl Into<String>) -> Self {
        McpError::InvalidParams(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        McpError::Internal(message.into())
    }

    pub fn missing_param(name: &str) -> Self {
        McpError::InvalidParams(format!("Missing required field: {}", name))
    }

    /// Map to the wire error object, including the `data` payloads the
    /// protocol pins down (validation lists, version mismatch, elicitations).
    pub fn to_error_object(&self) -> JsonRpcErrorObject {
        match self {
            McpError::InvalidParams(msg) => JsonRpcErrorObject::invalid_params(msg, None),
            McpError::Validation(errors) => JsonRpcErrorObject::validation_failed(errors.clone()),
            McpError::MethodNotFound(method) => JsonRpcErrorObject::method_not_found(method),
            McpError::ResourceNotFound(uri) => JsonRpcErrorObject::resource_not_found(uri),
            McpError::ToolNotFound(name) => {
                JsonRpcErrorObject::invalid_params(&format!("Tool '{}' not found", name), None)
            }
            McpError::PromptNotFound(name) => {
                JsonRpcErrorObject::invalid_params(&format!("Prompt '{}' not found", name), None)
            }
            McpError::Connection(msg) => JsonRpcErrorObject::connection(msg),
            McpError::ElicitationRequired(elicitations) => {
                let payload = serde_json::to_value(elicitations).unwrap_or(Value::Null);
                JsonRpcErrorObject::elicitation_required(payload)
            }
            McpError::UnsupportedVersion { supported, requested } => {
                JsonRpcErrorObject::invalid_params(
                    "Unsupported protocol version",
                    Some(serde_json::json!({
                        "supported": supported,
                        "requested": requested,
                    })),
                )
            }
            McpError::NotAvailable(what) => JsonRpcErrorObject::invalid_params(
                &format!("Capability not available: {}", what),
                None,
            ),
            McpError::Internal(msg) => JsonRpcErrorObject::internal_error(Some(msg.clone())),
        }
    }
}

impl From<serde_json::Error> for McpError {
    fn from(err: serde_json::Error) -> Self {
        McpError::Internal(format!("Serialization error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_maps_to_invalid_params() {
        let err = McpError::Validation(vec!["Missing required field: message".to_string()]);
        let obj = err.to_error_object();
        assert_eq!(obj.code, -32602);
        assert_eq!(
            obj.data.unwrap()["validation_errors"][0],
            "Missing required field: message"
        );
    }

    #[test]
    fn test_version_mismatch_data() {
        let err = McpError::UnsupportedVersion {
            supported: "2025-03-26".to_string(),
            requested: "1999-01-01".to_string(),
        };
        let obj = err.to_error_object();
        let data = obj.data.unwrap();
        assert_eq!(data["supported"], "2025-03-26");
        assert_eq!(data["requested"], "1999-01-01");
    }

    #[test]
    fn test_elicitation_required_code() {
        let err = McpError::ElicitationRequired(vec![]);
        assert_eq!(err.to_error_object().code, -32042);
    }
}
