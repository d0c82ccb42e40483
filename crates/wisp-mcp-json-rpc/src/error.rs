use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::types::RequestId;

/// The MCP error-code taxonomy.
///
/// The five standard JSON-RPC codes plus the MCP server-range codes this
/// framework emits. `ServerError` covers anything else in -32099..=-32000.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonRpcErrorCode {
    ParseError,
    InvalidRequest,
    MethodNotFound,
    InvalidParams,
    InternalError,
    /// Connection-phase rejection (unauthorized, closed)
    Connection,
    /// URI did not match any template or the handler returned nothing
    ResourceNotFound,
    /// Tool cannot proceed; `data` carries the list of elicitations
    ElicitationRequired,
    ServerError(i64),
}

impl JsonRpcErrorCode {
    pub fn code(&self) -> i64 {
        match self {
            JsonRpcErrorCode::ParseError => -32700,
            JsonRpcErrorCode::InvalidRequest => -32600,
            JsonRpcErrorCode::MethodNotFound => -32601,
            JsonRpcErrorCode::InvalidParams => -32602,
            JsonRpcErrorCode::InternalError => -32603,
            JsonRpcErrorCode::Connection => -32000,
            JsonRpcErrorCode::ResourceNotFound => -32002,
            JsonRpcErrorCode::ElicitationRequired => -32042,
            JsonRpcErrorCode::ServerError(code) => *code,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            JsonRpcErrorCode::ParseError => "Parse error",
            JsonRpcErrorCode::InvalidRequest => "Invalid Request",
            JsonRpcErrorCode::MethodNotFound => "Method not found",
            JsonRpcErrorCode::InvalidParams => "Invalid params",
            JsonRpcErrorCode::InternalError => "Internal error",
            JsonRpcErrorCode::Connection => "Connection error",
            JsonRpcErrorCode::ResourceNotFound => "Resource not found",
            JsonRpcErrorCode::ElicitationRequired => "Elicitation required",
            JsonRpcErrorCode::ServerError(_) => "Server error",
        }
    }
}

impl fmt::Display for JsonRpcErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code(), self.message())
    }
}

/// The `error` member of an error envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcErrorObject {
    pub fn new(code: JsonRpcErrorCode, message: Option<String>, data: Option<Value>) -> Self {
        Self {
            code: code.code(),
            message: message.unwrap_or_else(|| code.message().to_string()),
            data,
        }
    }

    pub fn parse_error(data: Option<Value>) -> Self {
        Self::new(JsonRpcErrorCode::ParseError, None, data)
    }

    pub fn invalid_request(message: Option<String>) -> Self {
        Self::new(JsonRpcErrorCode::InvalidRequest, message, None)
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(
            JsonRpcErrorCode::MethodNotFound,
            Some(format!("Method '{}' not found", method)),
            None,
        )
    }

    pub fn invalid_params(message: &str, data: Option<Value>) -> Self {
        Self::new(JsonRpcErrorCode::InvalidParams, Some(message.to_string()), data)
    }

    /// `invalid_params` with the ordered validation-error list under
    /// `data.validation_errors`.
    pub fn validation_failed(errors: Vec<String>) -> Self {
        Self::new(
            JsonRpcErrorCode::InvalidParams,
            Some("Validation failed".to_string()),
            Some(serde_json::json!({ "validation_errors": errors })),
        )
    }

    pub fn internal_error(message: Option<String>) -> Self {
        Self::new(JsonRpcErrorCode::InternalError, message, None)
    }

    pub fn connection(message: &str) -> Self {
        Self::new(JsonRpcErrorCode::Connection, Some(message.to_string()), None)
    }

    pub fn resource_not_found(uri: &str) -> Self {
        Self::new(
            JsonRpcErrorCode::ResourceNotFound,
            Some(format!("Resource not found: {}", uri)),
            Some(serde_json::json!({ "uri": uri })),
        )
    }

    pub fn elicitation_required(elicitations: Value) -> Self {
        Self::new(
            JsonRpcErrorCode::ElicitationRequired,
            None,
            Some(serde_json::json!({ "elicitations": elicitations })),
        )
    }
}

/// A complete JSON-RPC error envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    #[serde(rename = "jsonrpc")]
    pub version: String,
    pub id: Option<RequestId>,
    pub error: JsonRpcErrorObject,
}

impl JsonRpcError {
    pub fn new(id: Option<RequestId>, error: JsonRpcErrorObject) -> Self {
        Self {
            version: crate::JSONRPC_VERSION.to_string(),
            id,
            error,
        }
    }

    pub fn parse_error() -> Self {
        Self::new(None, JsonRpcErrorObject::parse_error(None))
    }

    pub fn invalid_request(id: Option<RequestId>, message: Option<String>) -> Self {
        Self::new(id, JsonRpcErrorObject::invalid_request(message))
    }

    pub fn method_not_found(id: RequestId, method: &str) -> Self {
        Self::new(Some(id), JsonRpcErrorObject::method_not_found(method))
    }

    pub fn invalid_params(id: RequestId, message: &str) -> Self {
        Self::new(Some(id), JsonRpcErrorObject::invalid_params(message, None))
    }

    pub fn internal_error(id: Option<RequestId>, message: Option<String>) -> Self {
        Self::new(id, JsonRpcErrorObject::internal_error(message))
    }
}

impl fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JSON-RPC error {}: {}", self.error.code, self.error.message)
    }
}

impl std::error::Error for JsonRpcError {}
