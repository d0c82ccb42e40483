//! Parameter shapes for the notifications a session emits.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::methods;
use wisp_mcp_json_rpc::JsonRpcNotification;

/// `notifications/progress` params
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressParams {
    /// Opaque client-supplied correlation token
    pub progress_token: Value,
    pub progress: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// `notifications/resources/updated` params
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceUpdatedParams {
    pub uri: String,
}

/// The three list kinds a list-changed broadcast can refer to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListKind {
    Tools,
    Prompts,
    Resources,
}

impl ListKind {
    pub fn changed_method(&self) -> &'static str {
        match self {
            ListKind::Tools => methods::NOTIFICATION_TOOLS_LIST_CHANGED,
            ListKind::Prompts => methods::NOTIFICATION_PROMPTS_LIST_CHANGED,
            ListKind::Resources => methods::NOTIFICATION_RESOURCES_LIST_CHANGED,
        }
    }
}

/// Build a `notifications/progress` envelope.
pub fn progress(params: &ProgressParams) -> JsonRpcNotification {
    JsonRpcNotification::new(methods::NOTIFICATION_PROGRESS)
        .with_params(serde_json::to_value(params).unwrap_or(Value::Null))
}

/// Build a `notifications/message` envelope.
pub fn log_message(params: &crate::logging::LoggingMessageParams) -> JsonRpcNotification {
    JsonRpcNotification::new(methods::NOTIFICATION_MESSAGE)
        .with_params(serde_json::to_value(params).unwrap_or(Value::Null))
}

/// Build a `notifications/resources/updated` envelope.
pub fn resource_updated(uri: &str) -> JsonRpcNotification {
    JsonRpcNotification::new(methods::NOTIFICATION_RESOURCES_UPDATED)
        .with_params(serde_json::json!({ "uri": uri }))
}

/// Build the list-changed envelope for a kind.
pub fn list_changed(kind: ListKind) -> JsonRpcNotification {
    JsonRpcNotification::new(kind.changed_method())
}

/// Build a keep-alive ping notification.
pub fn ping() -> JsonRpcNotification {
    JsonRpcNotification::new(methods::PING)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_progress_shape() {
        let n = progress(&ProgressParams {
            progress_token: json!("tok-1"),
            progress: 0.5,
            total: Some(1.0),
            message: None,
        });
        let encoded = serde_json::to_value(&n).unwrap();
        assert_eq!(encoded["method"], "notifications/progress");
        assert_eq!(encoded["params"]["progressToken"], "tok-1");
        assert_eq!(encoded["params"]["progress"], 0.5);
        assert!(encoded["params"].get("message").is_none());
    }

    #[test]
    fn test_list_changed_methods() {
        assert_eq!(
            list_changed(ListKind::Tools).method,
            "notifications/tools/list_changed"
        );
        assert_eq!(
            list_changed(ListKind::Resources).method,
            "notifications/resources/list_changed"
        );
    }
}
