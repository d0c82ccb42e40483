//! Server-initiated elicitation: `elicitation/create` requests in `form`
//! mode (client renders a schema-described form) or `url` mode (client
//! opens a URL; completion is signalled out of band).

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElicitationMode {
    Form,
    Url,
}

/// One pending elicitation, as carried in the -32042 error payload and in
/// `elicitation/create` params.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Elicitation {
    pub mode: ElicitationMode,
    pub message: String,
    /// Schema of the requested input, form mode only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requested_schema: Option<Value>,
    /// Target URL, url mode only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Opaque correlation id, url mode only; tracked cluster-wide so an
    /// external callback can signal completion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elicitation_id: Option<String>,
}

impl Elicitation {
    pub fn form(message: impl Into<String>, requested_schema: Value) -> Self {
        Self {
            mode: ElicitationMode::Form,
            message: message.into(),
            requested_schema: Some(requested_schema),
            url: None,
            elicitation_id: None,
        }
    }

    pub fn url(
        message: impl Into<String>,
        url: impl Into<String>,
        elicitation_id: impl Into<String>,
    ) -> Self {
        Self {
            mode: ElicitationMode::Url,
            message: message.into(),
            requested_schema: None,
            url: Some(url.into()),
            elicitation_id: Some(elicitation_id.into()),
        }
    }
}

/// `elicitation/create` request params
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElicitCreateParams {
    #[serde(flatten)]
    pub elicitation: Elicitation,
}

/// What the client decided
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElicitationAction {
    Accept,
    Decline,
    Cancel,
}

/// The client's reply to `elicitation/create`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElicitResult {
    pub action: ElicitationAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,
}

impl ElicitResult {
    pub fn accept(content: Value) -> Self {
        Self {
            action: ElicitationAction::Accept,
            content: Some(content),
        }
    }

    pub fn decline() -> Self {
        Self {
            action: ElicitationAction::Decline,
            content: None,
        }
    }

    pub fn cancel() -> Self {
        Self {
            action: ElicitationAction::Cancel,
            content: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_form_elicitation_shape() {
        let e = Elicitation::form("Your name?", json!({"type": "object"}));
        let encoded = serde_json::to_value(&e).unwrap();
        assert_eq!(encoded["mode"], "form");
        assert_eq!(encoded["requestedSchema"]["type"], "object");
        assert!(encoded.get("url").is_none());
    }

    #[test]
    fn test_url_elicitation_carries_id() {
        let e = Elicitation::url("Grant access", "https://example.com/grant", "el-1");
        let encoded = serde_json::to_value(&e).unwrap();
        assert_eq!(encoded["mode"], "url");
        assert_eq!(encoded["elicitationId"], "el-1");
    }

    #[test]
    fn test_result_decode() {
        let result: ElicitResult =
            serde_json::from_value(json!({"action": "accept", "content": {"name": "a"}})).unwrap();
        assert_eq!(result.action, ElicitationAction::Accept);
        assert_eq!(result.content.unwrap()["name"], "a");
    }
}
