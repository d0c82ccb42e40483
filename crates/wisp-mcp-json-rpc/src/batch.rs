//! Batch intake: a POST body or stdio line is one envelope or an array of
//! them. Items are decoded independently so one malformed entry never sinks
//! the rest of the batch.

use serde_json::Value;

use crate::error::{JsonRpcError, JsonRpcErrorObject};
use crate::notification::JsonRpcNotification;
use crate::request::JsonRpcRequest;
use crate::types::{JsonRpcVersion, RequestId};

/// One decoded entry of an inbound batch
#[derive(Debug, Clone)]
pub enum IncomingItem {
    Request(JsonRpcRequest),
    Notification(JsonRpcNotification),
    /// A client reply to a server-initiated request (elicitation); carries
    /// the result or the error value.
    Response {
        id: RequestId,
        result: Result<Value, Value>,
    },
    /// Envelope-level fault; carries the id when one could be extracted so
    /// the error reply can echo it.
    Invalid(JsonRpcError),
}

impl IncomingItem {
    pub fn method(&self) -> Option<&str> {
        match self {
            IncomingItem::Request(r) => Some(&r.method),
            IncomingItem::Notification(n) => Some(&n.method),
            IncomingItem::Response { .. } | IncomingItem::Invalid(_) => None,
        }
    }
}

/// Decode a raw body into a batch of items.
///
/// Returns `Err` only when the body is not valid JSON at all (-32700) or is
/// an empty array (-32600); per-item faults become `IncomingItem::Invalid`.
pub fn parse_body(body: &str) -> Result<Vec<IncomingItem>, JsonRpcError> {
    let value: Value = serde_json::from_str(body).map_err(|_| JsonRpcError::parse_error())?;

    match value {
        Value::Array(entries) => {
            if entries.is_empty() {
                return Err(JsonRpcError::invalid_request(
                    None,
                    Some("Empty batch".to_string()),
                ));
            }
            Ok(entries.into_iter().map(decode_item).collect())
        }
        other => Ok(vec![decode_item(other)]),
    }
}

fn decode_item(value: Value) -> IncomingItem {
    let obj = match value.as_object() {
        Some(obj) => obj,
        None => {
            return IncomingItem::Invalid(JsonRpcError::invalid_request(
                None,
                Some("Envelope must be an object".to_string()),
            ));
        }
    };

    let id = obj.get("id").and_then(RequestId::from_value);

    if obj.get("jsonrpc").and_then(Value::as_str) != Some(crate::JSONRPC_VERSION) {
        return IncomingItem::Invalid(JsonRpcError::new(
            id,
            JsonRpcErrorObject::invalid_request(Some("Missing or bad jsonrpc version".to_string())),
        ));
    }

    let method = match obj.get("method").and_then(Value::as_str) {
        Some(m) => m.to_string(),
        None => {
            // No method: either a client reply to a server-initiated request
            // or a malformed envelope.
            if let Some(id) = id {
                if let Some(result) = obj.get("result") {
                    return IncomingItem::Response {
                        id,
                        result: Ok(result.clone()),
                    };
                }
                if let Some(error) = obj.get("error") {
                    return IncomingItem::Response {
                        id,
                        result: Err(error.clone()),
                    };
                }
                return IncomingItem::Invalid(JsonRpcError::new(
                    Some(id),
                    JsonRpcErrorObject::invalid_request(Some("Missing method".to_string())),
                ));
            }
            return IncomingItem::Invalid(JsonRpcError::new(
                None,
                JsonRpcErrorObject::invalid_request(Some("Missing method".to_string())),
            ));
        }
    };

    let params = obj.get("params").cloned();

    match id {
        Some(id) => IncomingItem::Request(JsonRpcRequest {
            version: JsonRpcVersion::V2_0,
            id,
            method,
            params,
        }),
        None => IncomingItem::Notification(JsonRpcNotification {
            version: JsonRpcVersion::V2_0,
            method,
            params,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_request() {
        let items = parse_body(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#).unwrap();
        assert_eq!(items.len(), 1);
        assert!(matches!(&items[0], IncomingItem::Request(r) if r.method == "ping"));
    }

    #[test]
    fn test_null_id_is_notification() {
        let items =
            parse_body(r#"{"jsonrpc":"2.0","id":null,"method":"notifications/initialized"}"#)
                .unwrap();
        assert!(matches!(&items[0], IncomingItem::Notification(_)));
    }

    #[test]
    fn test_batch_of_two() {
        let body = r#"[
            {"jsonrpc":"2.0","id":1,"method":"ping"},
            {"jsonrpc":"2.0","method":"notifications/initialized"}
        ]"#;
        let items = parse_body(body).unwrap();
        assert_eq!(items.len(), 2);
        assert!(matches!(&items[0], IncomingItem::Request(_)));
        assert!(matches!(&items[1], IncomingItem::Notification(_)));
    }

    #[test]
    fn test_malformed_item_does_not_sink_batch() {
        let body = r#"[{"jsonrpc":"2.0","id":1,"method":"ping"}, {"id":2,"method":"ping"}, 3]"#;
        let items = parse_body(body).unwrap();
        assert_eq!(items.len(), 3);
        assert!(matches!(&items[0], IncomingItem::Request(_)));
        match &items[1] {
            IncomingItem::Invalid(err) => {
                assert_eq!(err.id, Some(RequestId::Number(2)));
                assert_eq!(err.error.code, -32600);
            }
            other => panic!("expected invalid item, got {:?}", other),
        }
        assert!(matches!(&items[2], IncomingItem::Invalid(_)));
    }

    #[test]
    fn test_client_response_intake() {
        let items =
            parse_body(r#"{"jsonrpc":"2.0","id":"el-1","result":{"action":"accept"}}"#).unwrap();
        match &items[0] {
            IncomingItem::Response { id, result } => {
                assert_eq!(id, &RequestId::from("el-1"));
                assert_eq!(result.as_ref().unwrap()["action"], "accept");
            }
            other => panic!("expected response item, got {:?}", other),
        }
    }

    #[test]
    fn test_not_json() {
        let err = parse_body("{oops").unwrap_err();
        assert_eq!(err.error.code, -32700);
    }

    #[test]
    fn test_empty_batch() {
        let err = parse_body("[]").unwrap_err();
        assert_eq!(err.error.code, -32600);
    }
}
