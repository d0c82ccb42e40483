use serde::{Deserialize, Serialize};
use std::fmt;

/// JSON-RPC protocol version marker, always serialized as `"2.0"`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JsonRpcVersion {
    #[serde(rename = "2.0")]
    V2_0,
}

impl Default for JsonRpcVersion {
    fn default() -> Self {
        JsonRpcVersion::V2_0
    }
}

/// A JSON-RPC request id.
///
/// `null` ids never construct a `RequestId`; envelopes without an id are
/// notifications and are modeled separately.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    String(String),
    Number(i64),
}

impl RequestId {
    /// Parse an id out of a raw JSON value; `None` for null/absent/other types.
    pub fn from_value(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::String(s) => Some(RequestId::String(s.clone())),
            serde_json::Value::Number(n) => n.as_i64().map(RequestId::Number),
            _ => None,
        }
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestId::String(s) => write!(f, "{}", s),
            RequestId::Number(n) => write!(f, "{}", n),
        }
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        RequestId::String(s.to_string())
    }
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        RequestId::Number(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_id_roundtrip() {
        let id: RequestId = serde_json::from_value(json!(42)).unwrap();
        assert_eq!(id, RequestId::Number(42));
        assert_eq!(serde_json::to_value(&id).unwrap(), json!(42));

        let id: RequestId = serde_json::from_value(json!("abc")).unwrap();
        assert_eq!(id, RequestId::String("abc".to_string()));
    }

    #[test]
    fn test_request_id_from_value() {
        assert_eq!(RequestId::from_value(&json!(null)), None);
        assert_eq!(RequestId::from_value(&json!(true)), None);
        assert_eq!(RequestId::from_value(&json!(7)), Some(RequestId::Number(7)));
    }

    #[test]
    fn test_version_serialization() {
        let v = serde_json::to_string(&JsonRpcVersion::V2_0).unwrap();
        assert_eq!(v, "\"2.0\"");
    }
}
