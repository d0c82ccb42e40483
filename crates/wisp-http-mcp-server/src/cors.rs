//! Origin validation and CORS headers.

use hyper::HeaderMap;
use hyper::header::HeaderValue;
use std::sync::Arc;

/// How the `Origin` header is judged.
#[derive(Clone)]
pub enum OriginPolicy {
    /// Accept any origin
    Any,
    /// Accept an explicit allow-list
    List(Vec<String>),
    /// Custom predicate over the origin string
    Predicate(Arc<dyn Fn(&str) -> bool + Send + Sync>),
}

impl OriginPolicy {
    /// Requests without an `Origin` header (non-browser clients) always
    /// pass; browsers are judged by the policy.
    pub fn allows(&self, origin: Option<&str>) -> bool {
        let Some(origin) = origin else { return true };
        match self {
            OriginPolicy::Any => true,
            OriginPolicy::List(allowed) => allowed.iter().any(|a| a == origin),
            OriginPolicy::Predicate(predicate) => predicate(origin),
        }
    }
}

impl std::fmt::Debug for OriginPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OriginPolicy::Any => write!(f, "OriginPolicy::Any"),
            OriginPolicy::List(allowed) => write!(f, "OriginPolicy::List({:?})", allowed),
            OriginPolicy::Predicate(_) => write!(f, "OriginPolicy::Predicate(..)"),
        }
    }
}

const ALLOW_METHODS: &str = "GET, POST, DELETE, OPTIONS";
const ALLOW_HEADERS: &str = "Content-Type, Accept, Authorization, Mcp-Session-Id, Last-Event-ID";
const MAX_AGE: &str = "86400";

/// Headers for the preflight response: the complete method/header/max-age
/// block.
pub fn apply_preflight_headers(headers: &mut HeaderMap, origin: Option<&str>) {
    apply_cors_headers(headers, origin);
    headers.insert(
        "Access-Control-Allow-Methods",
        HeaderValue::from_static(ALLOW_METHODS),
    );
    headers.insert(
        "Access-Control-Allow-Headers",
        HeaderValue::from_static(ALLOW_HEADERS),
    );
    headers.insert("Access-Control-Max-Age", HeaderValue::from_static(MAX_AGE));
}

/// Headers for ordinary responses.
pub fn apply_cors_headers(headers: &mut HeaderMap, origin: Option<&str>) {
    let value = match origin.and_then(|o| HeaderValue::from_str(o).ok()) {
        Some(value) => value,
        None => HeaderValue::from_static("*"),
    };
    headers.insert("Access-Control-Allow-Origin", value);
    headers.insert(
        "Access-Control-Expose-Headers",
        HeaderValue::from_static("Mcp-Session-Id"),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_any_allows_everything() {
        assert!(OriginPolicy::Any.allows(Some("https://evil.example")));
        assert!(OriginPolicy::Any.allows(None));
    }

    #[test]
    fn test_list_policy() {
        let policy = OriginPolicy::List(vec!["https://app.example".to_string()]);
        assert!(policy.allows(Some("https://app.example")));
        assert!(!policy.allows(Some("https://other.example")));
        assert!(policy.allows(None));
    }

    #[test]
    fn test_predicate_policy() {
        let policy =
            OriginPolicy::Predicate(Arc::new(|origin| origin.ends_with(".example.com")));
        assert!(policy.allows(Some("https://a.example.com")));
        assert!(!policy.allows(Some("https://a.example.org")));
    }

    #[test]
    fn test_preflight_block() {
        let mut headers = HeaderMap::new();
        apply_preflight_headers(&mut headers, Some("https://app.example"));
        assert_eq!(
            headers.get("Access-Control-Allow-Origin").unwrap(),
            "https://app.example"
        );
        assert!(
            headers
                .get("Access-Control-Allow-Methods")
                .unwrap()
                .to_str()
                .unwrap()
                .contains("DELETE")
        );
        assert_eq!(headers.get("Access-Control-Max-Age").unwrap(), "86400");
    }
}
