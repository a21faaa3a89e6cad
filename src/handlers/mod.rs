//! HTTP handlers. Thin adapters over the storage façade: extract the
//! caller identity, translate paths and payloads, delegate, map errors.

pub mod bucket_handlers;
pub mod content_handlers;
pub mod health_handlers;
pub mod object_handlers;

use crate::services::access::Caller;
use axum::http::HeaderMap;
use uuid::Uuid;

/// Resolve the request identity.
///
/// Token parsing lives upstream; by the time a request gets here the user
/// id, if any, rides in the `x-user-id` header. An absent or malformed
/// header means an anonymous caller.
pub fn caller_from_headers(headers: &HeaderMap) -> Caller {
    let user_id = headers
        .get("x-user-id")
        .and_then(|value| value.to_str().ok())
        .and_then(|raw| Uuid::parse_str(raw).ok());
    Caller::new(user_id)
}

/// Ensure a path-like object name carries a leading slash.
pub fn prefix_slash(name: &str) -> String {
    if name.starts_with('/') {
        name.to_string()
    } else {
        format!("/{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_slash_is_idempotent() {
        assert_eq!(prefix_slash("cat.png"), "/cat.png");
        assert_eq!(prefix_slash("/cat.png"), "/cat.png");
        assert_eq!(prefix_slash(""), "/");
    }

    #[test]
    fn caller_parses_user_header() {
        let mut headers = HeaderMap::new();
        assert!(caller_from_headers(&headers).user_id.is_none());

        let id = Uuid::new_v4();
        headers.insert("x-user-id", id.to_string().parse().unwrap());
        assert_eq!(caller_from_headers(&headers).user_id, Some(id));

        headers.insert("x-user-id", "garbage".parse().unwrap());
        assert!(caller_from_headers(&headers).user_id.is_none());
    }
}
