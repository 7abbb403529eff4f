//! Caller identity.
//!
//! Authentication happens in front of this service; handlers only need to
//! know which user, if any, is calling.

use axum::http::HeaderMap;

/// Header carrying the authenticated user id.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Resolves the calling user from request headers.
pub trait IdentityResolver: Send + Sync {
    /// Returns the user id, or `None` for a guest.
    fn resolve(&self, headers: &HeaderMap) -> Option<String>;
}

/// Trusts the `x-user-id` header set by the upstream gateway.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderIdentity;

impl IdentityResolver for HeaderIdentity {
    fn resolve(&self, headers: &HeaderMap) -> Option<String> {
        headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn test_header_identity() {
        let mut headers = HeaderMap::new();
        assert_eq!(HeaderIdentity.resolve(&headers), None);

        headers.insert(USER_ID_HEADER, HeaderValue::from_static("  "));
        assert_eq!(HeaderIdentity.resolve(&headers), None);

        headers.insert(USER_ID_HEADER, HeaderValue::from_static("user-42"));
        assert_eq!(HeaderIdentity.resolve(&headers), Some("user-42".to_string()));
    }
}
