use crate::model::UserContext;
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap, StatusCode},
};

/// Axum extractor for UserContext from request headers
///
/// This extractor looks for user information in request headers:
/// - X-User-Id: Required user identifier
/// - X-User-Email: Optional user email
/// - X-User-Name: Optional user display name
///
/// For development/testing, if no headers are present, returns a default user.
#[async_trait]
impl<S> FromRequestParts<S> for UserContext
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let headers = &parts.headers;

        if let Some(user_id) = extract_header_value(headers, "x-user-id") {
            let user_email = extract_header_value(headers, "x-user-email");
            let user_name = extract_header_value(headers, "x-user-name");

            Ok(UserContext::with_details(user_id, user_email, user_name))
        } else {
            // For development: return default user if no headers present
            Ok(UserContext::default_user())
        }
    }
}

/// Extract header value as string
fn extract_header_value(headers: &HeaderMap, header_name: &str) -> Option<String> {
    headers
        .get(header_name)
        .and_then(|value| value.to_str().ok())
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderName, HeaderValue};

    #[test]
    fn test_header_extraction() {
        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static("x-user-id"),
            HeaderValue::from_static("test-user-123"),
        );

        assert_eq!(
            extract_header_value(&headers, "x-user-id"),
            Some("test-user-123".to_string())
        );
        assert_eq!(extract_header_value(&headers, "x-user-email"), None);
    }
}
