use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::warn;

use crate::AppState;

/// Check the Authorization header against the configured API token.
///
/// The error is the reason the request was refused.
pub fn validate_auth(headers: &HeaderMap, expected_token: &str) -> Result<(), &'static str> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or("missing bearer token")?;
    let provided = value
        .to_str()
        .ok()
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or("expected Authorization: Bearer <token>")?;
    if provided == expected_token {
        Ok(())
    } else {
        Err("invalid bearer token")
    }
}

/// Bearer gate for `/api`. With no token configured the API is open.
pub async fn require_bearer(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    if let Some(expected) = &state.auth_token {
        if let Err(reason) = validate_auth(request.headers(), expected) {
            warn!("Rejected request to {}: {}", request.uri().path(), reason);
            return (StatusCode::UNAUTHORIZED, reason).into_response();
        }
    }
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn bearer(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn test_matching_token_passes() {
        assert!(validate_auth(&bearer("Bearer test-token-123"), "test-token-123").is_ok());
    }

    #[test]
    fn test_wrong_token_is_refused() {
        let err = validate_auth(&bearer("Bearer nope"), "test-token-123").unwrap_err();
        assert_eq!(err, "invalid bearer token");
    }

    #[test]
    fn test_missing_header_is_refused() {
        let err = validate_auth(&HeaderMap::new(), "test-token-123").unwrap_err();
        assert_eq!(err, "missing bearer token");
    }

    #[test]
    fn test_other_schemes_are_refused() {
        assert!(validate_auth(&bearer("Basic dXNlcjpwYXNz"), "test-token-123").is_err());
        // The scheme check is exact; a bare token is not accepted.
        assert!(validate_auth(&bearer("test-token-123"), "test-token-123").is_err());
    }
}
