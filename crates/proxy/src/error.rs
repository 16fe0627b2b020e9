//! API error type mapping [`ClaudineError`] variants to OpenAI-shaped HTTP
//! error responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use claudine_types::ClaudineError;
use serde_json::json;

/// Wrapper around [`ClaudineError`] that implements [`IntoResponse`].
pub struct ApiError(pub ClaudineError);

impl ApiError {
    /// Returns `(status, error_type, error_code)` for the wrapped error.
    fn classify(&self) -> (StatusCode, &'static str, &'static str) {
        match &self.0 {
            ClaudineError::Translate(_) | ClaudineError::Serialization(_) => (
                StatusCode::BAD_REQUEST,
                "invalid_request_error",
                "invalid_request",
            ),
            ClaudineError::Auth(_) => (
                StatusCode::UNAUTHORIZED,
                "authentication_error",
                "invalid_token",
            ),
            ClaudineError::Store(_) => (
                StatusCode::UNAUTHORIZED,
                "authentication_error",
                "token_unavailable",
            ),
            ClaudineError::Upstream { status } => classify_upstream(*status),
            ClaudineError::Http(_) | ClaudineError::Stream(_) => {
                (StatusCode::BAD_GATEWAY, "server_error", "upstream_error")
            }
            ClaudineError::Config(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "server_error",
                "internal_error",
            ),
        }
    }
}

fn classify_upstream(status: u16) -> (StatusCode, &'static str, &'static str) {
    match status {
        401 => (
            StatusCode::UNAUTHORIZED,
            "authentication_error",
            "upstream_unauthorized",
        ),
        403 => (
            StatusCode::FORBIDDEN,
            "permission_error",
            "upstream_forbidden",
        ),
        429 => (
            StatusCode::TOO_MANY_REQUESTS,
            "rate_limit_error",
            "rate_limit_exceeded",
        ),
        _ => (StatusCode::BAD_GATEWAY, "server_error", "upstream_error"),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, error_code) = self.classify();
        // Error messages stay generic: no credentials, no upstream payloads.
        let message = self.0.to_string();
        (
            status,
            Json(json!({
                "error": {
                    "message": message,
                    "type": error_type,
                    "code": error_code,
                }
            })),
        )
            .into_response()
    }
}

impl<E: Into<ClaudineError>> From<E> for ApiError {
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use claudine_types::{AuthError, StoreError, TranslateError};
    use http_body_util::BodyExt as _;

    async fn extract(err: ApiError) -> (StatusCode, serde_json::Value) {
        let resp = err.into_response();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_translate_error_is_400() {
        let (status, body) = extract(ApiError(
            TranslateError::InvalidRequest("model is required".into()).into(),
        ))
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["type"], "invalid_request_error");
        assert!(body["error"]["message"]
            .as_str()
            .unwrap()
            .contains("model is required"));
    }

    #[tokio::test]
    async fn test_auth_error_is_401() {
        let (status, body) =
            extract(ApiError(AuthError::Unauthorized("invalid_grant".into()).into())).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["type"], "authentication_error");
    }

    #[tokio::test]
    async fn test_store_error_is_401() {
        let (status, _) =
            extract(ApiError(StoreError::Missing("no token".into()).into())).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_upstream_429_forwarded() {
        let (status, body) =
            extract(ApiError(ClaudineError::Upstream { status: 429 })).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["error"]["type"], "rate_limit_error");
    }

    #[tokio::test]
    async fn test_upstream_500_becomes_502() {
        let (status, body) =
            extract(ApiError(ClaudineError::Upstream { status: 500 })).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        // The upstream body never leaks into our error message.
        assert_eq!(body["error"]["message"], "upstream returned status 500");
    }

    #[tokio::test]
    async fn test_http_error_is_502() {
        let (status, _) =
            extract(ApiError(ClaudineError::Http("connection refused".into()))).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_error_shape_matches_openai() {
        let (_, body) = extract(ApiError(ClaudineError::Config("bad".into()))).await;
        assert!(body["error"]["message"].is_string());
        assert!(body["error"]["type"].is_string());
        assert!(body["error"]["code"].is_string());
    }
}
