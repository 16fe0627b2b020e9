//! Anthropic Messages passthrough handler.
//!
//! Accepts requests in native Anthropic format and forwards them to the
//! upstream `/messages` endpoint with impersonation applied. The response
//! streams back chunk for chunk: bytes reach the client exactly when the
//! upstream sends them, which is what keeps SSE latency at zero.

use crate::error::ApiError;
use crate::AppState;
use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::response::Response;
use claudine_types::ClaudineError;
use futures_util::TryStreamExt as _;
use std::io;
use std::sync::Arc;

/// Response headers that must not be forwarded verbatim: hop-by-hop fields,
/// plus lengths invalidated by re-chunking.
const SKIPPED_RESPONSE_HEADERS: [&str; 4] = [
    "connection",
    "keep-alive",
    "transfer-encoding",
    "content-length",
];

/// Handles `POST {upstream_path}/messages`.
pub async fn messages(
    State(state): State<Arc<AppState>>,
    req: Request,
) -> Result<Response, ApiError> {
    let (parts, body) = req.into_parts();

    let token = state.tokens.token().await?;
    let upstream = state
        .upstream
        .post_messages(&parts.headers, &token.access_token, body)
        .await?;

    // Forward status and headers bit-exact (minus hop-by-hop fields); the
    // upstream speaks the same protocol the client asked for.
    let status = StatusCode::from_u16(upstream.status().as_u16())
        .unwrap_or(StatusCode::BAD_GATEWAY);
    let mut response = Response::builder().status(status);
    for (name, value) in upstream.headers() {
        if SKIPPED_RESPONSE_HEADERS.contains(&name.as_str()) {
            continue;
        }
        response = response.header(name.as_str(), value.as_bytes());
    }

    let stream = upstream.bytes_stream().map_err(io::Error::other);
    response
        .body(Body::from_stream(stream))
        .map_err(|e| ApiError::from(ClaudineError::Http(e.to_string())))
}
