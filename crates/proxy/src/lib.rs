//! HTTP proxy layer: axum router, handlers, and middleware.
//!
//! Exposes the Anthropic Messages passthrough and the OpenAI-compatible
//! `/chat/completions` endpoint, both behind the impersonating upstream and
//! the shared token source.

pub mod chat;
pub mod error;
pub mod impersonate;
pub mod inject;
pub mod messages;
pub mod sse;

pub use error::ApiError;
pub use impersonate::Upstream;
pub use inject::{inject_system_prompt, SYSTEM_PROMPT};

use axum::extract::DefaultBodyLimit;
use axum::http::{header, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use claudine_types::TokenSource;
use serde_json::json;
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;

/// Largest accepted request body; larger requests get 413.
pub const MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

/// Shared application state passed to all route handlers.
pub struct AppState {
    /// Impersonating connection to the Anthropic API.
    pub upstream: Upstream,
    /// Process-wide token source shared by all outbound requests.
    pub tokens: Arc<dyn TokenSource>,
}

impl AppState {
    /// Creates shared application state wrapped in an `Arc`.
    pub fn new(upstream: Upstream, tokens: Arc<dyn TokenSource>) -> Arc<Self> {
        Arc::new(Self { upstream, tokens })
    }
}

/// Build the axum router.
///
/// Routes (both POST, derived from the upstream path):
/// - `{upstream_path}/messages`: Anthropic passthrough
/// - `{upstream_path}/chat/completions`: OpenAI compatibility layer
///
/// Middleware, outermost first: panic recovery, then request logging.
pub fn make_router(state: Arc<AppState>, upstream_path: &str) -> Router {
    let prefix = upstream_path.trim_end_matches('/');

    Router::new()
        .route(&format!("{prefix}/messages"), post(messages::messages))
        .route(
            &format!("{prefix}/chat/completions"),
            post(chat::chat_completions),
        )
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(
            // Method, path, status, duration. Headers are limited to the
            // allow-list below; bodies are never logged.
            TraceLayer::new_for_http()
                .make_span_with(|req: &Request<_>| {
                    tracing::info_span!(
                        "request",
                        method = %req.method(),
                        path = %req.uri().path(),
                        content_type = header_or_empty(req, header::CONTENT_TYPE),
                        origin = header_or_empty(req, header::ORIGIN),
                    )
                })
                .on_response(
                    |res: &Response, latency: Duration, _span: &tracing::Span| {
                        tracing::info!(
                            status = res.status().as_u16(),
                            duration_ms = latency.as_millis() as u64,
                            "request served"
                        );
                    },
                ),
        )
        .layer(CatchPanicLayer::custom(recover))
        .with_state(state)
}

fn header_or_empty<B>(req: &Request<B>, name: header::HeaderName) -> &str {
    req.headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("")
}

/// Convert a handler panic into a 500 response; the panic itself is logged
/// here, never surfaced to the client.
fn recover(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("panic");
    tracing::error!(panic = detail, "handler panicked");

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "error": {
                "message": "Internal Server Error",
                "type": "server_error",
                "code": "internal_error",
            }
        })),
    )
        .into_response()
}
