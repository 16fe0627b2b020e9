//! OpenAI chat completions compatibility handler.
//!
//! Translates the request to Anthropic Messages format, forwards it through
//! the impersonating upstream, and translates the response back: buffered
//! for plain requests, event by event for streaming ones.

use crate::error::ApiError;
use crate::sse::{sse_response, SseParser, SseWriter};
use crate::AppState;
use axum::body::{Body, Bytes};
use axum::http::HeaderMap;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use claudine_translate::{translate_event, AnthropicToOpenAi, OpenAiToAnthropic, StreamContext};
use claudine_types::{ClaudineError, RequestTranslator as _, ResponseTranslator as _, TranslateError};
use futures_util::StreamExt as _;
use serde_json::{json, Value};
use std::sync::Arc;

/// Handles `POST {upstream_path}/chat/completions`.
pub async fn chat_completions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let request: Value = serde_json::from_slice(&body)
        .map_err(|e| TranslateError::InvalidJson(e.to_string()))?;

    let stream = request
        .get("stream")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    // The translator reads the web-search env override at construction, one
    // read per request.
    let mut anthropic_request = OpenAiToAnthropic::from_env().translate_request(request)?;
    anthropic_request["stream"] = Value::Bool(stream);

    let token = state.tokens.token().await?;
    let body = serde_json::to_vec(&anthropic_request).map_err(ClaudineError::from)?;
    let upstream = state
        .upstream
        .post_messages(&headers, &token.access_token, Body::from(body))
        .await?;

    let status = upstream.status();
    if !status.is_success() {
        return Err(ClaudineError::Upstream {
            status: status.as_u16(),
        }
        .into());
    }

    if stream {
        let (writer, body) = SseWriter::channel();
        tokio::spawn(relay_stream(upstream, writer));
        Ok(sse_response(body))
    } else {
        let message: Value = upstream
            .json()
            .await
            .map_err(|e| ClaudineError::Http(e.to_string()))?;
        let completion = AnthropicToOpenAi.translate_response(message)?;
        Ok(Json(completion).into_response())
    }
}

/// Relay the upstream Anthropic event stream to the client as OpenAI
/// chunks. Ends with the `[DONE]` marker on success; an error mid-stream
/// produces a single `{"error": ...}` frame instead (the OpenAI SDK
/// recognizes that shape and stops reading) and no `[DONE]`.
async fn relay_stream(upstream: rquest::Response, writer: SseWriter) {
    let mut ctx = StreamContext::new();
    let mut parser = SseParser::new();
    let mut upstream = upstream.bytes_stream();

    while let Some(next) = upstream.next().await {
        let chunk = match next {
            Ok(chunk) => chunk,
            Err(err) => {
                tracing::error!(error = %err, "upstream stream failed");
                let _ = writer.write_data(&error_frame("upstream disconnected")).await;
                return;
            }
        };

        for frame in parser.push(&chunk) {
            if frame.data.is_empty() {
                continue;
            }
            let event: Value = match serde_json::from_str(&frame.data) {
                Ok(event) => event,
                Err(err) => {
                    tracing::error!(error = %err, "undecodable upstream event");
                    let _ = writer
                        .write_data(&error_frame("upstream protocol error"))
                        .await;
                    return;
                }
            };

            match translate_event(&mut ctx, &event) {
                Ok(Some(chunk)) => {
                    if writer.write_data(&chunk).await.is_err() {
                        // Client went away; stop reading upstream.
                        tracing::debug!("client disconnected during stream");
                        return;
                    }
                }
                Ok(None) => {}
                Err(err) => {
                    tracing::error!(error = %err, "stream translation failed");
                    let _ = writer
                        .write_data(&error_frame("upstream protocol error"))
                        .await;
                    return;
                }
            }
        }
    }

    // OpenAI streaming protocol requires the [DONE] marker.
    if writer.write_raw("[DONE]").await.is_err() {
        tracing::debug!("client disconnected before stream end");
    }
}

fn error_frame(message: &str) -> Value {
    json!({"error": {"message": message, "type": "upstream_error", "code": "stream_error"}})
}
