//! Outbound request construction impersonating the Claude Code client.
//!
//! Inbound headers pass through a fixed allow-list, the impersonation
//! headers are set on top, and POST bodies stream through the system-prompt
//! injector via a producer/consumer pipe, so the proxy never buffers a
//! request body.

use crate::inject::inject_system_prompt;
use axum::body::Body;
use axum::http::HeaderMap;
use bytes::Bytes;
use claudine_types::ClaudineError;
use futures_util::TryStreamExt as _;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::AsyncWrite;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::io::StreamReader;
use tokio_util::sync::PollSender;

/// Required Anthropic API version header value.
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Beta features required for OAuth bearer access as the Claude Code client.
const REQUIRED_BETAS: [&str; 2] = ["claude-code-20250219", "oauth-2025-04-20"];

/// Inbound headers permitted through to the Anthropic API. Everything else
/// (User-Agent, X-*, Baggage, cookies) is dropped: client-side headers must
/// not break the impersonation or leak into upstream requests.
///
/// Traceparent/Tracestate carry W3C trace context end to end; Baggage stays
/// out because it propagates application-level context, not tracing data.
const ALLOWED_HEADERS: [&str; 7] = [
    "content-type",
    "content-length",
    "accept",
    "accept-encoding",
    "authorization",
    "traceparent",
    "tracestate",
];

/// Bound on waiting for upstream response headers; the response body itself
/// (a long SSE stream) is unbounded.
const RESPONSE_HEADER_TIMEOUT: Duration = Duration::from_secs(30);

/// Merge inbound `Anthropic-Beta` features after the required set: trimmed,
/// order preserved, duplicates removed (case-sensitive, compared against
/// everything already present).
pub fn build_beta_header(incoming: Option<&str>) -> String {
    let mut header = REQUIRED_BETAS.join(",");
    let mut present: Vec<&str> = REQUIRED_BETAS.to_vec();

    if let Some(incoming) = incoming {
        for feature in incoming.split(',') {
            let feature = feature.trim();
            if feature.is_empty() || present.contains(&feature) {
                continue;
            }
            present.push(feature);
            header.push(',');
            header.push_str(feature);
        }
    }

    header
}

/// Select the inbound headers that may cross to the upstream request.
fn filter_headers(inbound: &HeaderMap) -> Vec<(&'static str, String)> {
    let mut filtered = Vec::new();
    for name in ALLOWED_HEADERS {
        for value in inbound.get_all(name) {
            if let Ok(value) = value.to_str() {
                filtered.push((name, value.to_string()));
            }
        }
    }
    filtered
}

/// Upstream Anthropic API connection shared by all handlers. Holds the
/// pooled HTTP client.
pub struct Upstream {
    http: rquest::Client,
    base_url: String,
}

impl Upstream {
    /// Create an upstream for the given base URL (e.g.
    /// `https://api.anthropic.com/v1`).
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: rquest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// POST a request body to `{base}/messages` as the Claude Code client.
    ///
    /// The body streams through the system-prompt injector; its length
    /// changes, so Content-Length is dropped and the request goes out
    /// chunked. The inbound Authorization header is replaced with the OAuth
    /// bearer token.
    ///
    /// # Errors
    ///
    /// Returns an error if the upstream cannot be reached or its response
    /// headers do not arrive within the timeout.
    pub async fn post_messages(
        &self,
        inbound: &HeaderMap,
        access_token: &str,
        body: Body,
    ) -> Result<rquest::Response, ClaudineError> {
        let url = format!("{}/messages", self.base_url);

        let mut request = self.http.post(&url);
        for (name, value) in filter_headers(inbound) {
            // Content-Length is invalidated by the body rewrite and
            // Authorization is replaced below.
            if name == "content-length" || name == "authorization" {
                continue;
            }
            request = request.header(name, value);
        }

        let beta = build_beta_header(
            inbound
                .get("anthropic-beta")
                .and_then(|value| value.to_str().ok()),
        );

        let request = request
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("anthropic-beta", beta)
            .header("authorization", format!("Bearer {access_token}"))
            .body(transform_body(body));

        let response = tokio::time::timeout(RESPONSE_HEADER_TIMEOUT, request.send())
            .await
            .map_err(|_| {
                ClaudineError::Http("timed out waiting for upstream response headers".into())
            })?
            .map_err(|e| ClaudineError::Http(e.to_string()))?;

        Ok(response)
    }
}

/// Pipe the inbound body through the injector into a fresh outbound body.
///
/// The producer task exits when the consumer goes away: dropping the
/// receiving half fails the next channel send with a broken pipe, which
/// unwinds the injector. Injector failures (malformed client JSON) propagate
/// into the outbound body stream so the request errors instead of sending a
/// truncated body.
fn transform_body(body: Body) -> rquest::Body {
    let (tx, rx) = tokio::sync::mpsc::channel::<Result<Bytes, io::Error>>(8);

    let inbound = StreamReader::new(body.into_data_stream().map_err(io::Error::other));

    let error_tx = tx.clone();
    tokio::spawn(async move {
        let mut reader = inbound;
        let mut writer = ChannelWriter {
            tx: PollSender::new(tx),
        };
        if let Err(err) = inject_system_prompt(&mut reader, &mut writer).await {
            if err.kind() == io::ErrorKind::BrokenPipe {
                tracing::debug!("request body pipe closed by consumer");
            } else {
                tracing::debug!(error = %err, "request body transform failed");
                let _ = error_tx.send(Err(err)).await;
            }
        }
        // Dropping both senders ends the outbound body.
    });

    rquest::Body::wrap_stream(ReceiverStream::new(rx))
}

/// [`AsyncWrite`] half of the body pipe: each write becomes one chunk on the
/// outbound stream.
struct ChannelWriter {
    tx: PollSender<Result<Bytes, io::Error>>,
}

fn pipe_closed() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "request body consumer closed")
}

impl AsyncWrite for ChannelWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        match this.tx.poll_reserve(cx) {
            Poll::Ready(Ok(())) => {
                this.tx
                    .send_item(Ok(Bytes::copy_from_slice(buf)))
                    .map_err(|_| pipe_closed())?;
                Poll::Ready(Ok(buf.len()))
            }
            Poll::Ready(Err(_)) => Poll::Ready(Err(pipe_closed())),
            Poll::Pending => Poll::Pending,
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.get_mut().tx.close();
        Poll::Ready(Ok(()))
    }
}
