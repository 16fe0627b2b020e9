//! Server-Sent Events framing: a writer for our responses and a parser for
//! the upstream stream.

use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::Response;
use bytes::Bytes;
use claudine_types::StreamError;
use serde::Serialize;
use std::io;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

// Precomputed framing so writes only assemble payload bytes.
const DATA_PREFIX: &[u8] = b"data: ";
const COMMENT_PREFIX: &[u8] = b": ";
const TERMINATOR: &[u8] = b"\n\n";

/// Writer half of an SSE response. Each frame is sent as one body chunk, so
/// it reaches the client as soon as it is written; there is no intermediate
/// buffering to flush.
pub struct SseWriter {
    tx: mpsc::Sender<Result<Bytes, io::Error>>,
}

impl SseWriter {
    /// Create a writer and the response body it feeds.
    #[must_use]
    pub fn channel() -> (Self, Body) {
        let (tx, rx) = mpsc::channel(16);
        (Self { tx }, Body::from_stream(ReceiverStream::new(rx)))
    }

    /// JSON-encode `value` and write it as a `data:` frame.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::ClientDisconnect`] when the client is gone.
    pub async fn write_data<T: Serialize>(&self, value: &T) -> Result<(), StreamError> {
        let mut frame = Vec::with_capacity(128);
        frame.extend_from_slice(DATA_PREFIX);
        serde_json::to_writer(&mut frame, value)
            .map_err(|e| StreamError::UpstreamProtocol(e.to_string()))?;
        frame.extend_from_slice(TERMINATOR);
        self.send(frame).await
    }

    /// Write a raw string as a `data:` frame without JSON encoding. Embedded
    /// newlines are re-prefixed per the SSE protocol and carriage returns
    /// escaped literally.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::ClientDisconnect`] when the client is gone.
    pub async fn write_raw(&self, data: &str) -> Result<(), StreamError> {
        let escaped = data.replace('\n', "\ndata:").replace('\r', "\\r");
        let mut frame = Vec::with_capacity(DATA_PREFIX.len() + escaped.len() + TERMINATOR.len());
        frame.extend_from_slice(DATA_PREFIX);
        frame.extend_from_slice(escaped.as_bytes());
        frame.extend_from_slice(TERMINATOR);
        self.send(frame).await
    }

    /// Write an SSE comment (a line starting with `:`). Ignored by clients
    /// but visible in network logs.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::ClientDisconnect`] when the client is gone.
    pub async fn write_comment(&self, comment: &str) -> Result<(), StreamError> {
        let escaped = comment.replace('\n', "\n: ").replace('\r', "\\r");
        let mut frame = Vec::with_capacity(COMMENT_PREFIX.len() + escaped.len() + TERMINATOR.len());
        frame.extend_from_slice(COMMENT_PREFIX);
        frame.extend_from_slice(escaped.as_bytes());
        frame.extend_from_slice(TERMINATOR);
        self.send(frame).await
    }

    async fn send(&self, frame: Vec<u8>) -> Result<(), StreamError> {
        self.tx
            .send(Ok(Bytes::from(frame)))
            .await
            .map_err(|_| StreamError::ClientDisconnect)
    }
}

/// Build the streaming response around an SSE body.
pub fn sse_response(body: Body) -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream;charset=utf-8")
        .header(header::CONNECTION, "keep-alive")
        .header(header::CACHE_CONTROL, "no-cache")
        .header("x-accel-buffering", "no")
        .body(body)
        .expect("valid response")
}

/// One parsed upstream SSE frame.
pub struct SseFrame {
    pub event: Option<String>,
    pub data: String,
}

/// Incremental parser for the upstream SSE byte stream. Feed it chunks as
/// they arrive; it yields complete frames and buffers partial lines.
#[derive(Default)]
pub struct SseParser {
    buf: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseParser {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume a chunk and return any frames it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buf.extend_from_slice(chunk);
        let mut frames = Vec::new();

        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                // Blank line terminates the frame.
                if self.event.is_some() || !self.data.is_empty() {
                    frames.push(SseFrame {
                        event: self.event.take(),
                        data: std::mem::take(&mut self.data).join("\n"),
                    });
                }
            } else if let Some(value) = line.strip_prefix("data:") {
                self.data
                    .push(value.strip_prefix(' ').unwrap_or(value).to_string());
            } else if let Some(value) = line.strip_prefix("event:") {
                self.event = Some(value.trim().to_string());
            }
            // Comments (leading ':') and unknown fields are ignored.
        }

        frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt as _;

    async fn collect(body: Body) -> String {
        let bytes = body.collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_write_data_frames_json() {
        let (writer, body) = SseWriter::channel();
        writer
            .write_data(&serde_json::json!({"x": 1}))
            .await
            .unwrap();
        drop(writer);
        assert_eq!(collect(body).await, "data: {\"x\":1}\n\n");
    }

    #[tokio::test]
    async fn test_write_raw_done_marker() {
        let (writer, body) = SseWriter::channel();
        writer.write_raw("[DONE]").await.unwrap();
        drop(writer);
        assert_eq!(collect(body).await, "data: [DONE]\n\n");
    }

    #[tokio::test]
    async fn test_write_raw_escapes_newlines() {
        let (writer, body) = SseWriter::channel();
        writer.write_raw("line1\nline2\rend").await.unwrap();
        drop(writer);
        assert_eq!(collect(body).await, "data: line1\ndata:line2\\rend\n\n");
    }

    #[tokio::test]
    async fn test_write_comment_escapes_newlines() {
        let (writer, body) = SseWriter::channel();
        writer.write_comment("a\nb").await.unwrap();
        drop(writer);
        assert_eq!(collect(body).await, ": a\n: b\n\n");
    }

    #[tokio::test]
    async fn test_write_after_client_disconnect() {
        let (writer, body) = SseWriter::channel();
        drop(body);
        let err = writer.write_raw("[DONE]").await.unwrap_err();
        assert!(matches!(err, StreamError::ClientDisconnect));
    }

    #[test]
    fn test_sse_response_headers() {
        let resp = sse_response(Body::empty());
        assert_eq!(
            resp.headers().get("content-type").unwrap(),
            "text/event-stream;charset=utf-8"
        );
        assert_eq!(resp.headers().get("cache-control").unwrap(), "no-cache");
    }

    #[test]
    fn test_parser_single_frame() {
        let mut parser = SseParser::new();
        let frames = parser.push(b"event: message_start\ndata: {\"type\":\"message_start\"}\n\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event.as_deref(), Some("message_start"));
        assert_eq!(frames[0].data, "{\"type\":\"message_start\"}");
    }

    #[test]
    fn test_parser_handles_split_chunks() {
        let mut parser = SseParser::new();
        assert!(parser.push(b"data: {\"a\":").is_empty());
        assert!(parser.push(b"1}\n").is_empty());
        let frames = parser.push(b"\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data, "{\"a\":1}");
    }

    #[test]
    fn test_parser_multiline_data_joined() {
        let mut parser = SseParser::new();
        let frames = parser.push(b"data: line1\ndata: line2\n\n");
        assert_eq!(frames[0].data, "line1\nline2");
    }

    #[test]
    fn test_parser_ignores_comments() {
        let mut parser = SseParser::new();
        let frames = parser.push(b": keepalive\n\ndata: x\n\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data, "x");
    }

    #[test]
    fn test_parser_crlf_lines() {
        let mut parser = SseParser::new();
        let frames = parser.push(b"data: x\r\n\r\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data, "x");
    }

    #[test]
    fn test_parser_multiple_frames_one_chunk() {
        let mut parser = SseParser::new();
        let frames = parser.push(b"data: 1\n\ndata: 2\n\n");
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].data, "1");
        assert_eq!(frames[1].data, "2");
    }
}
