//! Error types for the claudine workspace.

use thiserror::Error;

/// Errors produced by token storage backends.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No stored token exists.
    #[error("token not found: {0}")]
    Missing(String),

    /// A token was found but is empty after trimming.
    #[error("empty token in {0}")]
    Empty(String),

    /// The token file has permissions other than 0600.
    #[error("insecure permissions on {path}: {mode:04o} (expected 0600)")]
    InsecurePermissions { path: String, mode: u32 },

    /// The storage backend cannot be written to (environment variables).
    #[error("storage is read-only")]
    ReadOnly,

    /// Underlying filesystem failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// OS credential store failure.
    #[error("keyring error: {0}")]
    Keyring(String),
}

/// Errors produced by the OAuth token refresh flow.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The token endpoint could not be reached or timed out.
    #[error("token refresh network error: {0}")]
    Network(String),

    /// The token endpoint rejected the refresh token (HTTP 401).
    #[error("token refresh rejected: {0}")]
    Unauthorized(String),

    /// The token endpoint returned an unparseable response.
    #[error("unexpected token response: {0}")]
    Parse(String),
}

/// Errors produced while translating between OpenAI and Anthropic formats.
#[derive(Debug, Error)]
pub enum TranslateError {
    /// The request body is not valid JSON.
    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    /// The request is structurally valid but missing or misusing a field.
    #[error("{0}")]
    InvalidRequest(String),

    /// The request uses a field with no Anthropic equivalent that cannot be
    /// silently dropped (e.g. the deprecated `function` role).
    #[error("unsupported field: {0}")]
    Unsupported(String),

    /// Tool call arguments could not be parsed as JSON.
    #[error("malformed tool arguments: {0}")]
    ToolArguments(String),
}

/// Errors surfaced while relaying a streaming response.
#[derive(Debug, Error)]
pub enum StreamError {
    /// The upstream connection dropped mid-stream.
    #[error("upstream disconnected: {0}")]
    UpstreamDisconnect(String),

    /// The upstream sent an error event or a frame we could not decode.
    #[error("upstream protocol error: {0}")]
    UpstreamProtocol(String),

    /// The client went away; there is nobody left to write to.
    #[error("client disconnected")]
    ClientDisconnect,
}

/// Unified error type spanning all claudine crates.
#[derive(Debug, Error)]
pub enum ClaudineError {
    /// Configuration loading or validation error (startup-fatal).
    #[error("configuration error: {0}")]
    Config(String),

    /// Token storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// OAuth refresh error.
    #[error("authentication error: {0}")]
    Auth(#[from] AuthError),

    /// Request or response format translation error.
    #[error("translation error: {0}")]
    Translate(#[from] TranslateError),

    /// Streaming relay error.
    #[error("stream error: {0}")]
    Stream(#[from] StreamError),

    /// HTTP transport error.
    #[error("http error: {0}")]
    Http(String),

    /// JSON serialization or deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The upstream API returned a non-success status. The body is
    /// intentionally not carried here; error responses stay generic.
    #[error("upstream returned status {status}")]
    Upstream { status: u16 },
}
