//! Async traits shared across the claudine crates.
//!
//! Cross-crate abstractions live here so that higher layers depend only on
//! `claudine-types`, not on each other.

use crate::{ClaudineError, StoreError, Token, TranslateError};
use async_trait::async_trait;
use serde_json::Value;

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, ClaudineError>;

/// Persistent storage for the single stored refresh token.
///
/// OAuth authentication requires a writable backend; read-only backends
/// (environment variables) support only static tokens.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Return the stored token, trimmed of surrounding whitespace.
    async fn read(&self) -> std::result::Result<String, StoreError>;

    /// Persist the token, replacing any previous value.
    async fn write(&self, token: &str) -> std::result::Result<(), StoreError>;
}

/// Produces valid access tokens, refreshing as needed.
///
/// Contract: safe to call concurrently; concurrent callers observe identical
/// tokens and at most one underlying refresh runs per expiry.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Obtain a valid token, refreshing if the cached one is expired.
    async fn token(&self) -> Result<Token>;
}

/// Translates an OpenAI-format request into the Anthropic Messages format.
///
/// Implementations perform no network I/O.
pub trait RequestTranslator: Send + Sync {
    /// Convert an OpenAI-compatible JSON request body to Anthropic format.
    ///
    /// # Errors
    ///
    /// Returns [`TranslateError`] if the request cannot be translated.
    fn translate_request(&self, req: Value) -> std::result::Result<Value, TranslateError>;
}

/// Translates an Anthropic response back to OpenAI format.
///
/// Implementations perform no network I/O.
pub trait ResponseTranslator: Send + Sync {
    /// Convert an Anthropic Messages JSON response body to OpenAI format.
    ///
    /// # Errors
    ///
    /// Returns [`TranslateError`] if the response cannot be translated.
    fn translate_response(&self, res: Value) -> std::result::Result<Value, TranslateError>;
}
