//! Token sources: automatic OAuth refresh and static tokens.

use crate::endpoints;
use async_trait::async_trait;
use claudine_types::{AuthError, Result, Token, TokenSource};
use serde_json::{json, Value};
use std::time::Duration;

/// Hard bound on a refresh round-trip. The [`TokenSource`] contract has no
/// cancellation input, so the timeout lives on the dedicated client and
/// applies even when outer request cancellation never reaches us.
const REFRESH_TIMEOUT: Duration = Duration::from_secs(30);

/// A [`TokenSource`] that exchanges a refresh token for access tokens.
///
/// Safe to call concurrently: the cached token sits behind an async mutex, so
/// concurrent callers observe the same token and at most one refresh runs per
/// expiry.
pub struct RefreshTokenSource {
    http: rquest::Client,
    token_url: String,
    current: tokio::sync::Mutex<Token>,
}

impl RefreshTokenSource {
    /// Create a source from an initial refresh token. No I/O happens until
    /// the first [`TokenSource::token`] call.
    #[must_use]
    pub fn new(initial_refresh_token: impl Into<String>) -> Self {
        let http = rquest::Client::builder()
            .timeout(REFRESH_TIMEOUT)
            .build()
            .expect("failed to build refresh http client");

        Self {
            http,
            token_url: endpoints::TOKEN_URL.to_string(),
            current: tokio::sync::Mutex::new(
                Token::new("").with_refresh(initial_refresh_token),
            ),
        }
    }

    /// Override the token endpoint (tests, staging).
    #[must_use]
    pub fn with_token_url(mut self, token_url: impl Into<String>) -> Self {
        self.token_url = token_url.into();
        self
    }

    async fn refresh(&self, refresh_token: &str) -> std::result::Result<Token, AuthError> {
        // Anthropic's token endpoint expects JSON, not the form encoding
        // RFC 6749 prescribes.
        let resp = self
            .http
            .post(&self.token_url)
            .header("Accept", "application/json")
            .json(&json!({
                "grant_type": "refresh_token",
                "refresh_token": refresh_token,
                "client_id": endpoints::CLIENT_ID,
            }))
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        let status = resp.status();
        let body: Value = resp
            .json()
            .await
            .map_err(|e| AuthError::Parse(e.to_string()))?;

        if !status.is_success() {
            let desc = body
                .get("error_description")
                .or_else(|| body.get("error"))
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string();
            if status.as_u16() == 401 {
                return Err(AuthError::Unauthorized(desc));
            }
            return Err(AuthError::Network(format!("refresh failed ({status}): {desc}")));
        }

        parse_token_response(&body)
    }
}

#[async_trait]
impl TokenSource for RefreshTokenSource {
    async fn token(&self) -> Result<Token> {
        let mut current = self.current.lock().await;
        if !current.is_expired() {
            return Ok(current.clone());
        }

        let mut fresh = self.refresh(&current.refresh_token).await?;
        // The endpoint may omit the refresh token when it does not rotate.
        if fresh.refresh_token.is_empty() {
            fresh.refresh_token = current.refresh_token.clone();
        }
        *current = fresh.clone();
        tracing::debug!("access token refreshed");
        Ok(fresh)
    }
}

/// Parse a token endpoint JSON response into a [`Token`].
fn parse_token_response(body: &Value) -> std::result::Result<Token, AuthError> {
    let access_token = body
        .get("access_token")
        .and_then(Value::as_str)
        .ok_or_else(|| AuthError::Parse("missing access_token in response".into()))?;

    let mut token = Token::new(access_token);
    if let Some(refresh) = body.get("refresh_token").and_then(Value::as_str) {
        token = token.with_refresh(refresh);
    }
    if let Some(expires_in) = body.get("expires_in").and_then(Value::as_u64) {
        token = token.with_expiry(expires_in);
    }
    Ok(token)
}

/// A [`TokenSource`] for static tokens: the stored token is used as the
/// access token verbatim. The empty refresh token keeps it out of the
/// persistence write-back path.
pub struct StaticTokenSource {
    token: String,
}

impl StaticTokenSource {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenSource for StaticTokenSource {
    async fn token(&self) -> Result<Token> {
        Ok(Token::new(self.token.clone()))
    }
}
