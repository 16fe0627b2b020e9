//! OAuth token representation and expiry logic.

use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime};

/// Leeway subtracted from the expiry when deciding whether to refresh, so a
/// token never expires mid-request.
const EXPIRY_LEEWAY: Duration = Duration::from_secs(60);

/// An access token with its rotating refresh token and expiry.
///
/// For persistence purposes two tokens are considered equal when their
/// `refresh_token` matches; the access token is never written to storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,
    /// Empty for static tokens, which never refresh and never persist.
    #[serde(default)]
    pub refresh_token: String,
    /// `None` means the token does not expire.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<SystemTime>,
}

impl Token {
    /// Create a token with the given access token, no refresh token, and no
    /// expiry.
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: String::new(),
            expires_at: None,
        }
    }

    /// Attach a refresh token.
    #[must_use]
    pub fn with_refresh(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = refresh_token.into();
        self
    }

    /// Set the expiry to `expires_in_secs` seconds from now.
    #[must_use]
    pub fn with_expiry(mut self, expires_in_secs: u64) -> Self {
        self.expires_at = Some(SystemTime::now() + Duration::from_secs(expires_in_secs));
        self
    }

    /// Return `true` if the token is missing, expired, or expires within the
    /// leeway window.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        if self.access_token.is_empty() {
            return true;
        }
        match self.expires_at {
            Some(expires_at) => SystemTime::now() + EXPIRY_LEEWAY >= expires_at,
            None => false,
        }
    }
}
