//! Anthropic OAuth 2.0 endpoint constants.
//!
//! Anthropic uses a public client (no client secret) with PKCE. The token
//! endpoint deviates from RFC 6749 in one way: it expects a JSON request
//! body rather than form encoding.

/// Public OAuth2 client identifier for Anthropic Claude.
pub const CLIENT_ID: &str = "9d1c250a-e61b-44d9-88ed-5944d1962f5e";

/// Authorization endpoint (Claude Pro/Max).
pub const AUTH_URL: &str = "https://claude.ai/oauth/authorize";

/// Token endpoint. JSON body, not form-encoded.
pub const TOKEN_URL: &str = "https://console.anthropic.com/v1/oauth/token";

/// OAuth scopes requested during authorization.
pub const SCOPES: &[&str] = &["org:create_api_key", "user:profile", "user:inference"];
