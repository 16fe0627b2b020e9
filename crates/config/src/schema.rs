//! Configuration schema, defaults, and validation.

use claudine_types::ClaudineError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Logging output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

/// Where the stored token lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    File,
    /// Read-only; supports only static tokens.
    Env,
    Keyring,
}

/// How the stored token becomes an access token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMethod {
    OAuth,
    Static,
}

/// Listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 4000,
        }
    }
}

/// Graceful shutdown behavior, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutdownConfig {
    /// Pause between the shutdown signal and the start of draining.
    pub delay: u64,
    /// How long in-flight requests may drain before the listener is
    /// force-closed.
    pub timeout: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            delay: 0,
            timeout: 10,
        }
    }
}

/// Upstream API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    pub base_url: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.anthropic.com/v1".into(),
        }
    }
}

/// Authentication configuration: which store holds the token and how the
/// stored token is used. Exactly one storage-specific field applies,
/// matching `storage`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub storage: StorageKind,
    /// File storage: path to the token file.
    #[serde(default)]
    pub file: Option<PathBuf>,
    /// Env storage: environment variable name.
    #[serde(default)]
    pub env_key: Option<String>,
    /// Keyring storage: user identifier.
    #[serde(default)]
    pub keyring_user: Option<String>,
    pub method: AuthMethod,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            storage: StorageKind::Keyring,
            file: None,
            env_key: None,
            keyring_user: None,
            method: AuthMethod::OAuth,
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_format")]
    pub log_format: LogFormat,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub shutdown: ShutdownConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            server: ServerConfig::default(),
            shutdown: ShutdownConfig::default(),
            upstream: UpstreamConfig::default(),
            auth: AuthConfig::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> LogFormat {
    LogFormat::Text
}

impl Config {
    /// Fill storage-dependent fields that have sensible machine-derived
    /// defaults: the per-OS token file path and the current OS user for the
    /// keyring.
    ///
    /// # Errors
    ///
    /// Returns [`ClaudineError::Config`] when a default cannot be derived.
    pub fn apply_defaults(&mut self) -> Result<(), ClaudineError> {
        if self.log_level.is_empty() {
            self.log_level = default_log_level();
        }

        match self.auth.storage {
            StorageKind::File => {
                if self.auth.file.is_none() {
                    let config_dir = dirs::config_dir().ok_or_else(|| {
                        ClaudineError::Config(
                            "auth.file required (no user config directory found)".into(),
                        )
                    })?;
                    self.auth.file = Some(config_dir.join("claudine-proxy").join("auth"));
                }
            }
            StorageKind::Keyring => {
                if self.auth.keyring_user.is_none() {
                    let user = std::env::var("USER")
                        .or_else(|_| std::env::var("USERNAME"))
                        .map_err(|_| {
                            ClaudineError::Config(
                                "auth.keyring_user required (no current user found)".into(),
                            )
                        })?;
                    self.auth.keyring_user = Some(user);
                }
            }
            // env_key has no sensible default; validation requires it.
            StorageKind::Env => {}
        }

        Ok(())
    }

    /// Validate the configuration. Called once at startup; failures are
    /// fatal.
    ///
    /// # Errors
    ///
    /// Returns [`ClaudineError::Config`] describing the first problem found.
    pub fn validate(&self) -> Result<(), ClaudineError> {
        if self.server.host.is_empty() {
            return Err(ClaudineError::Config("server.host cannot be empty".into()));
        }

        let url = url::Url::parse(&self.upstream.base_url)
            .map_err(|e| ClaudineError::Config(format!("invalid upstream.base_url: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ClaudineError::Config(format!(
                "invalid upstream.base_url scheme: {}",
                url.scheme()
            )));
        }

        // OAuth rotates refresh tokens and must be able to write them back.
        if self.auth.method == AuthMethod::OAuth && self.auth.storage == StorageKind::Env {
            return Err(ClaudineError::Config(
                "oauth authentication requires writable storage, env is read-only".into(),
            ));
        }

        match self.auth.storage {
            StorageKind::File => {
                if self.auth.file.is_none() {
                    return Err(ClaudineError::Config(
                        "auth.file required for file storage".into(),
                    ));
                }
            }
            StorageKind::Env => {
                if self.auth.env_key.is_none() {
                    return Err(ClaudineError::Config(
                        "auth.env_key required for env storage".into(),
                    ));
                }
            }
            StorageKind::Keyring => {
                if self.auth.keyring_user.is_none() {
                    return Err(ClaudineError::Config(
                        "auth.keyring_user required for keyring storage".into(),
                    ));
                }
            }
        }

        Ok(())
    }

    /// The path component of the upstream base URL, used as the inbound
    /// route prefix (e.g. `/v1`).
    #[must_use]
    pub fn upstream_path(&self) -> String {
        url::Url::parse(&self.upstream.base_url)
            .map(|url| url.path().trim_end_matches('/').to_string())
            .unwrap_or_default()
    }
}
