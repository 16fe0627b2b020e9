//! Configuration loading for the claudine proxy.
//!
//! Uses figment to merge, lowest precedence first: serialized defaults, a
//! TOML config file, and `CLAUDINE_`-prefixed environment variables (nested
//! keys separated by `__`). CLI flag overrides are applied by the binary on
//! top of the extracted config, then `apply_defaults` and `validate` run.

pub mod schema;

pub use schema::{AuthConfig, AuthMethod, Config, LogFormat, ServerConfig, ShutdownConfig, StorageKind, UpstreamConfig};

use claudine_types::ClaudineError;
use figment::providers::{Env, Format as _, Serialized, Toml};
use figment::Figment;
use std::path::Path;

/// Environment variable prefix; `CLAUDINE_SERVER__HOST` becomes
/// `server.host`.
const ENV_PREFIX: &str = "CLAUDINE_";

/// Load configuration from defaults, an optional TOML file, and the
/// environment. The caller applies CLI overrides before finalizing with
/// [`Config::apply_defaults`] and [`Config::validate`].
///
/// # Errors
///
/// Returns [`ClaudineError::Config`] if the file cannot be read or any
/// source fails to deserialize.
pub fn load(path: Option<&Path>) -> Result<Config, ClaudineError> {
    let mut figment = Figment::from(Serialized::defaults(Config::default()));
    if let Some(path) = path {
        figment = figment.merge(Toml::file_exact(path));
    }
    figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

    figment
        .extract()
        .map_err(|e| ClaudineError::Config(e.to_string()))
}
