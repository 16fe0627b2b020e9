//! OS-native secure credential storage for the stored token.
//!
//! Uses the macOS Keychain, Windows Credential Manager, or Linux Secret
//! Service via the `keyring` crate.

use async_trait::async_trait;
use claudine_types::{StoreError, TokenStore};

/// Keyring service name under which the token is stored.
const SERVICE: &str = "claudine-proxy-token";

/// OS-keyring-backed [`TokenStore`], keyed by `(service, user)`.
pub struct KeyringStore {
    user: String,
}

impl KeyringStore {
    /// Create a store for the given user identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the user is empty.
    pub fn new(user: impl Into<String>) -> Result<Self, StoreError> {
        let user = user.into();
        if user.is_empty() {
            return Err(StoreError::Missing("keyring user cannot be empty".into()));
        }
        Ok(Self { user })
    }

    fn entry(&self) -> Result<keyring::Entry, StoreError> {
        keyring::Entry::new(SERVICE, &self.user).map_err(|e| StoreError::Keyring(e.to_string()))
    }
}

#[async_trait]
impl TokenStore for KeyringStore {
    async fn read(&self) -> Result<String, StoreError> {
        let entry = self.entry()?;
        let user = self.user.clone();

        // Credential store calls go over platform IPC; keep them off the
        // async workers.
        let token = tokio::task::spawn_blocking(move || match entry.get_password() {
            Ok(token) => Ok(token),
            Err(keyring::Error::NoEntry) => Err(StoreError::Missing(format!(
                "no keyring entry for service {SERVICE}, user {user}"
            ))),
            Err(e) => Err(StoreError::Keyring(e.to_string())),
        })
        .await
        .map_err(|e| StoreError::Keyring(e.to_string()))??;

        let token = token.trim();
        if token.is_empty() {
            return Err(StoreError::Empty(format!(
                "keyring entry for service {SERVICE}, user {}",
                self.user
            )));
        }
        Ok(token.to_string())
    }

    async fn write(&self, token: &str) -> Result<(), StoreError> {
        let entry = self.entry()?;
        let token = token.to_string();
        tokio::task::spawn_blocking(move || {
            entry
                .set_password(&token)
                .map_err(|e| StoreError::Keyring(e.to_string()))
        })
        .await
        .map_err(|e| StoreError::Keyring(e.to_string()))?
    }
}
