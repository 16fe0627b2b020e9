//! Read-only token storage backed by an environment variable.
//!
//! Suitable for static token authentication; OAuth requires writable storage.

use async_trait::async_trait;
use claudine_types::{StoreError, TokenStore};

/// Environment-variable-backed [`TokenStore`].
pub struct EnvStore {
    env_key: String,
}

impl EnvStore {
    /// Create a store for the given environment variable.
    ///
    /// # Errors
    ///
    /// Returns an error if the variable name is empty or the variable is not
    /// set in the environment.
    pub fn new(env_key: impl Into<String>) -> Result<Self, StoreError> {
        let env_key = env_key.into();
        if env_key.is_empty() {
            return Err(StoreError::Missing(
                "environment key cannot be empty".into(),
            ));
        }
        if std::env::var_os(&env_key).is_none() {
            return Err(StoreError::Missing(format!(
                "environment variable {env_key} not set"
            )));
        }
        Ok(Self { env_key })
    }
}

#[async_trait]
impl TokenStore for EnvStore {
    async fn read(&self) -> Result<String, StoreError> {
        let token = std::env::var(&self.env_key).unwrap_or_default();
        let token = token.trim();
        if token.is_empty() {
            return Err(StoreError::Empty(format!(
                "environment variable {}",
                self.env_key
            )));
        }
        Ok(token.to_string())
    }

    async fn write(&self, _token: &str) -> Result<(), StoreError> {
        Err(StoreError::ReadOnly)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Env vars are process-global; each test uses its own variable name.

    #[tokio::test]
    async fn test_read_returns_value() {
        std::env::set_var("CLAUDINE_TEST_ENV_READ", "tok-123");
        let store = EnvStore::new("CLAUDINE_TEST_ENV_READ").unwrap();
        assert_eq!(store.read().await.unwrap(), "tok-123");
    }

    #[tokio::test]
    async fn test_read_trims_whitespace() {
        std::env::set_var("CLAUDINE_TEST_ENV_TRIM", " tok \n");
        let store = EnvStore::new("CLAUDINE_TEST_ENV_TRIM").unwrap();
        assert_eq!(store.read().await.unwrap(), "tok");
    }

    #[tokio::test]
    async fn test_read_empty_value() {
        std::env::set_var("CLAUDINE_TEST_ENV_EMPTY", "");
        let store = EnvStore::new("CLAUDINE_TEST_ENV_EMPTY").unwrap();
        assert!(matches!(
            store.read().await.unwrap_err(),
            StoreError::Empty(_)
        ));
    }

    #[test]
    fn test_unset_variable_rejected_at_construction() {
        assert!(matches!(
            EnvStore::new("CLAUDINE_TEST_ENV_DOES_NOT_EXIST").unwrap_err(),
            StoreError::Missing(_)
        ));
    }

    #[test]
    fn test_empty_key_rejected() {
        assert!(EnvStore::new("").is_err());
    }

    #[tokio::test]
    async fn test_write_is_read_only() {
        std::env::set_var("CLAUDINE_TEST_ENV_RO", "tok");
        let store = EnvStore::new("CLAUDINE_TEST_ENV_RO").unwrap();
        assert!(matches!(
            store.write("new").await.unwrap_err(),
            StoreError::ReadOnly
        ));
    }
}
