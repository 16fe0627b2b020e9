//! In-memory token store for tests.

use async_trait::async_trait;
use claudine_types::{StoreError, TokenStore};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// An in-memory [`TokenStore`] that records writes, for testing.
///
/// `fail_writes` makes every subsequent `write` fail without recording,
/// which lets tests observe that a failed write-back leaves stored state
/// untouched.
#[derive(Default)]
pub struct MemoryStore {
    token: Mutex<Option<String>>,
    writes: Mutex<Vec<String>>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    /// Create an empty store (reads fail with `Missing`).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-loaded with a token.
    #[must_use]
    pub fn with_token(token: impl Into<String>) -> Self {
        let store = Self::new();
        *store.token.lock().unwrap() = Some(token.into());
        store
    }

    /// Make all subsequent writes fail (or succeed again with `false`).
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Tokens passed to `write`, in order, excluding failed writes.
    #[must_use]
    pub fn writes(&self) -> Vec<String> {
        self.writes.lock().unwrap().clone()
    }
}

#[async_trait]
impl TokenStore for MemoryStore {
    async fn read(&self) -> Result<String, StoreError> {
        let token = self
            .token
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| StoreError::Missing("memory store".into()))?;
        let token = token.trim();
        if token.is_empty() {
            return Err(StoreError::Empty("memory store".into()));
        }
        Ok(token.to_string())
    }

    async fn write(&self, token: &str) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Io(std::io::Error::other("simulated failure")));
        }
        *self.token.lock().unwrap() = Some(token.to_string());
        self.writes.lock().unwrap().push(token.to_string());
        Ok(())
    }
}
