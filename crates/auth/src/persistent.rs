//! Token persistence layered over an inner token source.
//!
//! The store holds exactly one opaque refresh token. Initialization is
//! deferred so that application startup does no I/O; the first `token()`
//! call reads the stored token and builds the inner source exactly once.

use arc_swap::ArcSwapOption;
use claudine_types::{Result, Token, TokenSource, TokenStore};
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};

/// Builds the inner [`TokenSource`] from the stored token string.
pub type TokenSourceFactory = Box<dyn Fn(String) -> Arc<dyn TokenSource> + Send + Sync>;

/// Wraps a [`TokenSource`] with refresh-token write-back to a [`TokenStore`].
pub struct PersistentTokenSource {
    factory: TokenSourceFactory,
    store: Arc<dyn TokenStore>,
    inner: OnceCell<Arc<dyn TokenSource>>,
    // Last successfully persisted refresh token. Read lock-free on the hot
    // path; updated only inside the write critical section.
    last_persisted: ArcSwapOption<String>,
    write_lock: Mutex<()>,
}

impl PersistentTokenSource {
    /// Create a persistent source. No I/O is performed until the first
    /// `token()` call.
    #[must_use]
    pub fn new(factory: TokenSourceFactory, store: Arc<dyn TokenStore>) -> Self {
        Self {
            factory,
            store,
            inner: OnceCell::new(),
            last_persisted: ArcSwapOption::empty(),
            write_lock: Mutex::new(()),
        }
    }

    /// One-time initialization: read the stored token and build the inner
    /// source. `OnceCell::get_or_try_init` does not cache failures, so a
    /// failed read is retried on the next call.
    async fn inner(&self) -> Result<&Arc<dyn TokenSource>> {
        self.inner
            .get_or_try_init(|| async {
                let initial = self.store.read().await?;
                // Remember the initial token so the first token() call does
                // not write back an unchanged value.
                self.last_persisted.store(Some(Arc::new(initial.clone())));
                Ok((self.factory)(initial))
            })
            .await
    }

    fn already_persisted(&self, refresh_token: &str) -> bool {
        self.last_persisted
            .load()
            .as_deref()
            .is_some_and(|last| last.as_str() == refresh_token)
    }
}

#[async_trait::async_trait]
impl TokenSource for PersistentTokenSource {
    async fn token(&self) -> Result<Token> {
        let inner = self.inner().await?;
        let fresh = inner.token().await?;

        // Static tokens carry no refresh token and never persist.
        if fresh.refresh_token.is_empty() || self.already_persisted(&fresh.refresh_token) {
            return Ok(fresh);
        }

        let _guard = self.write_lock.lock().await;
        // Another caller may have persisted the same rotation while we
        // waited for the lock.
        if !self.already_persisted(&fresh.refresh_token) {
            match self.store.write(&fresh.refresh_token).await {
                Ok(()) => {
                    self.last_persisted
                        .store(Some(Arc::new(fresh.refresh_token.clone())));
                }
                Err(err) => {
                    // The access token is still usable; leaving the cache
                    // unchanged makes the next call retry the write.
                    tracing::error!(error = %err, "failed to persist rotated refresh token");
                }
            }
        }

        Ok(fresh)
    }
}
