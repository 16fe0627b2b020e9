//! Core types and traits for the claudine workspace.
//!
//! This crate defines the shared abstractions used across all layers of the
//! claudine proxy: error types, the OAuth token representation, and the async
//! traits implemented by the storage, auth, and translation layers.

pub mod error;
pub mod token;
pub mod traits;

pub use error::{AuthError, ClaudineError, StoreError, StreamError, TranslateError};
pub use token::Token;
pub use traits::{RequestTranslator, ResponseTranslator, Result, TokenSource, TokenStore};
