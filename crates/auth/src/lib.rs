//! OAuth token lifecycle for the Anthropic API.
//!
//! [`RefreshTokenSource`] exchanges a refresh token for access tokens against
//! Anthropic's nonstandard JSON token endpoint; [`PersistentTokenSource`]
//! layers deferred initialization and refresh-token write-back on top of any
//! inner source.

pub mod endpoints;
mod persistent;
mod refresh;

pub use persistent::{PersistentTokenSource, TokenSourceFactory};
pub use refresh::{RefreshTokenSource, StaticTokenSource};
