//! Token storage backends for the single persisted refresh token.
//!
//! Provides file, environment-variable, and OS-keyring backends for
//! production, and an in-memory store for testing.

pub mod env;
pub mod file;
pub mod keyring;
pub mod memory;

pub use env::EnvStore;
pub use file::FileStore;
pub use keyring::KeyringStore;
pub use memory::MemoryStore;
