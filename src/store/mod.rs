//! On-device session persistence.
//!
//! Credentials and preferences live in a [`SecureStorage`] backend: the OS
//! keychain in production, an in-memory map for tests and headless runs.
//! Readers always go back to storage; nothing here caches a mutable copy.

pub mod credentials;
pub mod preferences;
pub mod secure;

pub use credentials::{CredentialStore, Credentials};
pub use preferences::Preferences;
pub use secure::{KeychainStorage, MemoryStorage, SecureStorage, StoreError};
