//! Authenticated HTTP client for the rewards backend.
//!
//! The request executor attaches the stored access token to every call,
//! retries transient failures with exponential backoff, and on a 401 runs a
//! single shared token refresh before retrying once. Tokens and the language
//! preference are persisted in the platform keychain.

pub mod api;
pub mod config;
pub mod session;
pub mod store;

pub use api::client::ApiClient;
pub use api::error::{ApiError, ErrorKind};
pub use api::refresh::RefreshCoordinator;
pub use api::request::{ApiRequest, HttpMethod};
pub use api::types::Payload;
pub use config::{ClientConfig, ConfigError, RetryPolicy};
pub use session::{Session, SessionError};
pub use store::{CredentialStore, Credentials, KeychainStorage, MemoryStorage, Preferences, SecureStorage};
