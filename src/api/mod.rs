//! API client module.
//!
//! Provides the request executor with bearer-token injection, the token
//! refresh coordinator, request/response types matching the backend API, and
//! the terminal error type surfaced to callers.

pub mod client;
pub mod error;
pub mod refresh;
pub mod request;
pub mod types;
