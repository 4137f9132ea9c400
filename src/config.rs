//! Client configuration.
//!
//! The retry/backoff policy is an explicit value supplied at construction so it
//! can be exercised without any network code. `ClientConfig::from_env()` mirrors
//! the desktop binary's lookup order: a dedicated variable first, then the
//! shared `API_URL`, then a localhost default.

use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;

/// Default API origin when nothing is configured.
pub const DEFAULT_API_URL: &str = "http://localhost:3000";

/// Keychain service name used for credential entries.
pub const DEFAULT_KEYCHAIN_SERVICE: &str = "com.rewards.client";

/// Value of the `X-Client-Type` header sent with every request.
pub const DEFAULT_CLIENT_TYPE: &str = "mobile";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value:?} ({reason})")]
    InvalidValue {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Retry, backoff and timeout policy for the request executor.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Additional attempts after the first one.
    pub max_retries: u32,
    /// Delay before the first retry; doubled for each subsequent retry.
    pub base_delay: Duration,
    /// Upper bound for a single backoff delay.
    pub max_delay: Duration,
    /// Ceiling for one attempt (send + body read).
    pub timeout: Duration,
    /// Which error statuses count as transient.
    pub retryable_status: fn(StatusCode) -> bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            timeout: Duration::from_secs(25),
            retryable_status: default_retryable_status,
        }
    }
}

impl RetryPolicy {
    /// Delay before the `retry_number`-th retry (1-based).
    pub fn backoff_delay(&self, retry_number: u32) -> Duration {
        let shift = retry_number.saturating_sub(1).min(16);
        let delay = self.base_delay.saturating_mul(1u32 << shift);
        delay.min(self.max_delay)
    }

    /// Whether an error status should consume retry budget.
    ///
    /// 401 is handled by the refresh path and never retried here.
    pub fn is_retryable_status(&self, status: StatusCode) -> bool {
        status != StatusCode::UNAUTHORIZED && (self.retryable_status)(status)
    }
}

fn default_retryable_status(status: StatusCode) -> bool {
    status.is_server_error()
}

/// Top-level configuration for [`crate::ApiClient`] and its collaborators.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// API origin without trailing slash.
    pub base_url: String,
    /// Sent as `X-Client-Type` so the backend returns refresh tokens in the body.
    pub client_type: String,
    /// Service name for keychain entries.
    pub keychain_service: String,
    pub retry: RetryPolicy,
}

impl ClientConfig {
    /// Create a configuration for the given origin with default policy.
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client_type: DEFAULT_CLIENT_TYPE.to_string(),
            keychain_service: DEFAULT_KEYCHAIN_SERVICE.to_string(),
            retry: RetryPolicy::default(),
        }
    }

    /// Replace the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Load configuration from the process environment.
    ///
    /// API URL: `REWARDS_API_URL` > `API_URL` > [`DEFAULT_API_URL`].
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_url = lookup("REWARDS_API_URL")
            .or_else(|| lookup("API_URL"))
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());

        let mut config = Self::new(&base_url);

        if let Some(service) = lookup("REWARDS_KEYCHAIN_SERVICE") {
            config.keychain_service = service;
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "REWARDS_API_TIMEOUT_SECS")? {
            if secs == 0 {
                return Err(ConfigError::InvalidValue {
                    name: "REWARDS_API_TIMEOUT_SECS",
                    value: secs.to_string(),
                    reason: "timeout must be positive".to_string(),
                });
            }
            config.retry.timeout = Duration::from_secs(secs);
        }
        if let Some(retries) = parse_var::<u32>(&lookup, "REWARDS_API_MAX_RETRIES")? {
            config.retry.max_retries = retries;
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "REWARDS_API_BASE_DELAY_MS")? {
            config.retry.base_delay = Duration::from_millis(ms);
        }

        Ok(config)
    }

    /// Absolute URL for an API path (paths start with `/`).
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

fn parse_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue {
                name,
                value: raw.clone(),
                reason: e.to_string(),
            }),
    }
}
