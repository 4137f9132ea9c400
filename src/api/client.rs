//! Request executor with bearer injection, timeout, refresh-on-401 and retry.
//!
//! All requests include `X-Client-Type` so the backend returns refresh tokens
//! in the response body instead of cookies. The access token is read from the
//! credential store on every attempt, never cached here.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderValue, ACCEPT_LANGUAGE, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::error::ApiError;
use super::refresh::RefreshCoordinator;
use super::request::ApiRequest;
use super::types::Payload;
use crate::config::ClientConfig;
use crate::store::{CredentialStore, Preferences, SecureStorage};

/// Status, content type and body of one completed attempt.
pub(crate) struct Exchange {
    pub status: StatusCode,
    pub is_json: bool,
    pub body: String,
}

impl Exchange {
    fn into_payload(self) -> Result<Payload, ApiError> {
        if self.body.trim().is_empty() {
            return Ok(Payload::Empty);
        }
        if !self.is_json {
            return Ok(Payload::Text(self.body));
        }
        serde_json::from_str(&self.body)
            .map(Payload::Json)
            .map_err(|e| ApiError::MalformedResponse {
                status: self.status,
                message: e.to_string(),
            })
    }

    fn into_error(self) -> ApiError {
        ApiError::from_status(self.status, &self.body)
    }
}

/// Send a request and read its body under one timeout.
///
/// Dropping the inner future on timeout aborts the in-flight call.
pub(crate) async fn send_with_timeout(
    builder: RequestBuilder,
    timeout: Duration,
) -> Result<Exchange, ApiError> {
    let exchange = async {
        let resp = builder.send().await?;
        let status = resp.status();
        let is_json = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("json"));
        let body = resp.text().await?;
        Ok::<_, reqwest::Error>(Exchange {
            status,
            is_json,
            body,
        })
    };

    match tokio::time::timeout(timeout, exchange).await {
        Ok(result) => result.map_err(ApiError::from),
        Err(_) => Err(ApiError::Timeout(timeout)),
    }
}

/// HTTP client for the rewards backend.
///
/// Owns the refresh coordinator; share the client itself via `Arc` so every
/// call site goes through the same coordinator.
pub struct ApiClient {
    http: Client,
    config: ClientConfig,
    store: Arc<CredentialStore>,
    preferences: Arc<Preferences>,
    refresher: Arc<RefreshCoordinator>,
}

impl ApiClient {
    /// Create a client whose credentials and preferences live in `storage`.
    pub fn new(config: ClientConfig, storage: Arc<dyn SecureStorage>) -> Self {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| Client::new());
        let store = Arc::new(CredentialStore::new(storage.clone()));
        let preferences = Arc::new(Preferences::new(storage));
        let refresher = Arc::new(RefreshCoordinator::new(
            http.clone(),
            config.clone(),
            store.clone(),
        ));
        Self {
            http,
            config,
            store,
            preferences,
            refresher,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn credentials(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    pub fn preferences(&self) -> &Arc<Preferences> {
        &self.preferences
    }

    pub fn refresher(&self) -> &Arc<RefreshCoordinator> {
        &self.refresher
    }

    /// Perform one logical call.
    ///
    /// A 401 on an authenticated request triggers one refresh and exactly one
    /// re-attempt; whatever that re-attempt produces is final. Timeouts,
    /// network errors and retryable statuses are retried with exponential
    /// backoff up to `max_retries` additional attempts.
    pub async fn execute(&self, request: &ApiRequest) -> Result<Payload, ApiError> {
        self.execute_with_status(request)
            .await
            .map(|(_, payload)| payload)
    }

    /// Like [`execute`](Self::execute), also returning the final success status.
    pub async fn execute_with_status(
        &self,
        request: &ApiRequest,
    ) -> Result<(StatusCode, Payload), ApiError> {
        request.validate()?;
        let policy = &self.config.retry;
        let mut attempt = 0u32;
        let mut retries = 0u32;
        let mut refreshed = false;

        loop {
            attempt += 1;
            log::debug!(
                "{} {} attempt {}",
                request.method,
                request.path,
                attempt
            );

            let failure = match send_with_timeout(self.build(request), policy.timeout).await {
                Ok(exchange) if exchange.status.is_success() => {
                    log::debug!(
                        "{} {} -> {}",
                        request.method,
                        request.path,
                        exchange.status
                    );
                    let status = exchange.status;
                    return exchange.into_payload().map(|payload| (status, payload));
                }
                Ok(exchange)
                    if exchange.status == StatusCode::UNAUTHORIZED
                        && request.authenticated
                        && !refreshed =>
                {
                    refreshed = true;
                    log::info!(
                        "{} {} returned 401, refreshing session",
                        request.method,
                        request.path
                    );
                    if self.refresher.refresh().await.is_some() {
                        continue;
                    }
                    return Err(exchange.into_error());
                }
                Ok(exchange) => exchange.into_error(),
                Err(e) => e,
            };

            if refreshed || retries >= policy.max_retries || !self.is_retryable(&failure) {
                return Err(failure);
            }

            retries += 1;
            let delay = policy.backoff_delay(retries);
            log::warn!(
                "{} {} failed ({}), retry {}/{} in {:?}",
                request.method,
                request.path,
                failure,
                retries,
                policy.max_retries,
                delay
            );
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
    }

    /// Execute a request and deserialize its JSON body.
    pub async fn send_json<T: DeserializeOwned>(&self, request: &ApiRequest) -> Result<T, ApiError> {
        let (status, payload) = self.execute_with_status(request).await?;
        payload.into_json(status)
    }

    /// Authenticated GET returning a JSON body.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.send_json(&ApiRequest::get(path)).await
    }

    /// Authenticated POST with a JSON body, returning a JSON body.
    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send_json(&ApiRequest::post(path).json(body)).await
    }

    fn is_retryable(&self, error: &ApiError) -> bool {
        match error {
            ApiError::Timeout(_) | ApiError::Network(_) => true,
            ApiError::Status { status, .. } => self.config.retry.is_retryable_status(*status),
            ApiError::MalformedResponse { .. } | ApiError::InvalidRequest(_) => false,
        }
    }

    /// Build the concrete HTTP request for one attempt.
    fn build(&self, request: &ApiRequest) -> RequestBuilder {
        let mut headers = request.headers.clone();
        if !headers.contains_key(CONTENT_TYPE) {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }
        if !headers.contains_key(ACCEPT_LANGUAGE) {
            if let Some(language) = self.preferences.stored_language() {
                if let Ok(value) = HeaderValue::from_str(&language) {
                    headers.insert(ACCEPT_LANGUAGE, value);
                }
            }
        }

        let mut builder = self
            .http
            .request(request.method.into(), self.config.url(&request.path))
            .header("X-Client-Type", self.config.client_type.as_str())
            .headers(headers);

        if request.authenticated {
            if let Some(token) = self.store.access_token() {
                builder = builder.bearer_auth(token);
            }
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.to_string());
        }
        builder
    }
}
