//! Token refresh coordinator.
//!
//! At most one `POST /auth/refresh` is in flight per coordinator. Callers that
//! arrive while a refresh is running get a oneshot receiver and are resolved
//! in arrival order with the same outcome as the initiator. The state always
//! returns to `Idle`, including when the initiating future is dropped.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use reqwest::Client;
use tokio::sync::oneshot;

use super::client::send_with_timeout;
use super::error::ApiError;
use super::types::{Envelope, RefreshRequest, RefreshResponse};
use crate::config::ClientConfig;
use crate::store::CredentialStore;

pub const REFRESH_PATH: &str = "/auth/refresh";

enum RefreshState {
    Idle,
    Refreshing {
        waiters: Vec<oneshot::Sender<Option<String>>>,
    },
}

pub struct RefreshCoordinator {
    http: Client,
    config: ClientConfig,
    store: Arc<CredentialStore>,
    state: Mutex<RefreshState>,
}

impl RefreshCoordinator {
    pub fn new(http: Client, config: ClientConfig, store: Arc<CredentialStore>) -> Self {
        Self {
            http,
            config,
            store,
            state: Mutex::new(RefreshState::Idle),
        }
    }

    /// Whether a refresh call is currently in flight.
    pub fn is_refreshing(&self) -> bool {
        matches!(*self.lock(), RefreshState::Refreshing { .. })
    }

    /// Obtain a new access token, joining an in-flight refresh if there is one.
    ///
    /// Returns `None` when refreshing failed; credentials have then been
    /// cleared.
    pub async fn refresh(&self) -> Option<String> {
        let waiter = {
            let mut state = self.lock();
            match &mut *state {
                RefreshState::Refreshing { waiters } => {
                    let (tx, rx) = oneshot::channel();
                    waiters.push(tx);
                    Some(rx)
                }
                idle @ RefreshState::Idle => {
                    *idle = RefreshState::Refreshing {
                        waiters: Vec::new(),
                    };
                    None
                }
            }
        };

        if let Some(rx) = waiter {
            log::debug!("Refresh already in flight, waiting for its result");
            return rx.await.unwrap_or(None);
        }

        let mut cycle = RefreshCycle {
            coordinator: self,
            settled: false,
        };
        let token = self.run_refresh().await;
        cycle.settle(token.clone());
        token
    }

    async fn run_refresh(&self) -> Option<String> {
        let Some(refresh_token) = self.store.refresh_token() else {
            log::info!("No refresh token stored, session cannot be refreshed");
            self.clear_credentials();
            return None;
        };

        log::info!("Refreshing access token");
        let response = match self.request_tokens(&refresh_token).await {
            Ok(response) => response,
            Err(e) => {
                log::warn!("Token refresh failed: {}", e);
                self.clear_credentials();
                return None;
            }
        };

        match self.store.save(
            &response.access_token,
            response.refresh_token.as_deref(),
            None,
        ) {
            Ok(()) => {
                log::info!("Access token refreshed");
                Some(response.access_token)
            }
            Err(e) => {
                log::error!("Failed to persist refreshed tokens: {}", e);
                self.clear_credentials();
                None
            }
        }
    }

    async fn request_tokens(&self, refresh_token: &str) -> Result<RefreshResponse, ApiError> {
        let body = RefreshRequest {
            refresh_token: refresh_token.to_string(),
        };
        let builder = self
            .http
            .post(self.config.url(REFRESH_PATH))
            .header("X-Client-Type", self.config.client_type.as_str())
            .json(&body);

        let exchange = send_with_timeout(builder, self.config.retry.timeout).await?;
        if !exchange.status.is_success() {
            return Err(ApiError::from_status(exchange.status, &exchange.body));
        }

        let envelope: Envelope<RefreshResponse> =
            serde_json::from_str(&exchange.body).map_err(|e| ApiError::MalformedResponse {
                status: exchange.status,
                message: e.to_string(),
            })?;
        Ok(envelope.data)
    }

    fn clear_credentials(&self) {
        if let Err(e) = self.store.clear() {
            log::error!("Failed to clear credentials after refresh failure: {}", e);
        }
    }

    fn lock(&self) -> MutexGuard<'_, RefreshState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Returns the coordinator to `Idle` exactly once per refresh cycle.
struct RefreshCycle<'a> {
    coordinator: &'a RefreshCoordinator,
    settled: bool,
}

impl RefreshCycle<'_> {
    fn settle(&mut self, token: Option<String>) {
        self.settled = true;
        let previous = std::mem::replace(&mut *self.coordinator.lock(), RefreshState::Idle);
        if let RefreshState::Refreshing { waiters } = previous {
            if !waiters.is_empty() {
                log::debug!("Resolving {} refresh waiter(s)", waiters.len());
            }
            for waiter in waiters {
                // A waiter whose request was dropped is simply skipped.
                let _ = waiter.send(token.clone());
            }
        }
    }
}

impl Drop for RefreshCycle<'_> {
    fn drop(&mut self) {
        if !self.settled {
            log::warn!("Token refresh cancelled before completion");
            self.settle(None);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::config::RetryPolicy;
    use crate::store::{Credentials, MemoryStorage};

    fn coordinator(server: &MockServer) -> (RefreshCoordinator, Arc<CredentialStore>) {
        let config = ClientConfig::new(&server.uri()).with_retry(RetryPolicy {
            timeout: Duration::from_secs(2),
            ..RetryPolicy::default()
        });
        let store = Arc::new(CredentialStore::new(Arc::new(MemoryStorage::new())));
        (
            RefreshCoordinator::new(Client::new(), config, store.clone()),
            store,
        )
    }

    #[tokio::test]
    async fn test_no_refresh_token_short_circuits_without_network() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let (coordinator, store) = coordinator(&server);
        store.save("stale-access", None, None).unwrap();

        assert_eq!(coordinator.refresh().await, None);
        assert!(!coordinator.is_refreshing());
        assert_eq!(store.load(), Credentials::default());
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_refresh() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(REFRESH_PATH))
            .and(body_json(json!({"refreshToken": "refresh-1"})))
            .and(header("x-client-type", "mobile"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"data": {"accessToken": "access-2", "refreshToken": "refresh-2"}}))
                    .set_delay(Duration::from_millis(200)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let (coordinator, store) = coordinator(&server);
        store.save("access-1", Some("refresh-1"), None).unwrap();

        let (a, b, c, d) = tokio::join!(
            coordinator.refresh(),
            coordinator.refresh(),
            coordinator.refresh(),
            coordinator.refresh()
        );

        for token in [a, b, c, d] {
            assert_eq!(token.as_deref(), Some("access-2"));
        }
        assert!(!coordinator.is_refreshing());
        let creds = store.load();
        assert_eq!(creds.access_token.as_deref(), Some("access-2"));
        assert_eq!(creds.refresh_token.as_deref(), Some("refresh-2"));
    }

    #[tokio::test]
    async fn test_waiters_resolved_in_arrival_order() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(REFRESH_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"data": {"accessToken": "access-2"}}))
                    .set_delay(Duration::from_millis(200)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let (coordinator, store) = coordinator(&server);
        store.save("access-1", Some("refresh-1"), None).unwrap();
        let coordinator = Arc::new(coordinator);
        let resolved = Arc::new(std::sync::Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for i in 0..6usize {
            let coordinator = coordinator.clone();
            let resolved = resolved.clone();
            handles.push(tokio::spawn(async move {
                let token = coordinator.refresh().await;
                resolved.lock().unwrap().push(i);
                token
            }));
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap().as_deref(), Some("access-2"));
        }
        assert_eq!(*resolved.lock().unwrap(), (0..6).collect::<Vec<_>>());
        assert!(!coordinator.is_refreshing());
    }

    #[tokio::test]
    async fn test_failed_refresh_clears_store_and_resolves_everyone_with_none() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(REFRESH_PATH))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_json(json!({"message": "Invalid refresh token"}))
                    .set_delay(Duration::from_millis(100)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let (coordinator, store) = coordinator(&server);
        store
            .save("access-1", Some("refresh-1"), Some(&json!({"id": 1})))
            .unwrap();

        let (a, b, c) = tokio::join!(
            coordinator.refresh(),
            coordinator.refresh(),
            coordinator.refresh()
        );

        assert_eq!((a, b, c), (None, None, None));
        assert_eq!(store.load(), Credentials::default());
        assert!(!coordinator.is_refreshing());
    }

    #[tokio::test]
    async fn test_missing_rotation_keeps_refresh_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(REFRESH_PATH))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"data": {"accessToken": "access-2"}})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let (coordinator, store) = coordinator(&server);
        store.save("access-1", Some("refresh-1"), None).unwrap();

        assert_eq!(coordinator.refresh().await.as_deref(), Some("access-2"));
        assert_eq!(store.refresh_token().as_deref(), Some("refresh-1"));
    }

    #[tokio::test]
    async fn test_malformed_refresh_body_is_a_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(REFRESH_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {}})))
            .mount(&server)
            .await;

        let (coordinator, store) = coordinator(&server);
        store.save("access-1", Some("refresh-1"), None).unwrap();

        assert_eq!(coordinator.refresh().await, None);
        assert_eq!(store.load(), Credentials::default());
    }

    #[tokio::test]
    async fn test_cancelled_initiator_releases_waiters() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(REFRESH_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"data": {"accessToken": "late"}}))
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let (coordinator, store) = coordinator(&server);
        store.save("access-1", Some("refresh-1"), None).unwrap();
        let coordinator = Arc::new(coordinator);

        let initiator = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.refresh().await })
        };
        while !coordinator.is_refreshing() {
            tokio::task::yield_now().await;
        }

        let waiter = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.refresh().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        initiator.abort();
        assert_eq!(waiter.await.unwrap(), None);
        assert!(!coordinator.is_refreshing());
        // Cancellation is not a refresh failure; credentials stay in place.
        assert_eq!(store.refresh_token().as_deref(), Some("refresh-1"));
    }
}
