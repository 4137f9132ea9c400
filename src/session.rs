//! Session flows: login, registration, logout and silent restore.
//!
//! These are the only writers of the credential store besides the refresh
//! coordinator. Logout always clears local credentials, even when the server
//! cannot be reached.

use std::sync::Arc;

use serde_json::Value;

use crate::api::client::ApiClient;
use crate::api::error::ApiError;
use crate::api::request::ApiRequest;
use crate::api::types::{AuthResponse, Envelope, LoginRequest, RegisterRequest};
use crate::store::StoreError;

pub const LOGIN_PATH: &str = "/auth/login";
pub const REGISTER_PATH: &str = "/auth/register";
pub const LOGOUT_PATH: &str = "/auth/logout";
pub const PROFILE_PATH: &str = "/users/me";

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("Failed to persist session: {0}")]
    Store(#[from] StoreError),
}

/// Authentication state on top of a shared [`ApiClient`].
pub struct Session {
    api: Arc<ApiClient>,
}

impl Session {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api }
    }

    pub fn api(&self) -> &Arc<ApiClient> {
        &self.api
    }

    /// Whether an access token is stored.
    pub fn is_authenticated(&self) -> bool {
        self.api.credentials().access_token().is_some()
    }

    /// Cached user profile from the last login or profile fetch.
    pub fn current_user(&self) -> Option<Value> {
        self.api.credentials().user()
    }

    /// Log in with email and password; stores both tokens and the user.
    pub async fn login(&self, email: &str, password: &str) -> Result<Option<Value>, SessionError> {
        log::info!("Logging in");
        let body = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        let request = ApiRequest::post(LOGIN_PATH).json(&body).without_auth();
        self.authenticate(&request).await
    }

    /// Create an account; stores both tokens and the user like `login`.
    pub async fn register(&self, request: &RegisterRequest) -> Result<Option<Value>, SessionError> {
        log::info!("Registering new account");
        let mut request = request.clone();
        if request.language.is_none() {
            request.language = self.api.preferences().stored_language();
        }
        let request = ApiRequest::post(REGISTER_PATH).json(&request).without_auth();
        self.authenticate(&request).await
    }

    async fn authenticate(&self, request: &ApiRequest) -> Result<Option<Value>, SessionError> {
        let response: Envelope<AuthResponse> = self.api.send_json(request).await?;
        let auth = response.data;

        self.api.credentials().save(
            &auth.access_token,
            Some(&auth.refresh_token),
            auth.user.as_ref(),
        )?;

        log::info!("Authentication complete");
        Ok(auth.user)
    }

    /// Revoke the stored refresh token server-side (best effort) and clear
    /// local state.
    pub async fn logout(&self) -> Result<(), SessionError> {
        log::info!("Logging out");

        if let Some(refresh_token) = self.api.credentials().refresh_token() {
            let body = serde_json::json!({ "refreshToken": refresh_token });
            let request = ApiRequest::post(LOGOUT_PATH).json(&body);
            if let Err(e) = self.api.execute(&request).await {
                log::warn!("Logout request failed (will continue local cleanup): {}", e);
            }
        }

        self.api.credentials().clear()?;
        log::info!("Logout complete");
        Ok(())
    }

    /// Try to resume a stored session on cold start.
    ///
    /// Returns `true` if a usable access token is available afterwards.
    pub async fn restore(&self) -> bool {
        let creds = self.api.credentials().load();
        if creds.refresh_token.is_none() {
            log::info!("No stored session, restore skipped");
            return false;
        }
        if creds.access_token.is_some() {
            log::info!("Stored session found");
            return true;
        }

        log::info!("Stored session has no access token, refreshing");
        self.api.refresher().refresh().await.is_some()
    }

    /// Fetch the current user's profile and cache it.
    pub async fn fetch_profile(&self) -> Result<Value, SessionError> {
        let response: Envelope<Value> = self.api.get_json(PROFILE_PATH).await?;
        self.api.credentials().save_user(&response.data)?;
        Ok(response.data)
    }
}
