//! Request and response types for the rewards backend API.
//!
//! All structs use camelCase serialization to match the API's JSON format.
//! Successful responses wrap their payload in a `data` envelope.

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::ApiError;

/// `{ "data": ... }` wrapper used by every backend response.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    pub data: T,
}

/// Refresh request body sent to POST /auth/refresh.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Refresh response data. The backend may or may not rotate the refresh token.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Login request body sent to POST /auth/login.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Register request body sent to POST /auth/register.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referral_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

/// Login/register response data.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub user: Option<Value>,
}

/// Parsed body of a successful response.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// The response declared a JSON content type.
    Json(Value),
    Text(String),
    Empty,
}

impl Payload {
    /// Deserialize a JSON payload into `T`.
    pub fn into_json<T: DeserializeOwned>(self, status: StatusCode) -> Result<T, ApiError> {
        match self {
            Payload::Json(value) => {
                serde_json::from_value(value).map_err(|e| ApiError::MalformedResponse {
                    status,
                    message: e.to_string(),
                })
            }
            Payload::Text(_) | Payload::Empty => Err(ApiError::MalformedResponse {
                status,
                message: "expected a JSON body".to_string(),
            }),
        }
    }
}
