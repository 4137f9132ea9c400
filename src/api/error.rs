//! Terminal error value for API calls.
//!
//! Only unrecoverable conditions reach callers: transient failures and the
//! single 401 refresh cycle are absorbed by the executor first.

use std::time::Duration;

use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

/// Generic message for failures where no response was received.
pub const NETWORK_ERROR_MESSAGE: &str =
    "Network error. Please check your connection and try again.";

/// Longest plain-text body that is surfaced verbatim as an error message.
const MAX_TEXT_MESSAGE_LEN: usize = 200;

/// Error taxonomy used by callers to route the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 401 that survived a refresh cycle, or the refresh itself failed.
    Authentication,
    /// Timeout, connection failure or 5xx.
    Transient,
    /// Non-401 4xx, malformed response or an invalid request.
    Client,
}

#[derive(Debug, Error)]
pub enum ApiError {
    /// The server answered with an error status.
    #[error("{message}")]
    Status { status: StatusCode, message: String },

    #[error("{} (timed out after {:?})", NETWORK_ERROR_MESSAGE, .0)]
    Timeout(Duration),

    #[error("{} ({})", NETWORK_ERROR_MESSAGE, .0)]
    Network(String),

    /// The body did not match its declared content type or expected shape.
    #[error("Unexpected response from server ({status}): {message}")]
    MalformedResponse { status: StatusCode, message: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ApiError {
    /// Build an error from a non-success status and its raw body.
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let message = extract_message(body).unwrap_or_else(|| {
            format!("Request failed with status {}", status.as_u16())
        });
        ApiError::Status { status, message }
    }

    /// HTTP status, or `None` when no response was received.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::Status { status, .. } | ApiError::MalformedResponse { status, .. } => {
                Some(*status)
            }
            ApiError::Timeout(_) | ApiError::Network(_) | ApiError::InvalidRequest(_) => None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Status { status, .. } if *status == StatusCode::UNAUTHORIZED => {
                ErrorKind::Authentication
            }
            ApiError::Status { status, .. } if status.is_server_error() => ErrorKind::Transient,
            ApiError::Status { .. } => ErrorKind::Client,
            ApiError::Timeout(_) | ApiError::Network(_) => ErrorKind::Transient,
            ApiError::MalformedResponse { .. } | ApiError::InvalidRequest(_) => ErrorKind::Client,
        }
    }

    pub fn is_auth_failure(&self) -> bool {
        self.kind() == ErrorKind::Authentication
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_builder() {
            ApiError::InvalidRequest(err.to_string())
        } else {
            ApiError::Network(err.to_string())
        }
    }
}

/// Pull a human-readable message out of an error body.
///
/// Understands `{"message": "..."}`, `{"message": ["a", "b"]}` (validation
/// errors), `{"error": "..."}` and `{"error": {"message": "..."}}`. Short
/// plain-text bodies are used as-is; HTML pages are ignored.
pub fn extract_message(body: &str) -> Option<String> {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        return message_from_json(&value);
    }
    let text = body.trim();
    if text.is_empty() || text.len() > MAX_TEXT_MESSAGE_LEN || text.starts_with('<') {
        return None;
    }
    Some(text.to_string())
}

fn message_from_json(value: &Value) -> Option<String> {
    match value.get("message") {
        Some(Value::String(s)) if !s.trim().is_empty() => return Some(s.clone()),
        Some(Value::Array(items)) => {
            let parts: Vec<&str> = items.iter().filter_map(Value::as_str).collect();
            if !parts.is_empty() {
                return Some(parts.join(", "));
            }
        }
        _ => {}
    }
    match value.get("error") {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
        Some(nested @ Value::Object(_)) => message_from_json(nested),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_message_variants() {
        assert_eq!(
            extract_message(r#"{"message":"Email already used"}"#).as_deref(),
            Some("Email already used")
        );
        assert_eq!(
            extract_message(r#"{"message":["email must be an email","password too short"]}"#)
                .as_deref(),
            Some("email must be an email, password too short")
        );
        assert_eq!(
            extract_message(r#"{"statusCode":400,"error":"Bad Request"}"#).as_deref(),
            Some("Bad Request")
        );
        assert_eq!(
            extract_message(r#"{"error":{"message":"nested"}}"#).as_deref(),
            Some("nested")
        );
        assert_eq!(extract_message("Service down").as_deref(), Some("Service down"));
        assert_eq!(extract_message("<html><body>502</body></html>"), None);
        assert_eq!(extract_message(""), None);
        assert_eq!(extract_message(r#"{"ok":false}"#), None);
    }

    #[test]
    fn test_from_status_falls_back_to_generic_message() {
        let err = ApiError::from_status(StatusCode::BAD_GATEWAY, "");
        assert_eq!(err.to_string(), "Request failed with status 502");
        assert_eq!(err.status(), Some(StatusCode::BAD_GATEWAY));
        assert_eq!(err.kind(), ErrorKind::Transient);
    }

    #[test]
    fn test_classification() {
        let unauthorized = ApiError::from_status(StatusCode::UNAUTHORIZED, "");
        assert!(unauthorized.is_auth_failure());

        let forbidden = ApiError::from_status(StatusCode::FORBIDDEN, r#"{"message":"nope"}"#);
        assert_eq!(forbidden.kind(), ErrorKind::Client);
        assert_eq!(forbidden.to_string(), "nope");

        let timeout = ApiError::Timeout(Duration::from_secs(25));
        assert_eq!(timeout.status(), None);
        assert_eq!(timeout.kind(), ErrorKind::Transient);
        assert!(timeout.to_string().starts_with(NETWORK_ERROR_MESSAGE));

        let malformed = ApiError::MalformedResponse {
            status: StatusCode::OK,
            message: "expected value".to_string(),
        };
        assert_eq!(malformed.kind(), ErrorKind::Client);
        assert_eq!(malformed.status(), Some(StatusCode::OK));
    }
}
