//! Request description for the executor.
//!
//! An [`ApiRequest`] is a reusable template: the executor rebuilds the actual
//! HTTP request from it on every attempt so the freshest access token is
//! attached. Builder errors are deferred until execution, like reqwest's own
//! `RequestBuilder`.

use std::fmt;
use std::str::FromStr;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;
use serde_json::Value;

use super::error::ApiError;

/// The methods the client is allowed to issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "PATCH" => Ok(HttpMethod::Patch),
            "DELETE" => Ok(HttpMethod::Delete),
            other => Err(ApiError::InvalidRequest(format!(
                "unsupported method {}",
                other
            ))),
        }
    }
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
        }
    }
}

/// One logical API call: method, path, optional JSON body and extra headers.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub(crate) method: HttpMethod,
    pub(crate) path: String,
    pub(crate) body: Option<Value>,
    pub(crate) headers: HeaderMap,
    pub(crate) authenticated: bool,
    invalid: Option<String>,
}

impl ApiRequest {
    pub fn new(method: HttpMethod, path: &str) -> Self {
        Self {
            method,
            path: path.to_string(),
            body: None,
            headers: HeaderMap::new(),
            authenticated: true,
            invalid: None,
        }
    }

    pub fn get(path: &str) -> Self {
        Self::new(HttpMethod::Get, path)
    }

    pub fn post(path: &str) -> Self {
        Self::new(HttpMethod::Post, path)
    }

    pub fn put(path: &str) -> Self {
        Self::new(HttpMethod::Put, path)
    }

    pub fn patch(path: &str) -> Self {
        Self::new(HttpMethod::Patch, path)
    }

    pub fn delete(path: &str) -> Self {
        Self::new(HttpMethod::Delete, path)
    }

    /// Attach a JSON body.
    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Self {
        match serde_json::to_value(body) {
            Ok(value) => self.body = Some(value),
            Err(e) => self.fail(format!("body is not serializable: {}", e)),
        }
        self
    }

    /// Add a header. A caller-supplied `Content-Type` replaces the JSON default.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                self.headers.insert(name, value);
            }
            _ => self.fail(format!("invalid header {}", name)),
        }
        self
    }

    /// Send without a bearer token and skip the 401 refresh path.
    ///
    /// Used for login, registration and other public endpoints.
    pub fn without_auth(mut self) -> Self {
        self.authenticated = false;
        self
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// Surface any deferred builder error.
    pub(crate) fn validate(&self) -> Result<(), ApiError> {
        if let Some(reason) = &self.invalid {
            return Err(ApiError::InvalidRequest(reason.clone()));
        }
        if !self.path.starts_with('/') {
            return Err(ApiError::InvalidRequest(format!(
                "path must start with '/': {}",
                self.path
            )));
        }
        Ok(())
    }

    fn fail(&mut self, reason: String) {
        self.invalid.get_or_insert(reason);
    }
}
