//! Classification of generative-AI API failures
//!
//! Rate limiting, overloaded backends and dropped connections are worth another
//! attempt; malformed requests and bad credentials are not.

use crate::RetryPolicy;
use serde_json::Value;
use std::fmt;

/// Broad category of an API failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    /// The request timed out before a response arrived
    Timeout,
    /// Connecting to the endpoint failed or the connection dropped
    Connection,
    /// HTTP 429
    RateLimited,
    /// HTTP 500, 502, 503 or 504
    Unavailable,
    /// HTTP 400 or 422
    BadRequest,
    /// HTTP 401
    Unauthorized,
    /// HTTP 403
    PermissionDenied,
    /// HTTP 404
    NotFound,
    Other,
}

impl ApiErrorKind {
    /// Map an HTTP status code to its category
    pub fn from_status(status: u16) -> Self {
        match status {
            429 => ApiErrorKind::RateLimited,
            500 | 502 | 503 | 504 => ApiErrorKind::Unavailable,
            400 | 422 => ApiErrorKind::BadRequest,
            401 => ApiErrorKind::Unauthorized,
            403 => ApiErrorKind::PermissionDenied,
            404 => ApiErrorKind::NotFound,
            _ => ApiErrorKind::Other,
        }
    }
}

/// A failed call to a generative-AI endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub message: String,
    pub status: Option<u16>,
    pub kind: ApiErrorKind,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.kind, self.status) {
            (ApiErrorKind::Timeout, _) => write!(f, "Request timed out: {}", self.message),
            (ApiErrorKind::Connection, _) => write!(f, "Connection error: {}", self.message),
            (_, Some(status)) => write!(f, "API error ({}): {}", status, self.message),
            (_, None) => write!(f, "API error: {}", self.message),
        }
    }
}

impl std::error::Error for ApiError {}

impl ApiError {
    /// An error without an HTTP status
    pub fn new(kind: ApiErrorKind, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
            kind,
        }
    }

    /// The request timed out
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Timeout, message)
    }

    /// The connection could not be established or was dropped
    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Connection, message)
    }

    /// Build an error from an HTTP status and the response body.
    ///
    /// The message is taken from `error.message` or `message` when the body is
    /// JSON, otherwise the body text itself is used.
    pub fn from_status(status: u16, body: &str) -> Self {
        let message = serde_json::from_str::<Value>(body)
            .ok()
            .and_then(|json| extract_message(&json))
            .unwrap_or_else(|| {
                let body = body.trim();
                if body.is_empty() {
                    format!("HTTP {status}")
                } else {
                    body.to_string()
                }
            });

        Self {
            message,
            status: Some(status),
            kind: ApiErrorKind::from_status(status),
        }
    }

    /// Whether a repeat of the same request may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self.kind,
            ApiErrorKind::Timeout
                | ApiErrorKind::Connection
                | ApiErrorKind::RateLimited
                | ApiErrorKind::Unavailable
        )
    }
}

fn extract_message(json: &Value) -> Option<String> {
    json.get("error")
        .and_then(|e| e.get("message"))
        .and_then(|m| m.as_str())
        .or_else(|| json.get("message").and_then(|m| m.as_str()))
        .map(String::from)
}

/// Stock predicate: retry only transient API failures
pub fn if_transient_error(error: &ApiError) -> bool {
    error.is_transient()
}

impl RetryPolicy<ApiError> {
    /// Default backoff, retrying transient API failures only
    pub fn transient() -> Self {
        RetryPolicy::default().with_predicate(if_transient_error)
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            let url = err.url().map(|u| u.as_str()).unwrap_or("unknown");
            ApiError::timeout(format!("no response from {url}"))
        } else if err.is_connect() {
            let host = err
                .url()
                .and_then(|u| u.host_str())
                .unwrap_or("unknown host");
            ApiError::connection(format!("failed to connect to {host}"))
        } else if let Some(status) = err.status() {
            ApiError {
                message: err.to_string(),
                status: Some(status.as_u16()),
                kind: ApiErrorKind::from_status(status.as_u16()),
            }
        } else if err.is_request() || err.is_body() {
            ApiError::connection(err.to_string())
        } else {
            ApiError::new(ApiErrorKind::Other, err.to_string())
        }
    }
}
