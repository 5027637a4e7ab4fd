//! Error types for the Herald clients

use std::time::Duration;
use thiserror::Error;

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Slack error codes worth retrying
const TRANSIENT_SLACK_ERRORS: &[&str] = &[
    "ratelimited",
    "internal_error",
    "service_unavailable",
    "request_timeout",
    "fatal_error",
];

/// Errors that can occur when talking to the cluster or the messaging platform
#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// API returned an error status code
    #[error("API error (status {status}): {message}")]
    ApiError {
        /// HTTP status code
        status: u16,
        /// Error message from the API
        message: String,
    },

    /// The messaging platform answered with `ok: false`
    #[error("Slack API error: {error}")]
    Slack {
        /// Error code reported by the platform (e.g. `channel_not_found`)
        error: String,
    },

    /// The platform asked us to slow down
    #[error("Rate limited (retry after {retry_after:?})")]
    RateLimited {
        /// Delay requested by the platform, if it sent one
        retry_after: Option<Duration>,
    },

    /// Failed to parse response
    #[error("Failed to parse response: {0}")]
    ParseError(String),

    /// Resource not found
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ClientError {
    /// Create an API error from status code and message
    pub fn api_error(status: u16, message: impl Into<String>) -> Self {
        Self::ApiError {
            status,
            message: message.into(),
        }
    }

    /// Create an error from a Slack `error` code
    pub fn slack(error: impl Into<String>) -> Self {
        let error = error.into();
        if error == "ratelimited" {
            return Self::RateLimited { retry_after: None };
        }
        Self::Slack { error }
    }

    /// Check if this error is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_)) || matches!(self, Self::ApiError { status: 404, .. })
    }

    /// Whether retrying the same call may succeed
    ///
    /// Network failures, 5xx replies, rate limiting and the platform's own
    /// transient error codes are retryable; everything else is permanent.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RequestFailed(e) => !e.is_builder() && !e.is_redirect(),
            Self::RateLimited { .. } => true,
            Self::ApiError { status, .. } => *status >= 500 || *status == 429 || *status == 408,
            Self::Slack { error } => TRANSIENT_SLACK_ERRORS.contains(&error.as_str()),
            Self::ParseError(_) | Self::NotFound(_) | Self::InvalidRequest(_) => false,
        }
    }

    /// Delay requested by the platform before the next attempt
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}
