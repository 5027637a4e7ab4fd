//! Slack Web API client

mod chat;
mod users;

use reqwest::Client;
use reqwest::header::RETRY_AFTER;
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::error::{ClientError, Result};

/// Default Web API base URL
pub const DEFAULT_SLACK_URL: &str = "https://slack.com/api";

/// HTTP client for the Slack Web API
///
/// Every call is authenticated with the bot token and returns a
/// [`ClientError`] that classifies rate limiting and transient failures so
/// callers can decide whether to retry.
#[derive(Debug, Clone)]
pub struct SlackClient {
    /// Base URL of the Web API (e.g., "https://slack.com/api")
    base_url: String,
    /// Bot token sent as a bearer credential
    token: String,
    /// HTTP client instance
    client: Client,
}

/// Replies that carry the Web API `ok`/`error` envelope
pub(crate) trait SlackReply {
    fn ok(&self) -> bool;
    fn error(&self) -> Option<&str>;
}

impl SlackReply for herald_core::dto::slack::SlackResponse {
    fn ok(&self) -> bool {
        self.ok
    }

    fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

impl SlackReply for herald_core::dto::slack::LookupUserResponse {
    fn ok(&self) -> bool {
        self.ok
    }

    fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

impl SlackClient {
    /// Create a new client against the public Web API
    pub fn new(token: impl Into<String>) -> Self {
        Self::with_base_url(token, DEFAULT_SLACK_URL)
    }

    /// Create a new client against a custom base URL
    ///
    /// # Arguments
    /// * `token` - The bot token
    /// * `base_url` - Web API base URL, e.g. a proxy or a test server
    pub fn with_base_url(token: impl Into<String>, base_url: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self::with_client(token, base_url, client)
    }

    /// Create a new client with a custom HTTP client
    ///
    /// This allows you to configure timeouts, proxies, TLS settings, etc.
    pub fn with_client(
        token: impl Into<String>,
        base_url: impl Into<String>,
        client: Client,
    ) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.into(),
            client,
        }
    }

    /// Get the base URL of the Web API
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{}", self.base_url, method)
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Handle a Web API response
    ///
    /// HTTP 429 becomes [`ClientError::RateLimited`] carrying the
    /// `Retry-After` delay; other non-success statuses become API errors and
    /// an `ok: false` body becomes [`ClientError::Slack`].
    async fn handle_response<T>(&self, response: reqwest::Response) -> Result<T>
    where
        T: DeserializeOwned + SlackReply,
    {
        let status = response.status();

        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(ClientError::RateLimited { retry_after });
        }

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::api_error(status.as_u16(), error_text));
        }

        let reply: T = response
            .json()
            .await
            .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))?;

        if !reply.ok() {
            return Err(ClientError::slack(reply.error().unwrap_or("unknown_error")));
        }

        Ok(reply)
    }
}
