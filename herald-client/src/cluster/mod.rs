//! Kubernetes API client
//!
//! A deliberately small REST client scoped to the `jenkins.io/v1` resources
//! the bot reads. List calls return typed collections; watch calls return a
//! stream of decoded [`WatchEvent`]s framed from the chunked response body.

mod activities;
mod users;

use futures::stream::{self, BoxStream, Stream, StreamExt};
use herald_core::dto::kube::WatchEvent;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::error::{ClientError, Result};

/// In-cluster service account token path
pub const SERVICE_ACCOUNT_TOKEN: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";

/// In-cluster service account CA bundle path
pub const SERVICE_ACCOUNT_CA: &str = "/var/run/secrets/kubernetes.io/serviceaccount/ca.crt";

/// In-cluster namespace file
pub const SERVICE_ACCOUNT_NAMESPACE: &str =
    "/var/run/secrets/kubernetes.io/serviceaccount/namespace";

/// Group/version path of the jx resources
const JX_API: &str = "apis/jenkins.io/v1";

/// Stream of decoded watch events
pub type WatchStream<T> = BoxStream<'static, Result<WatchEvent<T>>>;

/// Where the bearer token comes from
///
/// Projected service account tokens are rotated on disk, so a file source is
/// re-read on every request.
#[derive(Debug, Clone)]
pub enum TokenSource {
    None,
    Static(String),
    File(PathBuf),
}

impl TokenSource {
    async fn token(&self) -> Result<Option<String>> {
        match self {
            TokenSource::None => Ok(None),
            TokenSource::Static(token) => Ok(Some(token.clone())),
            TokenSource::File(path) => {
                let token = tokio::fs::read_to_string(path).await.map_err(|e| {
                    ClientError::InvalidRequest(format!(
                        "Failed to read token file {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                Ok(Some(token.trim().to_string()))
            }
        }
    }
}

/// HTTP client for the Kubernetes API server
#[derive(Debug, Clone)]
pub struct ClusterClient {
    /// Base URL of the API server (e.g., "https://10.0.0.1:443")
    base_url: String,
    token: TokenSource,
    /// HTTP client instance
    client: Client,
}

impl ClusterClient {
    /// Create a client without credentials, e.g. behind `kubectl proxy`
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, TokenSource::None, Client::new())
    }

    /// Create a client with a custom HTTP client and token source
    pub fn with_client(base_url: impl Into<String>, token: TokenSource, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            client,
        }
    }

    /// Create a client that authenticates with a service account
    ///
    /// # Arguments
    /// * `base_url` - API server URL
    /// * `token_file` - Bearer token file, re-read per request
    /// * `ca_file` - Optional PEM bundle trusted in addition to the system roots
    pub fn from_service_account(
        base_url: impl Into<String>,
        token_file: impl Into<PathBuf>,
        ca_file: Option<&Path>,
    ) -> Result<Self> {
        let mut builder = Client::builder().connect_timeout(Duration::from_secs(10));

        if let Some(ca_file) = ca_file {
            let pem = std::fs::read(ca_file).map_err(|e| {
                ClientError::InvalidRequest(format!(
                    "Failed to read CA file {}: {}",
                    ca_file.display(),
                    e
                ))
            })?;
            let cert = reqwest::Certificate::from_pem(&pem)?;
            builder = builder.add_root_certificate(cert);
        }

        let client = builder.build()?;
        Ok(Self::with_client(
            base_url,
            TokenSource::File(token_file.into()),
            client,
        ))
    }

    /// Get the base URL of the API server
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn resource_url(&self, namespace: &str, plural: &str) -> String {
        format!(
            "{}/{}/namespaces/{}/{}",
            self.base_url, JX_API, namespace, plural
        )
    }

    async fn authorized_get(&self, url: &str) -> Result<reqwest::RequestBuilder> {
        let mut request = self.client.get(url);
        if let Some(token) = self.token.token().await? {
            request = request.bearer_auth(token);
        }
        Ok(request)
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Handle an API response and deserialize JSON
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let response = Self::check_status(response).await?;

        response
            .json()
            .await
            .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();

        if status.as_u16() == 404 {
            let url = response.url().to_string();
            return Err(ClientError::NotFound(url));
        }

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::api_error(status.as_u16(), error_text));
        }

        Ok(response)
    }
}

/// Frames a chunked body into newline-delimited watch events
///
/// The stream ends when the body ends or after the first transport error.
pub fn decode_watch_lines<T, S, B, E>(body: S) -> WatchStream<T>
where
    T: DeserializeOwned + Send + 'static,
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<ClientError> + Send + 'static,
{
    let body = Box::pin(body);

    stream::unfold(
        (body, Vec::<u8>::new(), false),
        |(mut body, mut buf, mut done)| async move {
            loop {
                if let Some(pos) = buf.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = buf.drain(..=pos).collect();
                    if let Some(event) = parse_line::<T>(&line) {
                        return Some((event, (body, buf, done)));
                    }
                    continue;
                }

                if done {
                    let rest = std::mem::take(&mut buf);
                    return parse_line::<T>(&rest).map(|event| (event, (body, buf, true)));
                }

                match body.next().await {
                    Some(Ok(chunk)) => buf.extend_from_slice(chunk.as_ref()),
                    Some(Err(e)) => {
                        buf.clear();
                        return Some((Err(e.into()), (body, buf, true)));
                    }
                    None => done = true,
                }
            }
        },
    )
    .boxed()
}

fn parse_line<T: DeserializeOwned>(line: &[u8]) -> Option<Result<WatchEvent<T>>> {
    let text = String::from_utf8_lossy(line);
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    debug!("Decoding watch line ({} bytes)", text.len());
    Some(
        serde_json::from_str(text)
            .map_err(|e| ClientError::ParseError(format!("Invalid watch event: {}", e))),
    )
}
