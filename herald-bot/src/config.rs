//! Bot configuration
//!
//! Every option is a command-line flag with an environment variable
//! fallback, so the same binary runs from a shell or from a Deployment
//! manifest. Validation happens once at startup; any error here is fatal.

use clap::Parser;
use herald_client::cluster::{SERVICE_ACCOUNT_CA, SERVICE_ACCOUNT_NAMESPACE, SERVICE_ACCOUNT_TOKEN};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Namespace used when neither the flag nor the service account provide one
const DEFAULT_NAMESPACE: &str = "jx";

/// Herald: reports pipeline activity to Slack
#[derive(Debug, Clone, Parser)]
#[command(name = "herald", version, about, long_about = None)]
pub struct Config {
    /// Slack bot token
    #[arg(long, env = "SLACK_TOKEN", hide_env_values = true, default_value = "")]
    pub slack_token: String,

    /// Override of the Slack Web API base URL
    #[arg(long, env = "SLACK_URL")]
    pub slack_url: Option<String>,

    /// Namespace to watch (defaults to the service account namespace)
    #[arg(long, env = "NAMESPACE")]
    pub namespace: Option<String>,

    /// Kubernetes API server URL
    #[arg(long, env = "KUBERNETES_API_URL")]
    pub kube_api_url: Option<String>,

    /// Bearer token file for the Kubernetes API
    #[arg(long, env = "KUBERNETES_TOKEN_FILE", default_value = SERVICE_ACCOUNT_TOKEN)]
    pub kube_token_file: PathBuf,

    /// CA bundle trusted for the Kubernetes API
    #[arg(long, env = "KUBERNETES_CA_FILE", default_value = SERVICE_ACCOUNT_CA)]
    pub kube_ca_file: PathBuf,

    /// Dashboard base URL; empty disables dashboard links
    #[arg(long, env = "DASHBOARD_URL", default_value = "")]
    pub dashboard_url: String,

    /// Source configuration file mapping repositories to channels
    #[arg(long, env = "SOURCE_CONFIG", default_value = ".jx/gitops/source-config.yaml")]
    pub source_config: PathBuf,

    /// Channel used when the source configuration names none
    #[arg(long, env = "SLACK_CHANNEL", default_value = "#jenkins-x-pipelines")]
    pub channel: String,

    /// Number of concurrent render workers
    #[arg(long, env = "WORKERS", default_value_t = 4)]
    pub workers: usize,

    /// Minimum spacing between two Slack calls, in milliseconds
    #[arg(long, env = "MIN_CALL_INTERVAL_MS", default_value_t = 1000)]
    pub min_call_interval_ms: u64,

    /// Bind address of the health endpoint
    #[arg(long, env = "HEALTH_BIND_ADDR", default_value = "0.0.0.0:8080")]
    pub health_addr: SocketAddr,
}

impl Config {
    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.slack_token.trim().is_empty() {
            anyhow::bail!("no $SLACK_TOKEN defined");
        }

        if let Some(url) = &self.slack_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                anyhow::bail!("slack_url must start with http:// or https://");
            }
        }

        if let Some(namespace) = &self.namespace {
            if namespace.trim().is_empty() {
                anyhow::bail!("namespace cannot be empty");
            }
        }

        if !self.dashboard_url.is_empty()
            && !self.dashboard_url.starts_with("http://")
            && !self.dashboard_url.starts_with("https://")
        {
            anyhow::bail!("dashboard_url must start with http:// or https://");
        }

        if self.channel.trim().is_empty() {
            anyhow::bail!("channel cannot be empty");
        }

        if self.workers == 0 {
            anyhow::bail!("workers must be greater than 0");
        }

        Ok(())
    }

    /// Minimum spacing between two outbound messaging calls
    pub fn min_call_interval(&self) -> Duration {
        Duration::from_millis(self.min_call_interval_ms)
    }

    /// The namespace to watch
    ///
    /// Falls back to the service account namespace file, then to `jx`.
    pub fn resolve_namespace(&self) -> String {
        self.namespace
            .clone()
            .or_else(|| read_trimmed(Path::new(SERVICE_ACCOUNT_NAMESPACE)))
            .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string())
    }

    /// The Kubernetes API URL
    ///
    /// Falls back to the in-cluster service environment variables.
    pub fn resolve_kube_api_url(&self) -> anyhow::Result<String> {
        if let Some(url) = &self.kube_api_url {
            return Ok(url.clone());
        }

        let host = std::env::var("KUBERNETES_SERVICE_HOST").map_err(|_| {
            anyhow::anyhow!(
                "no Kubernetes API URL: set $KUBERNETES_API_URL or run inside a cluster"
            )
        })?;
        let port = std::env::var("KUBERNETES_SERVICE_PORT").unwrap_or_else(|_| "443".to_string());

        if host.contains(':') {
            Ok(format!("https://[{}]:{}", host, port))
        } else {
            Ok(format!("https://{}:{}", host, port))
        }
    }
}

fn read_trimmed(path: &Path) -> Option<String> {
    std::fs::read_to_string(path)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
