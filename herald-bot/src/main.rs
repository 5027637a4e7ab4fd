//! Herald
//!
//! A long-running bot that watches pipeline activity records in a cluster
//! namespace and reports each build to Slack, mentioning the commit author.
//!
//! Architecture:
//! - Configuration: flags with environment fallbacks, validated at startup
//! - Repositories: cluster and Slack capabilities behind traits
//! - Services: identity resolution, formatting, correlation, dispatch
//! - Scheduler: the supervised activity watcher and the render worker pool
//! - API: health and status endpoints
//!
//! Every build gets exactly one message, created on its first event and
//! edited in place until the build reaches a terminal status.

mod api;
mod config;
mod repository;
mod scheduler;
mod service;
#[cfg(test)]
mod testing;

use anyhow::{Context, Result};
use clap::Parser;
use herald_client::{ClusterClient, SlackClient};
use herald_core::domain::source_config::SourceConfigs;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::api::AppState;
use crate::config::Config;
use crate::scheduler::WatchActivities;
use crate::service::{Correlator, Dispatcher, IdentityResolver, MessageFormatter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "herald_bot=info,herald_client=info,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Herald");

    // Load configuration
    let config = Config::parse();
    config.validate()?;

    let namespace = config.resolve_namespace();
    info!("Loaded configuration: namespace={}, workers={}", namespace, config.workers);

    // Initialize clients
    let slack = Arc::new(match &config.slack_url {
        Some(url) => SlackClient::with_base_url(config.slack_token.clone(), url.clone()),
        None => SlackClient::new(config.slack_token.clone()),
    });
    let cluster = Arc::new(create_cluster_client(&config)?);

    info!(
        "Clients initialized (Slack API at {}, cluster API at {})",
        slack.base_url(),
        cluster.base_url()
    );

    let source_configs = load_source_configs(&config.source_config, &config.channel)?;

    if config.dashboard_url.is_empty() {
        warn!("No dashboard URL configured, messages will not link to builds");
    } else {
        info!("Linking builds to {}", config.dashboard_url);
    }

    // Shutdown signal
    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_signal(cancel.clone()));

    // Initialize services
    let resolver = Arc::new(IdentityResolver::new(
        slack.clone(),
        cluster.clone(),
        namespace.clone(),
    ));
    let dispatcher = Arc::new(Dispatcher::new(
        slack.clone(),
        config.min_call_interval(),
        cancel.clone(),
    ));
    let correlator = Arc::new(Correlator::new(
        dispatcher,
        resolver,
        MessageFormatter::new(config.dashboard_url.clone()),
        Arc::new(source_configs),
    ));
    let engine = WatchActivities::new(
        cluster.clone(),
        correlator.clone(),
        namespace.clone(),
        config.workers,
    );

    info!("Services initialized");

    // Health endpoint
    let app = api::create_router(AppState {
        namespace,
        correlator,
        connected: engine.connected(),
    });
    let listener = tokio::net::TcpListener::bind(config.health_addr)
        .await
        .with_context(|| format!("Failed to bind health endpoint to {}", config.health_addr))?;

    info!("Health endpoint listening on {}", config.health_addr);

    let server_cancel = cancel.clone();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { server_cancel.cancelled().await })
            .await
    });

    // Run until shutdown
    if let Err(e) = engine.run(cancel.clone()).await {
        error!("Engine error: {:#}", e);
        cancel.cancel();
        return Err(e);
    }

    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("Health endpoint error: {}", e),
        Err(e) => warn!("Health endpoint task failed: {}", e),
    }

    info!("Herald stopped");
    Ok(())
}

/// Builds the cluster client from the service account, if one is mounted
fn create_cluster_client(config: &Config) -> Result<ClusterClient> {
    let url = config.resolve_kube_api_url()?;

    if !config.kube_token_file.exists() {
        warn!(
            "No token at {}, talking to the cluster API unauthenticated",
            config.kube_token_file.display()
        );
        return Ok(ClusterClient::new(url));
    }

    let ca_file = config
        .kube_ca_file
        .exists()
        .then_some(config.kube_ca_file.as_path());

    ClusterClient::from_service_account(url, config.kube_token_file.clone(), ca_file)
        .context("Failed to create cluster client")
}

/// Loads the repository notification settings
///
/// A missing file means every repository uses the defaults.
fn load_source_configs(path: &Path, default_channel: &str) -> Result<SourceConfigs> {
    match std::fs::read_to_string(path) {
        Ok(yaml) => {
            let configs = SourceConfigs::from_yaml(&yaml, default_channel)
                .with_context(|| format!("Failed to parse source config {}", path.display()))?;
            info!(
                "Loaded source config {} ({} group(s))",
                path.display(),
                configs.spec().groups.len()
            );
            Ok(configs)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(
                "No source config at {}, notifying every repository in {}",
                path.display(),
                default_channel
            );
            Ok(SourceConfigs::empty(default_channel))
        }
        Err(e) => {
            Err(e).with_context(|| format!("Failed to read source config {}", path.display()))
        }
    }
}

/// Cancels `cancel` on SIGINT or SIGTERM
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
    cancel.cancel();
}
