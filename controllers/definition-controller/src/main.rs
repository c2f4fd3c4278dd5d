//! Definition Controller
//!
//! Runs one control loop for every `Controller` definition in the definition
//! namespace. Each loop templates the definition's script against every
//! instance of its main type, server-side applies the produced objects and
//! writes back the instance status.
//!
//! Definition changes that alter which types are watched rebuild every loop.

mod backoff;
mod bootstrap;
mod config;
mod controller;
mod definition_watcher;
mod error;
mod object_reader;
mod reconcile_helpers;
mod reconciler;
mod restart;
mod watcher;
#[cfg(test)]
mod test_utils;

use crate::backoff::ExponentialBackoff;
use crate::config::{Config, LogFormat};
use crate::controller::{Registrar, supervise};
use crate::error::ControllerError;
use cluster_client::{KubeClusterClient, KubeEventPublisher};
use kube::Client;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const CONTROLLER_NAME: &str = "declare-controller";

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    let config = Config::from_env()?;
    init_tracing(config.log_format);

    // Both kube and rustls are built without a default crypto provider
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        warn!("A rustls crypto provider was already installed");
    }

    info!("Starting Definition Controller");
    info!("Configuration:");
    info!("  Definition namespace: {}", config.definition_namespace);
    info!("  Field manager prefix: {}", config.field_manager_prefix);
    info!("  Concurrency: {}", config.concurrency);
    info!("  API timeout: {:?}", config.api_timeout);

    let client = Client::try_default().await?;
    let cluster = Arc::new(KubeClusterClient::new(client.clone(), config.api_timeout));
    let events = Arc::new(KubeEventPublisher::new(client.clone(), CONTROLLER_NAME));
    let registrar = Registrar::new(client, cluster, events, config);

    let shutdown = CancellationToken::new();
    tokio::spawn(forward_shutdown(shutdown.clone()));

    supervise(&shutdown, ExponentialBackoff::default(), || registrar.run(&shutdown)).await;

    info!("Definition Controller stopped");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Cancel `shutdown` on SIGINT or SIGTERM
async fn forward_shutdown(shutdown: CancellationToken) {
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Cannot listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let interrupt = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, shutting down"),
            Err(e) => {
                warn!("Cannot listen for SIGINT: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = interrupt => {}
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
    shutdown.cancel();
}
