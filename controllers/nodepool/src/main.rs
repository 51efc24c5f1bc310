//! NodePool Controller
//!
//! Keeps one NodePool per namespace in sync with the cluster's nodes:
//! - Namespace: creates the namespace's default NodePool
//! - NodePool: deletes pools in excluded namespaces, re-creates deleted
//!   default pools, reverts selector edits, recomputes membership
//! - Node: adds and removes nodes from pools as their `nodepool` label changes
//!
//! A mutating admission webhook pins new pods to their namespace's pool.

mod config;
mod controller;
mod error;
mod keylock;
mod membership;
mod metrics;
mod reconciler;
mod test_utils;
mod watcher;
mod webhook;

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use controller::Controller;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Configure rustls crypto provider before any TLS is set up
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        return Err(ControllerError::Tls("failed to install rustls crypto provider".to_string()));
    }

    info!("Starting NodePool Controller");

    let config = ControllerConfig::from_env()?;
    info!("Configuration:");
    info!("  Excluded namespaces: {}", config.excluded_namespaces.iter().collect::<Vec<_>>().join(","));
    info!("  Webhook: {}", config.webhook_addr);
    info!("  Probes: {}", config.probe_addr);
    info!("  Requeue interval: {:?}", config.requeue_interval);

    let controller = Controller::new(config).await?;
    controller.run().await?;

    Ok(())
}
