//! Main controller implementation.
//!
//! This module contains the `Controller` struct that starts the watchers,
//! the admission webhook and the probe server, and runs until one of them
//! exits.
//!
//! The controller manages three resource kinds:
//! - Namespace: every non-excluded namespace gets a default NodePool
//! - NodePool: existence policy, selector healing and membership
//! - Node: membership updates as nodes join, leave or change labels

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::keylock::KeyLocks;
use crate::metrics::{serve_probes, Metrics, ProbeState};
use crate::reconciler::Reconciler;
use crate::watcher::{WatchContext, Watcher};
use crate::webhook::{load_tls_config, serve_webhook, WebhookState};
use kube::Client;
use pool_store::KubePoolStore;
use std::sync::Arc;
use tokio::task::{JoinError, JoinHandle};
use tracing::info;

type Task = JoinHandle<Result<(), ControllerError>>;

/// Main controller for NodePool management.
#[derive(Debug)]
pub struct Controller {
    namespace_watcher: Task,
    node_watcher: Task,
    node_deletion_watcher: Task,
    node_pool_watcher: Task,
    node_pool_deletion_watcher: Task,
    webhook_server: Task,
    probe_server: Task,
}

impl Controller {
    /// Creates a new controller instance and starts all of its tasks.
    ///
    /// Fails without starting anything when cluster credentials or the
    /// webhook's TLS material are unavailable.
    pub async fn new(config: ControllerConfig) -> Result<Self, ControllerError> {
        info!("Initializing NodePool Controller");

        let kube_client = Client::try_default().await?;
        let tls_config = load_tls_config(&config.webhook_cert_path, &config.webhook_key_path).await?;
        let metrics = Arc::new(Metrics::new()?);
        let exclusions = Arc::new(config.excluded_namespaces.clone());
        // Ready once the Node and NodePool deletion watches have listed
        let probe_state = Arc::new(ProbeState::new(metrics.clone(), 2));

        let reconciler = Arc::new(Reconciler::new(
            Arc::new(KubePoolStore::new(kube_client.clone())),
            exclusions.clone(),
        ));
        let watcher_instance = Arc::new(Watcher::new(
            kube_client,
            Arc::new(WatchContext {
                reconciler,
                locks: KeyLocks::new(),
                metrics: metrics.clone(),
                probes: probe_state.clone(),
                requeue_interval: config.requeue_interval,
                concurrency: config.reconcile_concurrency,
            }),
        ));

        // Start all watchers in background tasks
        let namespace_watcher = {
            let watcher = watcher_instance.clone();
            tokio::spawn(async move { watcher.watch_namespaces().await })
        };
        let node_watcher = {
            let watcher = watcher_instance.clone();
            tokio::spawn(async move { watcher.watch_nodes().await })
        };
        let node_deletion_watcher = {
            let watcher = watcher_instance.clone();
            tokio::spawn(async move { watcher.watch_node_deletions().await })
        };
        let node_pool_watcher = {
            let watcher = watcher_instance.clone();
            tokio::spawn(async move { watcher.watch_node_pools().await })
        };
        let node_pool_deletion_watcher = {
            let watcher = watcher_instance.clone();
            tokio::spawn(async move { watcher.watch_node_pool_deletions().await })
        };

        let webhook_server = tokio::spawn(serve_webhook(
            config.webhook_addr,
            tls_config,
            Arc::new(WebhookState::new(exclusions, metrics.clone())),
        ));

        let probe_server = tokio::spawn(serve_probes(config.probe_addr, probe_state));

        Ok(Self {
            namespace_watcher,
            node_watcher,
            node_deletion_watcher,
            node_pool_watcher,
            node_pool_deletion_watcher,
            webhook_server,
            probe_server,
        })
    }

    /// Runs the controller until shutdown.
    pub async fn run(mut self) -> Result<(), ControllerError> {
        info!("NodePool Controller running");

        // Wait for any task to exit (they should run forever)
        tokio::select! {
            result = &mut self.namespace_watcher => task_result("Namespace watcher", result),
            result = &mut self.node_watcher => task_result("Node watcher", result),
            result = &mut self.node_deletion_watcher => task_result("Node deletion watcher", result),
            result = &mut self.node_pool_watcher => task_result("NodePool watcher", result),
            result = &mut self.node_pool_deletion_watcher => task_result("NodePool deletion watcher", result),
            result = &mut self.webhook_server => task_result("Webhook server", result),
            result = &mut self.probe_server => task_result("Probe server", result),
        }
    }
}

fn task_result(
    task: &str,
    result: Result<Result<(), ControllerError>, JoinError>,
) -> Result<(), ControllerError> {
    result.map_err(|e| ControllerError::Watch(format!("{} panicked: {}", task, e)))?
}
