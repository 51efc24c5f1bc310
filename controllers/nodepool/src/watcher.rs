//! Kubernetes resource watchers.
//!
//! This module handles watching Kubernetes resources for changes
//! and triggering reconciliation using kube_runtime::Controller.
//!
//! Controllers only deliver objects that still exist, so deletions of nodes
//! and node pools are picked up by a plain `watcher` stream next to the
//! controller. Both paths hand the reconciler a key and take that key's lock
//! first. A re-list after a dropped watch emits no `Delete` for objects that
//! vanished in between, so the deletion path diffs each re-list against the
//! keys it already knew.

use crate::error::ControllerError;
use crate::keylock::KeyLocks;
use crate::metrics::{Metrics, ProbeState};
use crate::reconciler::Reconciler;
use crds::NodePool;
use futures::StreamExt;
use k8s_openapi::api::core::v1::{Namespace, Node};
use kube::{Api, Client};
use kube_runtime::{Controller, WatchStreamExt, watcher, controller::{Action, Config as ControllerConfig}};
use pool_store::ObjectKey;
use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

type ReconcileFuture = Pin<Box<dyn Future<Output = Result<(), ControllerError>> + Send>>;

/// Reconciles one key of a resource kind
type ReconcileFn = fn(Arc<Reconciler>, ObjectKey) -> ReconcileFuture;

/// Shared state of all watchers
pub struct WatchContext {
    pub reconciler: Arc<Reconciler>,
    pub locks: KeyLocks,
    pub metrics: Arc<Metrics>,
    pub probes: Arc<ProbeState>,
    /// Delay before a failed key is retried
    pub requeue_interval: Duration,
    /// Concurrent reconciliations per resource kind
    pub concurrency: u16,
}

impl std::fmt::Debug for WatchContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchContext")
            .field("requeue_interval", &self.requeue_interval)
            .field("concurrency", &self.concurrency)
            .finish_non_exhaustive()
    }
}

/// Runs one reconciliation under the key's lock and records its outcome.
async fn reconcile_key(
    ctx: &WatchContext,
    key: ObjectKey,
    reconcile_fn: ReconcileFn,
    resource_name: &str,
) -> Result<(), ControllerError> {
    let _guard = ctx.locks.lock(&key).await;
    let result = reconcile_fn(ctx.reconciler.clone(), key).await;
    let outcome = match &result {
        Ok(()) => "success",
        Err(e) if e.is_conflict() => "conflict",
        Err(_) => "error",
    };
    ctx.metrics.record_reconciliation(resource_name, outcome);
    result
}

/// Generic watcher helper that uses kube_runtime::Controller.
///
/// Controller handles reconnection and keeps watching indefinitely. Failed
/// keys are requeued: conflicts right away, anything else after the
/// configured interval.
async fn watch_resource<K>(
    api: Api<K>,
    ctx: Arc<WatchContext>,
    reconcile_fn: ReconcileFn,
    resource_name: &'static str,
) -> Result<(), ControllerError>
where
    K: kube::Resource + Clone + Send + Sync + 'static + std::fmt::Debug + serde::de::DeserializeOwned,
    K::DynamicType: Default + std::cmp::Eq + std::hash::Hash + Clone + std::fmt::Debug + Unpin,
{
    info!("Starting {} watcher", resource_name);

    let error_policy = move |obj: Arc<K>, error: &ControllerError, ctx: Arc<WatchContext>| {
        let name = obj.meta().name.as_deref().unwrap_or_default();
        if error.is_conflict() {
            warn!("Conflict reconciling {} {}, retrying: {}", resource_name, name, error);
            Action::requeue(Duration::from_secs(1))
        } else {
            error!("Reconciliation error for {} {}: {}", resource_name, name, error);
            Action::requeue(ctx.requeue_interval)
        }
    };

    let reconcile = move |obj: Arc<K>, ctx: Arc<WatchContext>| async move {
        let Some(key) = ObjectKey::of(obj.as_ref()) else {
            warn!("Ignoring {} without a name", resource_name);
            return Ok(Action::await_change());
        };
        debug!("Reconciling {} {}", resource_name, key);
        reconcile_key(&ctx, key, reconcile_fn, resource_name)
            .await
            .map(|()| Action::await_change())
    };

    // Debounce batches bursts of events (status writes, node heartbeats)
    let controller_config = ControllerConfig::default()
        .debounce(Duration::from_secs(5))
        .concurrency(ctx.concurrency);

    Controller::new(api, watcher::Config::default())
        .with_config(controller_config)
        .run(reconcile, error_policy, ctx)
        .for_each(|res| async move {
            if let Err(e) = res {
                debug!("Controller error for {}: {}", resource_name, e);
            }
        })
        .await;

    Err(ControllerError::Watch(format!("{} controller stream ended", resource_name)))
}

/// Keys seen by a deletion watch.
#[derive(Debug, Default)]
struct DeletionTracker {
    known: HashSet<ObjectKey>,
    // Keys of the list in progress, between `Init` and `InitDone`
    relisted: Option<HashSet<ObjectKey>>,
    synced: bool,
}

impl DeletionTracker {
    /// Returns the keys deleted according to `event`: the object of a
    /// `Delete`, or every known key missing from a completed list.
    fn observe<K: kube::Resource>(&mut self, event: &watcher::Event<K>) -> Vec<ObjectKey> {
        match event {
            watcher::Event::Apply(obj) => {
                self.known.extend(ObjectKey::of(obj));
                Vec::new()
            }
            watcher::Event::Delete(obj) => match ObjectKey::of(obj) {
                Some(key) => {
                    self.known.remove(&key);
                    vec![key]
                }
                None => Vec::new(),
            },
            watcher::Event::Init => {
                self.relisted = Some(HashSet::new());
                Vec::new()
            }
            watcher::Event::InitApply(obj) => {
                if let Some(relisted) = self.relisted.as_mut() {
                    relisted.extend(ObjectKey::of(obj));
                }
                Vec::new()
            }
            watcher::Event::InitDone => {
                let relisted = self.relisted.take().unwrap_or_default();
                let mut gone: Vec<ObjectKey> = self.known.difference(&relisted).cloned().collect();
                gone.sort();
                self.known = relisted;
                self.synced = true;
                gone
            }
        }
    }
}

/// Reconciles the keys of deleted objects, retrying each until it succeeds.
async fn watch_deletions<K>(
    api: Api<K>,
    ctx: Arc<WatchContext>,
    reconcile_fn: ReconcileFn,
    resource_name: &'static str,
) -> Result<(), ControllerError>
where
    K: kube::Resource + Clone + Send + Sync + 'static + std::fmt::Debug + serde::de::DeserializeOwned,
    K::DynamicType: Default,
{
    info!("Starting {} deletion watcher", resource_name);

    let mut tracker = DeletionTracker::default();
    let mut events = watcher(api, watcher::Config::default()).default_backoff().boxed();
    while let Some(event) = events.next().await {
        let event = match event {
            Ok(event) => event,
            Err(e) => {
                warn!("{} deletion watch error: {}", resource_name, e);
                continue;
            }
        };
        let was_synced = tracker.synced;
        let deleted = tracker.observe(&event);
        if !was_synced && tracker.synced {
            info!("{} deletion watcher synced", resource_name);
            ctx.probes.mark_synced();
        }

        for key in deleted {
            info!("{} {} deleted", resource_name, key);
            let ctx = ctx.clone();
            tokio::spawn(async move {
                while let Err(e) = reconcile_key(&ctx, key.clone(), reconcile_fn, resource_name).await {
                    error!("Reconciliation error for deleted {} {}: {}", resource_name, key, e);
                    tokio::time::sleep(ctx.requeue_interval).await;
                }
            });
        }
    }

    Err(ControllerError::Watch(format!("{} deletion stream ended", resource_name)))
}

fn reconcile_namespace(reconciler: Arc<Reconciler>, key: ObjectKey) -> ReconcileFuture {
    Box::pin(async move { reconciler.reconcile_namespace(&key.name).await })
}

fn reconcile_node(reconciler: Arc<Reconciler>, key: ObjectKey) -> ReconcileFuture {
    Box::pin(async move { reconciler.reconcile_node(&key.name).await })
}

fn reconcile_node_pool(reconciler: Arc<Reconciler>, key: ObjectKey) -> ReconcileFuture {
    Box::pin(async move {
        let namespace = key.namespace.as_deref().unwrap_or_default();
        reconciler.reconcile_node_pool(namespace, &key.name).await
    })
}

/// Watches Kubernetes resources for changes.
pub struct Watcher {
    ctx: Arc<WatchContext>,
    namespace_api: Api<Namespace>,
    node_api: Api<Node>,
    node_pool_api: Api<NodePool>,
}

impl std::fmt::Debug for Watcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watcher").field("ctx", &self.ctx).finish_non_exhaustive()
    }
}

impl Watcher {
    /// Creates a new watcher instance.
    pub fn new(client: Client, ctx: Arc<WatchContext>) -> Self {
        Self {
            ctx,
            namespace_api: Api::all(client.clone()),
            node_api: Api::all(client.clone()),
            node_pool_api: Api::all(client),
        }
    }

    /// Starts watching Namespace resources.
    pub async fn watch_namespaces(&self) -> Result<(), ControllerError> {
        watch_resource(self.namespace_api.clone(), self.ctx.clone(), reconcile_namespace, "Namespace").await
    }

    /// Starts watching Node resources.
    pub async fn watch_nodes(&self) -> Result<(), ControllerError> {
        watch_resource(self.node_api.clone(), self.ctx.clone(), reconcile_node, "Node").await
    }

    /// Starts watching Node deletions.
    pub async fn watch_node_deletions(&self) -> Result<(), ControllerError> {
        watch_deletions(self.node_api.clone(), self.ctx.clone(), reconcile_node, "Node").await
    }

    /// Starts watching NodePool resources.
    pub async fn watch_node_pools(&self) -> Result<(), ControllerError> {
        watch_resource(self.node_pool_api.clone(), self.ctx.clone(), reconcile_node_pool, "NodePool").await
    }

    /// Starts watching NodePool deletions.
    pub async fn watch_node_pool_deletions(&self) -> Result<(), ControllerError> {
        watch_deletions(self.node_pool_api.clone(), self.ctx.clone(), reconcile_node_pool, "NodePool").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::create_test_node;
    use kube_runtime::watcher::Event;

    fn key(name: &str) -> ObjectKey {
        ObjectKey::cluster(name)
    }

    fn initial_list(tracker: &mut DeletionTracker, names: &[&str]) -> Vec<ObjectKey> {
        assert!(tracker.observe::<Node>(&Event::Init).is_empty());
        for name in names {
            assert!(tracker.observe(&Event::InitApply(create_test_node(name, None))).is_empty());
        }
        tracker.observe::<Node>(&Event::InitDone)
    }

    #[test]
    fn test_first_list_syncs_without_deletions() {
        let mut tracker = DeletionTracker::default();
        assert!(!tracker.synced);
        assert!(initial_list(&mut tracker, &["n1", "n2"]).is_empty());
        assert!(tracker.synced);
    }

    #[test]
    fn test_delete_event_reports_key() {
        let mut tracker = DeletionTracker::default();
        initial_list(&mut tracker, &["n1"]);
        assert_eq!(tracker.observe(&Event::Delete(create_test_node("n1", None))), vec![key("n1")]);
        assert!(tracker.known.is_empty());
    }

    #[test]
    fn test_relist_reports_objects_deleted_while_disconnected() {
        let mut tracker = DeletionTracker::default();
        initial_list(&mut tracker, &["n1", "n2"]);
        assert!(tracker.observe(&Event::Apply(create_test_node("n3", None))).is_empty());

        // n1 and n3 vanished while the watch was down; n4 is new
        assert_eq!(initial_list(&mut tracker, &["n2", "n4"]), vec![key("n1"), key("n3")]);

        // A further relist of the same set reports nothing
        assert!(initial_list(&mut tracker, &["n2", "n4"]).is_empty());
    }
}
