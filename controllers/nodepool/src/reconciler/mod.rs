//! Reconciliation logic for NodePools.
//!
//! One reconciler per watched kind:
//! - `namespace`: ensures every non-excluded namespace has a default pool
//! - `node_pool`: enforces pool existence, heals drifted selectors and
//!   recomputes membership
//! - `node`: keeps membership current as nodes come, go and change labels
//!
//! Reconcilers receive keys, not objects. Every invocation re-reads what it
//! needs from the store and writes back objects carrying the resourceVersion
//! it read, so a concurrent change turns into a conflict and a retry.

pub mod namespace;
pub mod node;
pub mod node_pool;
#[cfg(test)]
mod node_pool_test;

use crate::config::ExclusionSet;
use crate::error::ControllerError;
use crds::{NodePool, NodePoolStatus};
use pool_store::PoolStore;
use std::sync::Arc;
use tracing::info;

/// Reconciles namespaces, nodes and node pools against the store.
pub struct Reconciler {
    pub(crate) store: Arc<dyn PoolStore>,
    pub(crate) exclusions: Arc<ExclusionSet>,
}

impl Reconciler {
    pub fn new(store: Arc<dyn PoolStore>, exclusions: Arc<ExclusionSet>) -> Self {
        Self { store, exclusions }
    }

    /// Whether the namespace exists and is not being deleted.
    async fn namespace_active(&self, name: &str) -> Result<bool, ControllerError> {
        Ok(self
            .store
            .get_namespace(name)
            .await?
            .is_some_and(|ns| ns.metadata.deletion_timestamp.is_none()))
    }

    /// Writes `nodes` as the pool's member list.
    async fn persist_nodes(&self, mut pool: NodePool, nodes: Vec<String>) -> Result<NodePool, ControllerError> {
        info!(
            "Updating NodePool {}/{} nodes: {:?} -> {:?}",
            pool.metadata.namespace.as_deref().unwrap_or_default(),
            pool.metadata.name.as_deref().unwrap_or_default(),
            pool.status_nodes(),
            nodes
        );
        pool.status = Some(NodePoolStatus { nodes });
        Ok(self.store.replace_node_pool_status(&pool).await?)
    }
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("exclusions", &self.exclusions)
            .finish_non_exhaustive()
    }
}
