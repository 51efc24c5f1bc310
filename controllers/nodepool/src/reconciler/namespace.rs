//! Namespace reconciler

use super::Reconciler;
use crate::error::ControllerError;
use crds::{NodePool, DEFAULT_NODE_POOL_NAME};
use tracing::{debug, info};

impl Reconciler {
    /// Ensures the namespace has its default pool.
    ///
    /// Creates the pool with an empty member list if it is missing. A gone,
    /// terminating or excluded namespace, or an existing pool, means nothing
    /// to do.
    pub async fn reconcile_namespace(&self, name: &str) -> Result<(), ControllerError> {
        info!("Reconciling Namespace {}", name);

        if !self.namespace_active(name).await? {
            debug!("Namespace {} is gone or terminating, skipping", name);
            return Ok(());
        }
        if self.exclusions.contains(name) {
            debug!("Namespace {} is excluded, skipping", name);
            return Ok(());
        }
        if self.store.get_node_pool(name, DEFAULT_NODE_POOL_NAME).await?.is_some() {
            debug!("NodePool {}/{} already exists", name, DEFAULT_NODE_POOL_NAME);
            return Ok(());
        }

        let created = self
            .store
            .create_node_pool(&NodePool::generate(DEFAULT_NODE_POOL_NAME, name))
            .await?;
        info!("Created NodePool {}/{}", name, DEFAULT_NODE_POOL_NAME);
        self.persist_nodes(created, Vec::new()).await?;
        Ok(())
    }
}
