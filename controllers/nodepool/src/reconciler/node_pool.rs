//! NodePool reconciler

use super::Reconciler;
use crate::error::ControllerError;
use crate::membership::{matching_nodes, membership_changed};
use crds::{default_node_selector, NodePool, DEFAULT_NODE_POOL_NAME};
use tracing::{debug, info};

impl Reconciler {
    /// Converges one pool key.
    ///
    /// 1. In an excluded namespace the pool is deleted if present.
    /// 2. A missing default pool is re-created while its namespace exists and
    ///    is not terminating; any other missing pool stays deleted.
    /// 3. A present pool gets its selector reset to the generated one.
    /// 4. Membership is recomputed from the full node list and written when
    ///    it differs from status or no status was ever written.
    pub async fn reconcile_node_pool(&self, namespace: &str, name: &str) -> Result<(), ControllerError> {
        info!("Reconciling NodePool {}/{}", namespace, name);

        let existing = self.store.get_node_pool(namespace, name).await?;

        if self.exclusions.contains(namespace) {
            if existing.is_some() {
                info!("Deleting NodePool {}/{} in excluded namespace", namespace, name);
                self.store.delete_node_pool(namespace, name).await?;
            }
            return Ok(());
        }

        let (pool, created) = match existing {
            Some(pool) => (self.heal_selector(pool, namespace).await?, false),
            None if name == DEFAULT_NODE_POOL_NAME => {
                if !self.namespace_active(namespace).await? {
                    debug!("Namespace {} is gone or terminating, not re-creating NodePool {}", namespace, name);
                    return Ok(());
                }
                let created = self
                    .store
                    .create_node_pool(&NodePool::generate(name, namespace))
                    .await?;
                info!("Re-created NodePool {}/{}", namespace, name);
                (created, true)
            }
            None => {
                debug!("NodePool {}/{} deleted, leaving it deleted", namespace, name);
                return Ok(());
            }
        };

        let nodes = self.store.list_nodes().await?;
        let desired = matching_nodes(&pool, &nodes);
        if created || pool.status.is_none() || membership_changed(pool.status_nodes(), &desired) {
            self.persist_nodes(pool, desired).await?;
        } else {
            debug!("NodePool {}/{} membership up to date", namespace, name);
        }
        Ok(())
    }

    /// Reverts an externally modified selector to the generated value.
    async fn heal_selector(&self, mut pool: NodePool, namespace: &str) -> Result<NodePool, ControllerError> {
        let desired = default_node_selector(namespace);
        if pool.spec.node_selector == desired {
            return Ok(pool);
        }
        info!(
            "Resetting NodePool {}/{} nodeSelector {:?} -> {:?}",
            namespace,
            pool.metadata.name.as_deref().unwrap_or_default(),
            pool.spec.node_selector,
            desired
        );
        pool.spec.node_selector = desired;
        Ok(self.store.replace_node_pool(&pool).await?)
    }
}
