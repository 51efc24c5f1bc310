//! Node reconciler

use super::Reconciler;
use crate::error::ControllerError;
use crate::membership::{
    add_node_unique, matching_nodes, membership_changed, node_label_value, pool_matches, remove_node,
};
use crds::NodePool;
use tracing::{debug, info};

impl Reconciler {
    /// Updates pool membership for one node.
    ///
    /// A deleted node is removed from every pool listing it. A present node
    /// is added to the pools its label selects and removed from any other
    /// pool still listing it. When no pool matches, all pools are rebuilt
    /// from the full node list.
    pub async fn reconcile_node(&self, name: &str) -> Result<(), ControllerError> {
        info!("Reconciling Node {}", name);

        let node = self.store.get_node(name).await?;
        let pools = self.store.list_node_pools().await?;

        let Some(node) = node else {
            return self.remove_from_listing_pools(name, pools).await;
        };

        let label = node_label_value(&node);
        let (matching, others): (Vec<NodePool>, Vec<NodePool>) =
            pools.into_iter().partition(|pool| pool_matches(pool, label));

        if matching.is_empty() {
            debug!("No NodePool selects Node {} (label {:?}), rescanning", name, label);
            return self.rescan(others).await;
        }

        for pool in matching {
            let mut nodes = pool.status_nodes().to_vec();
            if add_node_unique(&mut nodes, name) {
                self.persist_nodes(pool, nodes).await?;
            }
        }
        self.remove_from_listing_pools(name, others).await
    }

    async fn remove_from_listing_pools(&self, name: &str, pools: Vec<NodePool>) -> Result<(), ControllerError> {
        let mut removed = false;
        for pool in pools {
            let mut nodes = pool.status_nodes().to_vec();
            if remove_node(&mut nodes, name) {
                self.persist_nodes(pool, nodes).await?;
                removed = true;
            }
        }
        if !removed {
            debug!("No NodePool lists Node {}", name);
        }
        Ok(())
    }

    /// Recomputes every pool's membership from the current node list.
    async fn rescan(&self, pools: Vec<NodePool>) -> Result<(), ControllerError> {
        let nodes = self.store.list_nodes().await?;
        for pool in pools {
            let desired = matching_nodes(&pool, &nodes);
            if membership_changed(pool.status_nodes(), &desired) {
                self.persist_nodes(pool, desired).await?;
            }
        }
        Ok(())
    }
}
