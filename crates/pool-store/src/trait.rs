//! PoolStore trait for mocking
//!
//! This trait abstracts the object store so reconcilers can be unit tested
//! against an in-memory implementation instead of a live cluster.

use crate::error::StoreError;
use async_trait::async_trait;
use crds::NodePool;
use k8s_openapi::api::core::v1::{Namespace, Node};

/// Object store operations used by the NodePool reconcilers
///
/// `get_*` methods map "not found" to `Ok(None)`; every other failure is an
/// error the caller should propagate for redelivery.
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait]
pub trait PoolStore: Send + Sync {
    // Namespaces (read-only)
    async fn get_namespace(&self, name: &str) -> Result<Option<Namespace>, StoreError>;

    // Nodes (read-only)
    async fn get_node(&self, name: &str) -> Result<Option<Node>, StoreError>;
    async fn list_nodes(&self) -> Result<Vec<Node>, StoreError>;

    // NodePools
    async fn get_node_pool(&self, namespace: &str, name: &str) -> Result<Option<NodePool>, StoreError>;
    async fn list_node_pools(&self) -> Result<Vec<NodePool>, StoreError>;

    /// Creates the pool. Status is not persisted by a create; follow up with
    /// [`PoolStore::replace_node_pool_status`].
    async fn create_node_pool(&self, pool: &NodePool) -> Result<NodePool, StoreError>;

    /// Replaces metadata and spec. Fails with `Conflict` when the pool's
    /// `resourceVersion` is stale.
    async fn replace_node_pool(&self, pool: &NodePool) -> Result<NodePool, StoreError>;

    /// Replaces the status subresource. Fails with `Conflict` when the pool's
    /// `resourceVersion` is stale.
    async fn replace_node_pool_status(&self, pool: &NodePool) -> Result<NodePool, StoreError>;

    /// Deletes the pool. Deleting an absent pool succeeds.
    async fn delete_node_pool(&self, namespace: &str, name: &str) -> Result<(), StoreError>;
}
