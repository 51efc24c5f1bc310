//! Kubernetes-backed object store

use crate::error::StoreError;
use crate::store_trait::PoolStore;
use async_trait::async_trait;
use crds::NodePool;
use k8s_openapi::api::core::v1::{Namespace, Node};
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::Client;
use serde_json::json;
use tracing::debug;

/// [`PoolStore`] backed by the Kubernetes API server.
#[derive(Clone)]
pub struct KubePoolStore {
    client: Client,
}

impl KubePoolStore {
    /// Creates a store using the given Kubernetes client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn node_pools(&self, namespace: &str) -> Api<NodePool> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn pool_identity(pool: &NodePool) -> Result<(&str, &str), StoreError> {
        let name = pool.metadata.name.as_deref()
            .ok_or_else(|| StoreError::InvalidObject("NodePool missing name".to_string()))?;
        let namespace = pool.metadata.namespace.as_deref()
            .ok_or_else(|| StoreError::InvalidObject(format!("NodePool {} missing namespace", name)))?;
        Ok((namespace, name))
    }
}

impl std::fmt::Debug for KubePoolStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubePoolStore").finish_non_exhaustive()
    }
}

#[async_trait]
impl PoolStore for KubePoolStore {
    async fn get_namespace(&self, name: &str) -> Result<Option<Namespace>, StoreError> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        Ok(api.get_opt(name).await?)
    }

    async fn get_node(&self, name: &str) -> Result<Option<Node>, StoreError> {
        let api: Api<Node> = Api::all(self.client.clone());
        Ok(api.get_opt(name).await?)
    }

    async fn list_nodes(&self) -> Result<Vec<Node>, StoreError> {
        let api: Api<Node> = Api::all(self.client.clone());
        Ok(api.list(&ListParams::default()).await?.items)
    }

    async fn get_node_pool(&self, namespace: &str, name: &str) -> Result<Option<NodePool>, StoreError> {
        Ok(self.node_pools(namespace).get_opt(name).await?)
    }

    async fn list_node_pools(&self) -> Result<Vec<NodePool>, StoreError> {
        let api: Api<NodePool> = Api::all(self.client.clone());
        Ok(api.list(&ListParams::default()).await?.items)
    }

    async fn create_node_pool(&self, pool: &NodePool) -> Result<NodePool, StoreError> {
        let (namespace, name) = Self::pool_identity(pool)?;
        debug!("Creating NodePool {}/{}", namespace, name);
        Ok(self.node_pools(namespace).create(&PostParams::default(), pool).await?)
    }

    async fn replace_node_pool(&self, pool: &NodePool) -> Result<NodePool, StoreError> {
        let (namespace, name) = Self::pool_identity(pool)?;
        debug!("Replacing NodePool {}/{} at resourceVersion {:?}",
            namespace, name, pool.metadata.resource_version);
        Ok(self.node_pools(namespace).replace(name, &PostParams::default(), pool).await?)
    }

    async fn replace_node_pool_status(&self, pool: &NodePool) -> Result<NodePool, StoreError> {
        let (namespace, name) = Self::pool_identity(pool)?;
        let nodes = pool.status_nodes();

        // A merge patch carrying metadata.resourceVersion is rejected with 409
        // when the object has moved on. The node list is sent whole so an empty
        // list clears the stored one.
        let status_patch = match &pool.metadata.resource_version {
            Some(rv) => json!({
                "metadata": { "resourceVersion": rv },
                "status": { "nodes": nodes },
            }),
            None => json!({
                "status": { "nodes": nodes },
            }),
        };

        debug!("Patching NodePool {}/{} status: {} nodes", namespace, name, nodes.len());
        let pp = PatchParams::default();
        Ok(self.node_pools(namespace)
            .patch_status(name, &pp, &Patch::Merge(&status_patch))
            .await?)
    }

    async fn delete_node_pool(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        match self.node_pools(namespace).delete(name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(e) => match StoreError::from(e) {
                StoreError::NotFound(_) => {
                    debug!("NodePool {}/{} already gone", namespace, name);
                    Ok(())
                }
                other => Err(other),
            },
        }
    }
}
