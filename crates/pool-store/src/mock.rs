//! Mock PoolStore for unit testing
//!
//! Stores namespaces, nodes and node pools in memory and follows the API
//! server's write semantics closely enough for reconciler tests:
//! - every write bumps a `resourceVersion`, and writes carrying a stale one
//!   fail with `Conflict`;
//! - create drops status, spec writes keep status, status writes keep spec;
//! - all writes are recorded so tests can assert how many happened.

use crate::error::StoreError;
use crate::key::ObjectKey;
use crate::store_trait::PoolStore;
use async_trait::async_trait;
use crds::NodePool;
use k8s_openapi::api::core::v1::{Namespace, Node};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

/// A write performed against the mock store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreWrite {
    Create(ObjectKey),
    Replace(ObjectKey),
    ReplaceStatus(ObjectKey),
    Delete(ObjectKey),
}

/// Mock PoolStore for testing
#[derive(Clone, Default)]
pub struct MockPoolStore {
    pub(crate) namespaces: Arc<Mutex<BTreeMap<String, Namespace>>>,
    pub(crate) nodes: Arc<Mutex<BTreeMap<String, Node>>>,
    pub(crate) node_pools: Arc<Mutex<BTreeMap<(String, String), NodePool>>>,
    pub(crate) writes: Arc<Mutex<Vec<StoreWrite>>>,
    // Counter for generating resource versions
    pub(crate) next_version: Arc<Mutex<u64>>,
    // Failure injection
    pub(crate) unavailable: Arc<Mutex<bool>>,
    pub(crate) conflict_next_write: Arc<Mutex<bool>>,
}

impl std::fmt::Debug for MockPoolStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockPoolStore")
            .field("node_pools", &self.node_pools.lock().unwrap().len())
            .field("nodes", &self.nodes.lock().unwrap().len())
            .finish_non_exhaustive()
    }
}

impl MockPoolStore {
    /// Create an empty mock store
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a namespace (for test setup)
    pub fn add_namespace(&self, name: &str) {
        let ns = Namespace {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        self.namespaces.lock().unwrap().insert(name.to_string(), ns);
    }

    /// Give an existing namespace a deletion timestamp, as while it terminates
    pub fn mark_namespace_terminating(&self, name: &str) {
        if let Some(ns) = self.namespaces.lock().unwrap().get_mut(name) {
            ns.metadata.deletion_timestamp =
                serde_json::from_value(serde_json::json!("2024-01-01T00:00:00Z")).ok();
        }
    }

    /// Remove a namespace (for test setup)
    pub fn remove_namespace(&self, name: &str) {
        self.namespaces.lock().unwrap().remove(name);
    }

    /// Add or overwrite a node (for test setup)
    pub fn add_node(&self, node: Node) {
        let name = node.metadata.name.clone().unwrap_or_default();
        self.nodes.lock().unwrap().insert(name, node);
    }

    /// Remove a node (for test setup)
    pub fn remove_node(&self, name: &str) {
        self.nodes.lock().unwrap().remove(name);
    }

    /// Add or overwrite a node pool as an external client would, including
    /// its status (for test setup). Returns the stored object.
    pub fn add_node_pool(&self, mut pool: NodePool) -> NodePool {
        let key = (
            pool.metadata.namespace.clone().unwrap_or_default(),
            pool.metadata.name.clone().unwrap_or_default(),
        );
        pool.metadata.resource_version = Some(self.next_version());
        self.node_pools.lock().unwrap().insert(key, pool.clone());
        pool
    }

    /// Current stored node pool, if any
    pub fn node_pool(&self, namespace: &str, name: &str) -> Option<NodePool> {
        self.node_pools
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Number of stored node pools
    pub fn node_pool_count(&self) -> usize {
        self.node_pools.lock().unwrap().len()
    }

    /// All writes performed through the [`PoolStore`] trait so far
    pub fn writes(&self) -> Vec<StoreWrite> {
        self.writes.lock().unwrap().clone()
    }

    /// Forget recorded writes
    pub fn clear_writes(&self) {
        self.writes.lock().unwrap().clear();
    }

    /// Make every operation fail with `Unavailable` until reset
    pub fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.lock().unwrap() = unavailable;
    }

    /// Make the next write fail with `Conflict`, as if a concurrent writer won
    pub fn conflict_on_next_write(&self) {
        *self.conflict_next_write.lock().unwrap() = true;
    }

    fn next_version(&self) -> String {
        let mut version = self.next_version.lock().unwrap();
        *version += 1;
        version.to_string()
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if *self.unavailable.lock().unwrap() {
            return Err(StoreError::Unavailable("mock store unavailable".to_string()));
        }
        Ok(())
    }

    fn check_injected_conflict(&self) -> Result<(), StoreError> {
        let mut conflict = self.conflict_next_write.lock().unwrap();
        if *conflict {
            *conflict = false;
            return Err(StoreError::Conflict("injected conflict".to_string()));
        }
        Ok(())
    }

    fn pool_identity(pool: &NodePool) -> Result<(String, String), StoreError> {
        let name = pool.metadata.name.clone()
            .ok_or_else(|| StoreError::InvalidObject("NodePool missing name".to_string()))?;
        let namespace = pool.metadata.namespace.clone()
            .ok_or_else(|| StoreError::InvalidObject(format!("NodePool {} missing namespace", name)))?;
        Ok((namespace, name))
    }

    /// Shared prologue of spec and status writes: availability, injected
    /// conflicts, existence and resourceVersion precondition.
    fn stored_for_write(&self, pool: &NodePool) -> Result<((String, String), NodePool), StoreError> {
        self.check_available()?;
        self.check_injected_conflict()?;
        let key = Self::pool_identity(pool)?;
        let stored = self.node_pools
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("NodePool {}/{} not found", key.0, key.1)))?;
        if let Some(rv) = &pool.metadata.resource_version {
            if stored.metadata.resource_version.as_ref() != Some(rv) {
                return Err(StoreError::Conflict(format!(
                    "NodePool {}/{} has been modified (have {}, stored {:?})",
                    key.0, key.1, rv, stored.metadata.resource_version
                )));
            }
        }
        Ok((key, stored))
    }

    fn record(&self, write: StoreWrite) {
        self.writes.lock().unwrap().push(write);
    }
}

#[async_trait]
impl PoolStore for MockPoolStore {
    async fn get_namespace(&self, name: &str) -> Result<Option<Namespace>, StoreError> {
        self.check_available()?;
        Ok(self.namespaces.lock().unwrap().get(name).cloned())
    }

    async fn get_node(&self, name: &str) -> Result<Option<Node>, StoreError> {
        self.check_available()?;
        Ok(self.nodes.lock().unwrap().get(name).cloned())
    }

    async fn list_nodes(&self) -> Result<Vec<Node>, StoreError> {
        self.check_available()?;
        Ok(self.nodes.lock().unwrap().values().cloned().collect())
    }

    async fn get_node_pool(&self, namespace: &str, name: &str) -> Result<Option<NodePool>, StoreError> {
        self.check_available()?;
        Ok(self.node_pool(namespace, name))
    }

    async fn list_node_pools(&self) -> Result<Vec<NodePool>, StoreError> {
        self.check_available()?;
        Ok(self.node_pools.lock().unwrap().values().cloned().collect())
    }

    async fn create_node_pool(&self, pool: &NodePool) -> Result<NodePool, StoreError> {
        self.check_available()?;
        self.check_injected_conflict()?;
        let key = Self::pool_identity(pool)?;
        if self.node_pools.lock().unwrap().contains_key(&key) {
            return Err(StoreError::Conflict(format!("NodePool {}/{} already exists", key.0, key.1)));
        }

        let mut created = pool.clone();
        created.status = None;
        created.metadata.resource_version = Some(self.next_version());
        self.node_pools.lock().unwrap().insert(key.clone(), created.clone());
        self.record(StoreWrite::Create(ObjectKey::namespaced(key.0, key.1)));
        Ok(created)
    }

    async fn replace_node_pool(&self, pool: &NodePool) -> Result<NodePool, StoreError> {
        let (key, stored) = self.stored_for_write(pool)?;
        let mut updated = pool.clone();
        updated.status = stored.status;
        updated.metadata.resource_version = Some(self.next_version());
        self.node_pools.lock().unwrap().insert(key.clone(), updated.clone());
        self.record(StoreWrite::Replace(ObjectKey::namespaced(key.0, key.1)));
        Ok(updated)
    }

    async fn replace_node_pool_status(&self, pool: &NodePool) -> Result<NodePool, StoreError> {
        let (key, mut stored) = self.stored_for_write(pool)?;
        stored.status = pool.status.clone();
        stored.metadata.resource_version = Some(self.next_version());
        self.node_pools.lock().unwrap().insert(key.clone(), stored.clone());
        self.record(StoreWrite::ReplaceStatus(ObjectKey::namespaced(key.0, key.1)));
        Ok(stored)
    }

    async fn delete_node_pool(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        self.check_available()?;
        self.check_injected_conflict()?;
        let removed = self.node_pools
            .lock()
            .unwrap()
            .remove(&(namespace.to_string(), name.to_string()));
        if removed.is_some() {
            self.record(StoreWrite::Delete(ObjectKey::namespaced(namespace, name)));
        }
        Ok(())
    }
}
