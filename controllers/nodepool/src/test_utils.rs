//! Test utilities for unit testing reconcilers
//!
//! This module provides helpers for creating test data and setting up test scenarios.

#[cfg(test)]
use crate::config::ExclusionSet;
#[cfg(test)]
use crate::reconciler::Reconciler;
#[cfg(test)]
use crds::{NodePool, NodePoolStatus, NODE_POOL_LABEL_KEY};
#[cfg(test)]
use k8s_openapi::api::core::v1::Node;
#[cfg(test)]
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
#[cfg(test)]
use pool_store::MockPoolStore;
#[cfg(test)]
use std::collections::BTreeMap;
#[cfg(test)]
use std::sync::Arc;

/// Helper to create a test Node, optionally carrying the membership label
#[cfg(test)]
pub fn create_test_node(name: &str, pool_label: Option<&str>) -> Node {
    Node {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: pool_label.map(|value| {
                BTreeMap::from([(NODE_POOL_LABEL_KEY.to_string(), value.to_string())])
            }),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Helper to create a generated NodePool with the given status nodes
#[cfg(test)]
pub fn create_test_node_pool(name: &str, namespace: &str, nodes: &[&str]) -> NodePool {
    let mut pool = NodePool::generate(name, namespace);
    pool.status = Some(NodePoolStatus {
        nodes: nodes.iter().map(|n| n.to_string()).collect(),
    });
    pool
}

/// Owned copy of a pool's status nodes, for assertions
#[cfg(test)]
pub fn status_nodes(pool: &NodePool) -> Vec<String> {
    pool.status_nodes().to_vec()
}

/// Helper to create a Reconciler over a mock store excluding `kube-system`
#[cfg(test)]
pub fn create_test_reconciler(store: &MockPoolStore) -> Reconciler {
    Reconciler::new(
        Arc::new(store.clone()),
        Arc::new(ExclusionSet::new(["kube-system"])),
    )
}
