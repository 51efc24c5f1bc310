//! Pool membership helpers
//!
//! Pure functions over node lists and pool status. A node belongs to a pool
//! when its `nodepool` label value equals the pool's selector value; pool
//! status keeps member names sorted and unique.

use crds::{NodePool, NODE_POOL_LABEL_KEY};
use k8s_openapi::api::core::v1::Node;

/// Value of the node's membership label, `None` when unaffiliated.
pub fn node_label_value(node: &Node) -> Option<&str> {
    node.metadata
        .labels
        .as_ref()
        .and_then(|labels| labels.get(NODE_POOL_LABEL_KEY))
        .map(String::as_str)
}

/// Whether a node with membership label `label_value` belongs to `pool`.
///
/// A pool without a selector value matches no node, and neither does an
/// unlabeled node.
pub fn pool_matches(pool: &NodePool, label_value: Option<&str>) -> bool {
    match (pool.selector_value(), label_value) {
        (Some(selector), Some(value)) => selector == value,
        _ => false,
    }
}

/// Inserts `name` keeping the list sorted. Returns false if already present.
pub fn add_node_unique(nodes: &mut Vec<String>, name: &str) -> bool {
    if nodes.iter().any(|n| n == name) {
        return false;
    }
    nodes.push(name.to_string());
    nodes.sort();
    true
}

/// Removes every occurrence of `name`. Returns false if it was not listed.
pub fn remove_node(nodes: &mut Vec<String>, name: &str) -> bool {
    let before = nodes.len();
    nodes.retain(|n| n != name);
    nodes.len() != before
}

/// Sorted, deduplicated names of the nodes that belong to `pool`.
pub fn matching_nodes(pool: &NodePool, nodes: &[Node]) -> Vec<String> {
    let mut names: Vec<String> = nodes
        .iter()
        .filter(|node| pool_matches(pool, node_label_value(node)))
        .filter_map(|node| node.metadata.name.clone())
        .collect();
    names.sort();
    names.dedup();
    names
}

/// Positional comparison: a reordering alone counts as a change.
pub fn membership_changed(current: &[String], desired: &[String]) -> bool {
    current.len() != desired.len() || current.iter().zip(desired).any(|(c, d)| c != d)
}
