//! NodePool CRD
//!
//! Groups cluster nodes per namespace. Pool membership is expressed by the
//! `nodepool` label on nodes; the controller records the matching node names
//! in the pool status and the admission webhook pins pods to them.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Name of the pool the controller manages in every namespace.
pub const DEFAULT_NODE_POOL_NAME: &str = "default";

/// Node (and pod node-selector) label carrying pool affiliation.
pub const NODE_POOL_LABEL_KEY: &str = "nodepool";

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[kube(
    group = "nodes.sunkai.xyz",
    version = "v1",
    kind = "NodePool",
    namespaced,
    status = "NodePoolStatus",
    printcolumn = r#"{"name":"NodeSelector","type":"string","jsonPath":".spec.nodeSelector"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct NodePoolSpec {
    /// Labels a node must carry to belong to this pool.
    ///
    /// The controller keeps this at `{nodepool: <namespace>}`; any other
    /// value is reverted on the next reconciliation.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub node_selector: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NodePoolStatus {
    /// Names of all nodes in the pool, sorted and unique
    #[serde(default)]
    pub nodes: Vec<String>,
}

/// Generates the node selector every managed pool in `namespace` must carry.
///
/// Also injected into pods by the admission webhook.
pub fn default_node_selector(namespace: &str) -> BTreeMap<String, String> {
    BTreeMap::from([(NODE_POOL_LABEL_KEY.to_string(), namespace.to_string())])
}

impl NodePool {
    /// Builds the pool object the controller expects at `namespace/name`.
    pub fn generate(name: &str, namespace: &str) -> Self {
        NodePool {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            spec: NodePoolSpec {
                node_selector: default_node_selector(namespace),
            },
            status: None,
        }
    }

    /// Value of the membership label this pool selects on, if any.
    pub fn selector_value(&self) -> Option<&str> {
        self.spec
            .node_selector
            .get(NODE_POOL_LABEL_KEY)
            .map(String::as_str)
    }

    /// Node names currently recorded in status.
    pub fn status_nodes(&self) -> &[String] {
        self.status.as_ref().map(|s| s.nodes.as_slice()).unwrap_or(&[])
    }
}
