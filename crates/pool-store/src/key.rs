//! Object keys
//!
//! Reconcilers are handed a key, never an object: they re-read current state
//! from the store for every invocation.

use kube::Resource;
use std::fmt;

/// Identity of an object in the store.
///
/// Cluster-scoped kinds (nodes, namespaces) have no namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub namespace: Option<String>,
    pub name: String,
}

impl ObjectKey {
    /// Key of a cluster-scoped object.
    pub fn cluster(name: impl Into<String>) -> Self {
        Self {
            namespace: None,
            name: name.into(),
        }
    }

    /// Key of a namespaced object.
    pub fn namespaced(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            name: name.into(),
        }
    }

    /// Key of an object as seen by a watcher; `None` if it has no name.
    pub fn of<K: Resource>(obj: &K) -> Option<Self> {
        let name = obj.meta().name.clone()?;
        Some(Self {
            namespace: obj.meta().namespace.clone(),
            name,
        })
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}", ns, self.name),
            None => f.write_str(&self.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crds::NodePool;
    use k8s_openapi::api::core::v1::Node;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    #[test]
    fn test_display() {
        assert_eq!(ObjectKey::namespaced("team-a", "default").to_string(), "team-a/default");
        assert_eq!(ObjectKey::cluster("node-1").to_string(), "node-1");
    }

    #[test]
    fn test_of_namespaced_object() {
        let pool = NodePool::generate("default", "team-a");
        assert_eq!(ObjectKey::of(&pool), Some(ObjectKey::namespaced("team-a", "default")));
    }

    #[test]
    fn test_of_unnamed_object() {
        let node = Node {
            metadata: ObjectMeta::default(),
            ..Default::default()
        };
        assert_eq!(ObjectKey::of(&node), None);
    }
}
