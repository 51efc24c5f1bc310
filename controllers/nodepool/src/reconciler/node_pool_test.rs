//! Unit tests for the NodePool reconciler

#[cfg(test)]
mod tests {
    use crate::test_utils::*;
    use crds::{default_node_selector, NodePool, DEFAULT_NODE_POOL_NAME};
    use pool_store::{MockPoolStore, ObjectKey, StoreWrite};
    use std::collections::BTreeMap;

    fn store_with_nodes() -> MockPoolStore {
        let store = MockPoolStore::new();
        store.add_namespace("team-a");
        store.add_node(create_test_node("node-c", Some("team-a")));
        store.add_node(create_test_node("node-a", Some("team-a")));
        store.add_node(create_test_node("node-b", Some("team-b")));
        store.add_node(create_test_node("node-d", None));
        store
    }

    #[tokio::test]
    async fn test_membership_converges_to_sorted_matching_set() {
        let store = store_with_nodes();
        store.add_node_pool(create_test_node_pool(DEFAULT_NODE_POOL_NAME, "team-a", &[]));
        let reconciler = create_test_reconciler(&store);

        reconciler.reconcile_node_pool("team-a", DEFAULT_NODE_POOL_NAME).await.unwrap();

        let pool = store.node_pool("team-a", DEFAULT_NODE_POOL_NAME).unwrap();
        assert_eq!(status_nodes(&pool), vec!["node-a".to_string(), "node-c".to_string()]);
    }

    #[tokio::test]
    async fn test_second_run_performs_no_write() {
        let store = store_with_nodes();
        store.add_node_pool(create_test_node_pool(DEFAULT_NODE_POOL_NAME, "team-a", &["node-b"]));
        let reconciler = create_test_reconciler(&store);

        reconciler.reconcile_node_pool("team-a", DEFAULT_NODE_POOL_NAME).await.unwrap();
        assert_eq!(store.writes().len(), 1);

        store.clear_writes();
        reconciler.reconcile_node_pool("team-a", DEFAULT_NODE_POOL_NAME).await.unwrap();
        assert!(store.writes().is_empty());
    }

    #[tokio::test]
    async fn test_reordered_status_is_rewritten() {
        let store = store_with_nodes();
        store.add_node_pool(create_test_node_pool(DEFAULT_NODE_POOL_NAME, "team-a", &["node-c", "node-a"]));
        let reconciler = create_test_reconciler(&store);

        reconciler.reconcile_node_pool("team-a", DEFAULT_NODE_POOL_NAME).await.unwrap();

        let pool = store.node_pool("team-a", DEFAULT_NODE_POOL_NAME).unwrap();
        assert_eq!(status_nodes(&pool), vec!["node-a".to_string(), "node-c".to_string()]);
        assert_eq!(store.writes().len(), 1);
    }

    #[tokio::test]
    async fn test_drifted_selector_is_reverted() {
        let store = store_with_nodes();
        let mut pool = create_test_node_pool(DEFAULT_NODE_POOL_NAME, "team-a", &["node-a", "node-c"]);
        pool.spec.node_selector = BTreeMap::from([("nodepool".to_string(), "team-b".to_string())]);
        store.add_node_pool(pool);
        let reconciler = create_test_reconciler(&store);

        reconciler.reconcile_node_pool("team-a", DEFAULT_NODE_POOL_NAME).await.unwrap();

        let pool = store.node_pool("team-a", DEFAULT_NODE_POOL_NAME).unwrap();
        assert_eq!(pool.spec.node_selector, default_node_selector("team-a"));
        // Membership was already right for the healed selector
        assert_eq!(
            store.writes(),
            vec![StoreWrite::Replace(ObjectKey::namespaced("team-a", DEFAULT_NODE_POOL_NAME))]
        );
    }

    #[tokio::test]
    async fn test_non_default_pool_selector_is_healed_too() {
        let store = store_with_nodes();
        let mut pool = create_test_node_pool("extra", "team-a", &[]);
        pool.spec.node_selector.clear();
        store.add_node_pool(pool);
        let reconciler = create_test_reconciler(&store);

        reconciler.reconcile_node_pool("team-a", "extra").await.unwrap();

        let pool = store.node_pool("team-a", "extra").unwrap();
        assert_eq!(pool.selector_value(), Some("team-a"));
        assert_eq!(status_nodes(&pool), vec!["node-a".to_string(), "node-c".to_string()]);
    }

    #[tokio::test]
    async fn test_deleted_default_pool_is_recreated() {
        let store = store_with_nodes();
        let reconciler = create_test_reconciler(&store);

        reconciler.reconcile_node_pool("team-a", DEFAULT_NODE_POOL_NAME).await.unwrap();

        let pool = store.node_pool("team-a", DEFAULT_NODE_POOL_NAME).expect("pool should be re-created");
        assert_eq!(pool.selector_value(), Some("team-a"));
        assert_eq!(status_nodes(&pool), vec!["node-a".to_string(), "node-c".to_string()]);
    }

    #[tokio::test]
    async fn test_recreated_pool_without_members_gets_empty_status() {
        let store = MockPoolStore::new();
        store.add_namespace("team-a");
        let reconciler = create_test_reconciler(&store);

        reconciler.reconcile_node_pool("team-a", DEFAULT_NODE_POOL_NAME).await.unwrap();

        let pool = store.node_pool("team-a", DEFAULT_NODE_POOL_NAME).unwrap();
        assert!(pool.status.is_some());
        assert!(pool.status_nodes().is_empty());
    }

    #[tokio::test]
    async fn test_default_pool_not_recreated_in_deleted_namespace() {
        let store = store_with_nodes();
        store.remove_namespace("team-a");
        let reconciler = create_test_reconciler(&store);

        reconciler.reconcile_node_pool("team-a", DEFAULT_NODE_POOL_NAME).await.unwrap();

        assert_eq!(store.node_pool_count(), 0);
    }

    #[tokio::test]
    async fn test_default_pool_not_recreated_in_terminating_namespace() {
        let store = store_with_nodes();
        store.mark_namespace_terminating("team-a");
        let reconciler = create_test_reconciler(&store);

        reconciler.reconcile_node_pool("team-a", DEFAULT_NODE_POOL_NAME).await.unwrap();

        assert!(store.writes().is_empty());
        assert_eq!(store.node_pool_count(), 0);
    }

    #[tokio::test]
    async fn test_pool_without_status_gets_status_written() {
        // Created, but the follow-up status write never landed
        let store = MockPoolStore::new();
        store.add_namespace("team-a");
        store.add_node_pool(NodePool::generate(DEFAULT_NODE_POOL_NAME, "team-a"));
        let reconciler = create_test_reconciler(&store);

        reconciler.reconcile_namespace("team-a").await.unwrap();
        reconciler.reconcile_node_pool("team-a", DEFAULT_NODE_POOL_NAME).await.unwrap();

        let pool = store.node_pool("team-a", DEFAULT_NODE_POOL_NAME).unwrap();
        assert_eq!(pool.status.as_ref().map(|s| s.nodes.len()), Some(0));
        assert_eq!(
            store.writes(),
            vec![StoreWrite::ReplaceStatus(ObjectKey::namespaced("team-a", DEFAULT_NODE_POOL_NAME))]
        );

        store.clear_writes();
        reconciler.reconcile_node_pool("team-a", DEFAULT_NODE_POOL_NAME).await.unwrap();
        assert!(store.writes().is_empty());
    }

    #[tokio::test]
    async fn test_deleted_non_default_pool_stays_deleted() {
        let store = store_with_nodes();
        let reconciler = create_test_reconciler(&store);

        reconciler.reconcile_node_pool("team-a", "extra").await.unwrap();

        assert!(store.writes().is_empty());
        assert_eq!(store.node_pool_count(), 0);
    }

    #[tokio::test]
    async fn test_pool_in_excluded_namespace_is_deleted() {
        let store = store_with_nodes();
        store.add_namespace("kube-system");
        store.add_node_pool(create_test_node_pool(DEFAULT_NODE_POOL_NAME, "kube-system", &[]));
        store.add_node_pool(create_test_node_pool("extra", "kube-system", &[]));
        let reconciler = create_test_reconciler(&store);

        reconciler.reconcile_node_pool("kube-system", DEFAULT_NODE_POOL_NAME).await.unwrap();
        reconciler.reconcile_node_pool("kube-system", "extra").await.unwrap();
        // Deleted pools in excluded namespaces are not re-created
        reconciler.reconcile_node_pool("kube-system", DEFAULT_NODE_POOL_NAME).await.unwrap();

        assert_eq!(store.node_pool_count(), 0);
        assert_eq!(store.writes().len(), 2);
    }

    #[tokio::test]
    async fn test_stale_write_surfaces_conflict() {
        let store = store_with_nodes();
        store.add_node_pool(create_test_node_pool(DEFAULT_NODE_POOL_NAME, "team-a", &[]));
        let reconciler = create_test_reconciler(&store);

        store.conflict_on_next_write();
        let err = reconciler.reconcile_node_pool("team-a", DEFAULT_NODE_POOL_NAME).await.unwrap_err();
        assert!(err.is_conflict());
        assert!(store.node_pool("team-a", DEFAULT_NODE_POOL_NAME).unwrap().status_nodes().is_empty());

        reconciler.reconcile_node_pool("team-a", DEFAULT_NODE_POOL_NAME).await.unwrap();
        assert_eq!(store.node_pool("team-a", DEFAULT_NODE_POOL_NAME).unwrap().status_nodes().len(), 2);
    }
}
