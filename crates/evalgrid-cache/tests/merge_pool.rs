use std::sync::Arc;

use evalgrid_cache::{ComponentNode, MergePool};
use evalgrid_core::GroupKey;
use serde_json::json;

fn graph(neighbors: u32) -> Arc<ComponentNode> {
    let data = ComponentNode::new("ratings", json!({ "source": "train.csv" }));
    let normalizer = ComponentNode::new("baseline", json!({ "damping": 5 })).with_input(data);
    Arc::new(
        ComponentNode::new("item-knn", json!({ "neighbors": neighbors })).with_input(normalizer),
    )
}

#[test]
fn build_key_is_structural() {
    let a = ComponentNode::new("baseline", json!({ "damping": 5, "mode": "item" }));
    let b = ComponentNode::new("baseline", json!({ "mode": "item", "damping": 5 }));
    let c = ComponentNode::new("baseline", json!({ "damping": 6, "mode": "item" }));
    assert_eq!(a.key(), b.key());
    assert_ne!(a.key(), c.key());
    assert_eq!(a, b);
    assert_ne!(graph(10).key(), graph(20).key());
    assert_eq!(graph(10).key(), graph(10).key());
    assert_eq!(graph(10).node_count(), 3);
}

#[test]
fn private_nodes_never_merge_with_shared_ones() {
    let shared = ComponentNode::new("scorer", json!({}));
    let private = ComponentNode::new("scorer", json!({})).shareable(false);
    assert_ne!(shared.key(), private.key());
    assert_eq!(
        private.key(),
        ComponentNode::new("scorer", json!({})).shareable(false).key()
    );
    assert_eq!(
        shared.key(),
        ComponentNode::new("scorer", json!({})).shareable(true).key()
    );

    let pool = MergePool::new(GroupKey::new("G1"));
    let first = pool.merge(Arc::new(shared));
    let second = pool.merge(Arc::new(private));
    assert!(!Arc::ptr_eq(&first, &second));
    assert!(first.is_shareable());
    assert!(!second.is_shareable());
    assert_eq!(pool.len(), 2);
}

#[test]
fn parents_of_private_inputs_keep_their_own_identity() {
    let parent = |shareable: bool| {
        let scorer = ComponentNode::new("scorer", json!({})).shareable(shareable);
        Arc::new(ComponentNode::new("ranker", json!({ "depth": 10 })).with_input(scorer))
    };
    let pool = MergePool::new(GroupKey::new("G1"));
    let shared = pool.merge(parent(true));
    let private = pool.merge(parent(false));
    assert_ne!(shared.key(), private.key());
    assert!(!private.inputs()[0].is_shareable());
}

#[test]
fn merging_shares_common_subgraphs() {
    let pool = MergePool::new(GroupKey::new("G1"));
    let first = pool.merge(graph(10));
    let second = pool.merge(graph(20));
    assert_eq!(pool.len(), 4);
    assert!(Arc::ptr_eq(&first.inputs()[0], &second.inputs()[0]));
    assert!(Arc::ptr_eq(
        &first.inputs()[0].inputs()[0],
        &second.inputs()[0].inputs()[0]
    ));
    let again = pool.merge(graph(10));
    assert!(Arc::ptr_eq(&first, &again));
    assert_eq!(pool.group().as_str(), "G1");
}
