use std::collections::HashMap;
use std::sync::Arc;

use evalgrid_core::GroupKey;
use parking_lot::Mutex;

use crate::node::{BuildKey, ComponentNode};

/// Canonical node pool for one isolation group.
///
/// Merging a graph replaces every node by the first structurally equal node
/// the pool has seen, so jobs in the group end up sharing one node instance
/// per distinct sub-component.
#[derive(Debug)]
pub struct MergePool {
    group: GroupKey,
    nodes: Mutex<HashMap<BuildKey, Arc<ComponentNode>>>,
}

impl MergePool {
    /// Creates an empty pool for the group.
    pub fn new(group: GroupKey) -> Self {
        Self {
            group,
            nodes: Mutex::new(HashMap::new()),
        }
    }

    /// Group the pool belongs to.
    pub fn group(&self) -> &GroupKey {
        &self.group
    }

    /// Interns the graph bottom-up and returns its canonical root.
    pub fn merge(&self, root: Arc<ComponentNode>) -> Arc<ComponentNode> {
        let mut nodes = self.nodes.lock();
        intern(&mut nodes, root)
    }

    /// Number of distinct nodes interned so far.
    pub fn len(&self) -> usize {
        self.nodes.lock().len()
    }

    /// Returns true when nothing was merged yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn intern(
    nodes: &mut HashMap<BuildKey, Arc<ComponentNode>>,
    node: Arc<ComponentNode>,
) -> Arc<ComponentNode> {
    if let Some(existing) = nodes.get(node.key()) {
        return Arc::clone(existing);
    }
    let inputs: Vec<_> = node
        .inputs()
        .iter()
        .map(|input| intern(nodes, Arc::clone(input)))
        .collect();
    let unchanged = inputs
        .iter()
        .zip(node.inputs())
        .all(|(merged, original)| Arc::ptr_eq(merged, original));
    let canonical = if unchanged {
        node
    } else {
        Arc::new(node.with_inputs(inputs))
    };
    nodes.insert(canonical.key().clone(), Arc::clone(&canonical));
    canonical
}
