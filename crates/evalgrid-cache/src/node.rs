use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use evalgrid_core::{canonical_value_string, digest_parts};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Structural signature of a component node: equal keys mean equal kind,
/// equal parameters and structurally equal inputs.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BuildKey(String);

impl BuildKey {
    /// Hexadecimal digest.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BuildKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One typed node of a buildable component graph.
///
/// Nodes compare and hash by [`BuildKey`], so two independently resolved
/// graphs with the same structure are interchangeable.
#[derive(Debug, Clone)]
pub struct ComponentNode {
    kind: String,
    params: Value,
    inputs: Vec<Arc<ComponentNode>>,
    shareable: bool,
    key: BuildKey,
}

impl ComponentNode {
    /// Creates a shareable leaf node.
    pub fn new(kind: impl Into<String>, params: Value) -> Self {
        let mut node = Self {
            kind: kind.into(),
            params,
            inputs: Vec::new(),
            shareable: true,
            key: BuildKey(String::new()),
        };
        node.key = node.compute_key();
        node
    }

    /// Appends an input dependency.
    pub fn with_input(mut self, input: impl Into<Arc<ComponentNode>>) -> Self {
        self.inputs.push(input.into());
        self.key = self.compute_key();
        self
    }

    /// Marks whether the built instance may be cached and shared between jobs.
    /// Nodes that are not shareable are rebuilt by every job, and never merge
    /// with a shareable node of the same structure.
    pub fn shareable(mut self, shareable: bool) -> Self {
        self.shareable = shareable;
        self.key = self.compute_key();
        self
    }

    /// Component kind understood by the resolver.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Construction parameters.
    pub fn params(&self) -> &Value {
        &self.params
    }

    /// Input dependencies in declaration order.
    pub fn inputs(&self) -> &[Arc<ComponentNode>] {
        &self.inputs
    }

    /// Whether the built instance may be cached.
    pub fn is_shareable(&self) -> bool {
        self.shareable
    }

    /// Structural build key.
    pub fn key(&self) -> &BuildKey {
        &self.key
    }

    /// Number of distinct nodes reachable from this one, itself included.
    pub fn node_count(&self) -> usize {
        let mut seen = std::collections::HashSet::new();
        self.collect_keys(&mut seen);
        seen.len()
    }

    pub(crate) fn with_inputs(&self, inputs: Vec<Arc<ComponentNode>>) -> Self {
        Self {
            kind: self.kind.clone(),
            params: self.params.clone(),
            inputs,
            shareable: self.shareable,
            key: self.key.clone(),
        }
    }

    fn collect_keys<'a>(&'a self, seen: &mut std::collections::HashSet<&'a BuildKey>) {
        if seen.insert(&self.key) {
            for input in &self.inputs {
                input.collect_keys(seen);
            }
        }
    }

    fn compute_key(&self) -> BuildKey {
        let params = canonical_value_string(&self.params);
        let mut parts: Vec<&[u8]> = vec![self.kind.as_bytes(), params.as_bytes()];
        parts.extend(self.inputs.iter().map(|input| input.key.0.as_bytes()));
        if !self.shareable {
            parts.push(b"private");
        }
        BuildKey(digest_parts(&parts))
    }
}

impl PartialEq for ComponentNode {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for ComponentNode {}

impl Hash for ComponentNode {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}
