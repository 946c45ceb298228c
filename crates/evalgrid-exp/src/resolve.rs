use evalgrid_cache::{Component, ComponentCodec, ComponentNode};
use evalgrid_core::{AlgorithmVariant, DataCondition, EvalResult};

/// Turns algorithm descriptors into component graphs and graph nodes into
/// built instances.
///
/// The encode/decode hooks inherited from [`ComponentCodec`] are only used
/// when a cache directory is configured.
pub trait ConfigResolver: ComponentCodec {
    /// Resolves the algorithm's descriptor for a data condition into the root
    /// of its component graph. The graph must capture everything a component
    /// depends on, data included, since the build key is derived from it.
    fn resolve(
        &self,
        algorithm: &AlgorithmVariant,
        condition: &DataCondition,
    ) -> EvalResult<ComponentNode>;

    /// Builds one node from its already built inputs, given in the order of
    /// [`ComponentNode::inputs`].
    fn instantiate(&self, node: &ComponentNode, inputs: &[Component]) -> EvalResult<Component>;
}

/// Exposes a resolver's codec hooks as a plain [`ComponentCodec`].
pub(crate) struct ResolverCodec<'a>(pub(crate) &'a dyn ConfigResolver);

impl ComponentCodec for ResolverCodec<'_> {
    fn encode(&self, node: &ComponentNode, component: &Component) -> Option<Vec<u8>> {
        self.0.encode(node, component)
    }

    fn decode(&self, node: &ComponentNode, bytes: &[u8]) -> Option<Component> {
        self.0.decode(node, bytes)
    }
}
