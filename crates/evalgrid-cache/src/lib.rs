#![deny(missing_docs)]
#![doc = "Structural component graphs, per-group merge pools and the shared component cache."]

/// The shared component cache.
pub mod cache;
/// Type-erased built components.
pub mod component;
/// Component graph nodes and build keys.
pub mod node;
/// Per-group canonical node pools.
pub mod pool;
/// On-disk component store.
pub mod store;

pub use cache::{CacheStats, ComponentCache, ComponentCodec, MemoryOnly};
pub use component::Component;
pub use node::{BuildKey, ComponentNode};
pub use pool::MergePool;
pub use store::DiskStore;
