use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use evalgrid_core::{EvalResult, GroupKey};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::component::Component;
use crate::node::{BuildKey, ComponentNode};
use crate::store::DiskStore;

/// Converts built components to and from bytes for the disk store.
///
/// Both methods default to "not persistable", in which case components are
/// only shared in memory.
pub trait ComponentCodec: Send + Sync {
    /// Serializes a built component.
    fn encode(&self, _node: &ComponentNode, _component: &Component) -> Option<Vec<u8>> {
        None
    }

    /// Restores a component from bytes written by [`ComponentCodec::encode`].
    fn decode(&self, _node: &ComponentNode, _bytes: &[u8]) -> Option<Component> {
        None
    }
}

/// Codec that persists nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct MemoryOnly;

impl ComponentCodec for MemoryOnly {}

/// Counters describing cache effectiveness.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Builder invocations.
    pub builds: u64,
    /// Requests served from memory.
    pub memory_hits: u64,
    /// Requests served from the disk store.
    pub disk_hits: u64,
    /// Entries written to the disk store.
    pub disk_writes: u64,
}

#[derive(Default)]
struct Counters {
    builds: AtomicU64,
    memory_hits: AtomicU64,
    disk_hits: AtomicU64,
    disk_writes: AtomicU64,
}

type Slot = Arc<Mutex<Option<Component>>>;

/// Memoizes built components per isolation group and build key.
///
/// Each (group, key) pair owns a slot lock. The first caller builds while
/// holding it; concurrent callers for the same pair block on the slot and
/// then reuse the result, so a builder runs at most once per pair. A failed
/// build leaves the slot empty.
pub struct ComponentCache {
    enabled: bool,
    store: Option<DiskStore>,
    slots: Mutex<HashMap<(GroupKey, BuildKey), Slot>>,
    counters: Counters,
}

impl ComponentCache {
    /// Creates an in-memory cache.
    pub fn new() -> Self {
        Self {
            enabled: true,
            store: None,
            slots: Mutex::new(HashMap::new()),
            counters: Counters::default(),
        }
    }

    /// Creates a pass-through cache that always invokes the builder.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::new()
        }
    }

    /// Creates a cache backed by a disk store. If the directory cannot be
    /// prepared the cache falls back to memory only.
    pub fn with_store(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let store = match DiskStore::open(&dir) {
            Ok(store) => Some(store),
            Err(err) => {
                warn!(dir = %dir.display(), error = %err, "component cache directory unusable");
                None
            }
        };
        Self {
            store,
            ..Self::new()
        }
    }

    /// Returns false for a pass-through cache.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Disk store, when configured.
    pub fn store(&self) -> Option<&DiskStore> {
        self.store.as_ref()
    }

    /// Returns the component cached for the key, building it on first use.
    pub fn build_or_reuse<F>(
        &self,
        group: &GroupKey,
        key: &BuildKey,
        builder: F,
    ) -> EvalResult<Component>
    where
        F: FnOnce() -> EvalResult<Component>,
    {
        if !self.enabled {
            return self.run_builder(builder);
        }
        self.get_or_init(group, key, || self.run_builder(builder))
    }

    /// Like [`ComponentCache::build_or_reuse`] for a graph node, additionally
    /// consulting and filling the disk store through the codec.
    pub fn build_node<F>(
        &self,
        group: &GroupKey,
        node: &ComponentNode,
        codec: &dyn ComponentCodec,
        builder: F,
    ) -> EvalResult<Component>
    where
        F: FnOnce() -> EvalResult<Component>,
    {
        if !self.enabled {
            return self.run_builder(builder);
        }
        self.get_or_init(group, node.key(), || {
            if let Some(component) = self.load_from_store(group, node, codec) {
                return Ok(component);
            }
            let component = self.run_builder(builder)?;
            self.save_to_store(group, node, codec, &component);
            Ok(component)
        })
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            builds: self.counters.builds.load(Ordering::Relaxed),
            memory_hits: self.counters.memory_hits.load(Ordering::Relaxed),
            disk_hits: self.counters.disk_hits.load(Ordering::Relaxed),
            disk_writes: self.counters.disk_writes.load(Ordering::Relaxed),
        }
    }

    /// Number of built components held in memory.
    pub fn len(&self) -> usize {
        let slots: Vec<Slot> = self.slots.lock().values().cloned().collect();
        slots.iter().filter(|slot| slot.lock().is_some()).count()
    }

    /// Returns true when nothing is held in memory.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get_or_init<F>(&self, group: &GroupKey, key: &BuildKey, init: F) -> EvalResult<Component>
    where
        F: FnOnce() -> EvalResult<Component>,
    {
        let slot = {
            let mut slots = self.slots.lock();
            Arc::clone(
                slots
                    .entry((group.clone(), key.clone()))
                    .or_insert_with(|| Arc::new(Mutex::new(None))),
            )
        };
        let mut guard = slot.lock();
        if let Some(component) = guard.as_ref() {
            self.counters.memory_hits.fetch_add(1, Ordering::Relaxed);
            debug!(group = %group, key = %key, "component cache hit");
            return Ok(component.clone());
        }
        let component = init()?;
        *guard = Some(component.clone());
        Ok(component)
    }

    fn run_builder<F>(&self, builder: F) -> EvalResult<Component>
    where
        F: FnOnce() -> EvalResult<Component>,
    {
        self.counters.builds.fetch_add(1, Ordering::Relaxed);
        builder()
    }

    fn load_from_store(
        &self,
        group: &GroupKey,
        node: &ComponentNode,
        codec: &dyn ComponentCodec,
    ) -> Option<Component> {
        let store = self.store.as_ref()?;
        let bytes = store.load(group, node)?;
        match codec.decode(node, &bytes) {
            Some(component) => {
                self.counters.disk_hits.fetch_add(1, Ordering::Relaxed);
                debug!(group = %group, key = %node.key(), "component loaded from disk cache");
                Some(component)
            }
            None => {
                warn!(group = %group, key = %node.key(), kind = node.kind(), "cached component could not be decoded, rebuilding");
                None
            }
        }
    }

    fn save_to_store(
        &self,
        group: &GroupKey,
        node: &ComponentNode,
        codec: &dyn ComponentCodec,
        component: &Component,
    ) {
        let Some(store) = self.store.as_ref() else {
            return;
        };
        let Some(bytes) = codec.encode(node, component) else {
            return;
        };
        match store.save(group, node, bytes) {
            Ok(()) => {
                self.counters.disk_writes.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => {
                warn!(group = %group, key = %node.key(), error = %err, "failed to persist component");
            }
        }
    }
}

impl Default for ComponentCache {
    fn default() -> Self {
        Self::new()
    }
}
