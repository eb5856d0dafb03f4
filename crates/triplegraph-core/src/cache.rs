//! Identity Cache
//!
//! Bounded LRU map from resource identity to node handle, consulted before
//! the store's identity lookup. Cleared after every flush so handles never
//! outlive the transaction that produced them.
//!
//! Thread-safe via interior mutability using parking_lot::Mutex.

use crate::error::ImportError;
use crate::model::ResourceIdentity;
use crate::store::{GraphStore, NodeId};
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use tracing::trace;

/// Cache metrics for monitoring
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheMetrics {
    /// Lookups answered from the cache
    pub hits: u64,
    /// Lookups that went to the store
    pub misses: u64,
    /// Entries pushed out by capacity
    pub evictions: u64,
    /// Nodes created on a miss
    pub created: u64,
}

impl CacheMetrics {
    /// Get hit rate as a fraction (0.0 - 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_eviction(&mut self) {
        self.evictions += 1;
    }
}

/// Outcome of [`IdentityCache::find_or_create`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Found(NodeId),
    Created(NodeId),
}

impl Resolution {
    pub fn node(self) -> NodeId {
        match self {
            Resolution::Found(id) | Resolution::Created(id) => id,
        }
    }
}

struct CacheState {
    entries: LruCache<ResourceIdentity, NodeId>,
    metrics: CacheMetrics,
}

impl CacheState {
    fn insert(&mut self, identity: &ResourceIdentity, node: NodeId) {
        if let Some((evicted, _)) = self.entries.push(identity.clone(), node) {
            if &evicted != identity {
                self.metrics.record_eviction();
            }
        }
    }
}

/// LRU identity-to-node cache.
pub struct IdentityCache {
    state: Mutex<CacheState>,
}

impl IdentityCache {
    /// Create a cache holding at most `capacity` identities (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            state: Mutex::new(CacheState {
                entries: LruCache::new(capacity),
                metrics: CacheMetrics::default(),
            }),
        }
    }

    /// Find the node for `identity` without creating it.
    ///
    /// More than one matching node is an error. Misses are not cached.
    pub fn find<S: GraphStore + ?Sized>(
        &self,
        store: &S,
        identity: &ResourceIdentity,
    ) -> Result<Option<NodeId>, ImportError> {
        let mut state = self.state.lock();
        if let Some(&node) = state.entries.get(identity) {
            state.metrics.record_hit();
            return Ok(Some(node));
        }
        state.metrics.record_miss();

        let node = match store.find_nodes(identity)?.as_slice() {
            [] => return Ok(None),
            [node] => *node,
            many => {
                return Err(ImportError::AmbiguousIdentity {
                    identity: identity.clone(),
                    matches: many.len(),
                })
            }
        };
        state.insert(identity, node);
        Ok(Some(node))
    }

    /// Find the node for `identity`, creating it when absent.
    pub fn find_or_create<S: GraphStore + ?Sized>(
        &self,
        store: &mut S,
        identity: &ResourceIdentity,
    ) -> Result<Resolution, ImportError> {
        if let Some(node) = self.find(store, identity)? {
            return Ok(Resolution::Found(node));
        }
        let node = store.create_node(identity)?;
        trace!(%identity, %node, "Created node");

        let mut state = self.state.lock();
        state.metrics.created += 1;
        state.insert(identity, node);
        Ok(Resolution::Created(node))
    }

    /// Drop one entry, e.g. after its node was deleted.
    pub fn remove(&self, identity: &ResourceIdentity) {
        self.state.lock().entries.pop(identity);
    }

    /// Drop every entry.
    pub fn invalidate(&self) {
        self.state.lock().entries.clear();
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn metrics(&self) -> CacheMetrics {
        self.state.lock().metrics.clone()
    }
}

impl std::fmt::Debug for IdentityCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("IdentityCache")
            .field("len", &state.entries.len())
            .field("capacity", &state.entries.cap())
            .field("metrics", &state.metrics)
            .finish()
    }
}
