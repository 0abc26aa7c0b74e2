//! # Order Cache
//!
//! Bounded, thread-safe `order_uid → Order` store with least-recently-used
//! eviction. Reads and writes both take the single exclusive lock, because a
//! read moves the entry to the front of the recency list.
//!
//! Entries are shared snapshots (`Arc<Order>`): a reader never observes a
//! partially built order, and replacing an entry never mutates the snapshot
//! another reader already holds.

mod lru;

pub(crate) use lru::LruMap;

use crate::model::Order;
use crate::service::OrderCache;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, trace};

/// Default number of orders kept in memory.
pub const DEFAULT_CAPACITY: usize = 1000;

/// Errors raised while building a cache.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Invalid cache capacity: {0} (must be at least 1)")]
    InvalidCapacity(usize),
}

/// In-process LRU implementation of [`OrderCache`].
pub struct MemoryCache {
    inner: Mutex<LruMap<String, Arc<Order>>>,
}

impl MemoryCache {
    /// Creates a cache holding at most `capacity` orders.
    pub fn new(capacity: usize) -> Result<Self, CacheError> {
        if capacity == 0 {
            return Err(CacheError::InvalidCapacity(capacity));
        }
        Ok(Self {
            inner: Mutex::new(LruMap::new(capacity)),
        })
    }

    /// Creates a cache with [`DEFAULT_CAPACITY`].
    pub fn with_default_capacity() -> Self {
        Self {
            inner: Mutex::new(LruMap::new(DEFAULT_CAPACITY)),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.lock().capacity()
    }

    /// Checks presence without touching recency.
    pub fn contains(&self, order_uid: &str) -> bool {
        self.lock().contains(&order_uid.to_owned())
    }

    /// Cached identifiers from most to least recently used.
    pub fn keys(&self) -> Vec<String> {
        self.lock().keys_by_recency()
    }

    // LruMap mutations never panic midway, so a poisoned map is still consistent.
    fn lock(&self) -> MutexGuard<'_, LruMap<String, Arc<Order>>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl OrderCache for MemoryCache {
    fn get(&self, order_uid: &str) -> Option<Arc<Order>> {
        let hit = self.lock().get(&order_uid.to_owned()).cloned();
        trace!(order_uid, hit = hit.is_some(), "Cache get");
        hit
    }

    fn set(&self, order: Arc<Order>) {
        if !order.has_key() {
            debug!("Ignoring cache set for order without order_uid");
            return;
        }
        let key = order.order_uid.clone();
        let evicted = self.lock().put(key, order);
        if let Some(evicted) = evicted {
            debug!(order_uid = %evicted, "Evicted from cache");
        }
    }
}
