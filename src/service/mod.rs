//! # Order Service
//!
//! The orchestrator between [`OrderCache`] and [`OrderStorage`]. It is the only
//! entry point the ingestion pipeline and read-side callers use, and it keeps
//! the two backends coherent:
//!
//! - **Write-through**: storage first, cache only after a successful save. The
//!   cache never holds an order that storage cannot return.
//! - **Read-through**: cache first; on a miss, storage, then populate the
//!   cache. Misses are not cached.
//! - **Warm-up**: [`OrderService::restore_cache`] loads recent orders once at
//!   startup, before any traffic is served.

mod error;
mod ports;

pub use error::ServiceError;
pub use ports::{OrderCache, OrderStorage};

use crate::model::Order;
use crate::storage::{SaveOutcome, StorageError};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Cheaply cloneable handle shared by all pipeline workers and readers.
#[derive(Clone)]
pub struct OrderService {
    cache: Arc<dyn OrderCache>,
    storage: Arc<dyn OrderStorage>,
}

impl OrderService {
    pub fn new(cache: Arc<dyn OrderCache>, storage: Arc<dyn OrderStorage>) -> Self {
        Self { cache, storage }
    }

    /// Persists an order, then caches it.
    ///
    /// When storage already holds the identifier, the stored copy is what gets
    /// cached, so the cache always matches storage.
    #[instrument(skip(self, order), fields(order_uid = %order.order_uid))]
    pub async fn create_order(&self, order: Order) -> Result<(), ServiceError> {
        let outcome = self
            .storage
            .save_order(&order)
            .await
            .map_err(|source| ServiceError::Save {
                order_uid: order.order_uid.clone(),
                source,
            })?;

        match outcome {
            SaveOutcome::Inserted => {
                self.cache.set(Arc::new(order));
                info!("Order created");
            }
            SaveOutcome::AlreadyPresent => {
                match self.storage.get_order(&order.order_uid).await {
                    Ok(stored) => self.cache.set(Arc::new(stored)),
                    // Storage holds the order, so the save itself succeeded;
                    // a later read will populate the cache.
                    Err(e) => warn!(error = %e, "Could not re-read existing order for cache"),
                }
                info!("Order already stored");
            }
        }
        Ok(())
    }

    /// Returns an order from the cache, falling back to storage.
    #[instrument(skip(self))]
    pub async fn get_order(&self, order_uid: &str) -> Result<Arc<Order>, ServiceError> {
        if let Some(order) = self.cache.get(order_uid) {
            debug!("Cache hit");
            return Ok(order);
        }

        let order = match self.storage.get_order(order_uid).await {
            Ok(order) => Arc::new(order),
            Err(StorageError::NotFound(uid)) => return Err(ServiceError::NotFound(uid)),
            Err(source) => {
                return Err(ServiceError::Load {
                    order_uid: order_uid.to_owned(),
                    source,
                })
            }
        };
        self.cache.set(Arc::clone(&order));
        debug!("Cache populated from storage");
        Ok(order)
    }

    /// Loads every recent order from storage into the cache.
    ///
    /// Returns the number of orders restored. Orders that fail to load
    /// individually are skipped by the storage layer.
    #[instrument(skip(self))]
    pub async fn restore_cache(&self) -> Result<usize, ServiceError> {
        let orders = self
            .storage
            .load_orders()
            .await
            .map_err(ServiceError::Restore)?;
        let count = orders.len();
        for order in orders {
            self.cache.set(Arc::new(order));
        }
        info!(count, "Cache restored");
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::storage::{InsertStage, MemoryStorage};
    use crate::test_support::sample_order;
    use chrono::{Duration, Utc};

    fn setup(capacity: usize) -> (OrderService, Arc<MemoryCache>, Arc<MemoryStorage>) {
        let cache = Arc::new(MemoryCache::new(capacity).unwrap());
        let storage = Arc::new(MemoryStorage::new());
        let service = OrderService::new(cache.clone(), storage.clone());
        (service, cache, storage)
    }

    #[tokio::test]
    async fn test_create_order_writes_storage_then_cache() {
        let (service, cache, storage) = setup(10);
        let order = sample_order("w-1");

        service.create_order(order.clone()).await.unwrap();

        assert_eq!(storage.get_order("w-1").await.unwrap(), order);
        assert_eq!(*cache.get("w-1").unwrap(), order);
    }

    #[tokio::test]
    async fn test_failed_save_leaves_cache_untouched() {
        let (service, cache, storage) = setup(10);
        storage.fail_saves_at(Some(InsertStage::Payment));

        let err = service.create_order(sample_order("w-1")).await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Save { source: StorageError::Insert { stage: InsertStage::Payment, .. }, .. }
        ));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_create_caches_stored_copy() {
        let (service, cache, storage) = setup(10);
        let original = sample_order("dup");
        service.create_order(original.clone()).await.unwrap();

        let mut redelivered = original.clone();
        redelivered.entry = "CHANGED".into();
        service.create_order(redelivered).await.unwrap();

        assert_eq!(cache.get("dup").unwrap().entry, original.entry);
        assert_eq!(storage.row_counts("dup").orders, 1);
    }

    #[tokio::test]
    async fn test_get_order_hit_skips_storage() {
        let (service, _cache, storage) = setup(10);
        service.create_order(sample_order("h-1")).await.unwrap();

        let got = service.get_order("h-1").await.unwrap();
        assert_eq!(got.order_uid, "h-1");
        assert_eq!(storage.get_calls(), 0);
    }

    #[tokio::test]
    async fn test_get_order_miss_populates_cache() {
        let (service, cache, storage) = setup(10);
        let order = sample_order("m-1");
        storage.seed(&order);

        let got = service.get_order("m-1").await.unwrap();
        assert_eq!(*got, order);
        assert_eq!(storage.get_calls(), 1);
        assert_eq!(*cache.get("m-1").unwrap(), order);

        service.get_order("m-1").await.unwrap();
        assert_eq!(storage.get_calls(), 1);
    }

    #[tokio::test]
    async fn test_not_found_is_not_cached() {
        let (service, cache, storage) = setup(10);

        let err = service.get_order("ghost").await.unwrap_err();
        assert!(err.is_not_found());
        assert!(!cache.contains("ghost"));

        service.get_order("ghost").await.unwrap_err();
        assert_eq!(storage.get_calls(), 2);
    }

    #[tokio::test]
    async fn test_storage_failure_is_not_not_found() {
        let (service, _cache, storage) = setup(10);
        storage.set_unavailable(true);

        let err = service.get_order("x").await.unwrap_err();
        assert!(matches!(err, ServiceError::Load { .. }));
        assert!(!err.is_not_found());
    }

    #[tokio::test]
    async fn test_restore_cache_loads_recent_orders() {
        let (service, cache, storage) = setup(10);
        for (uid, hours) in [("r-1", 0), ("r-2", 1), ("r-3", 2), ("stale", 5)] {
            let mut order = sample_order(uid);
            order.date_created = Utc::now() - Duration::hours(hours);
            storage.seed(&order);
        }

        assert_eq!(service.restore_cache().await.unwrap(), 3);
        assert_eq!(cache.len(), 3);
        assert!(!cache.contains("stale"));
    }

    #[tokio::test]
    async fn test_restore_cache_failure_is_reported() {
        let (service, _cache, storage) = setup(10);
        storage.set_unavailable(true);
        assert!(matches!(
            service.restore_cache().await,
            Err(ServiceError::Restore(StorageError::Unavailable(_)))
        ));
    }
}
