//! Seams between the orchestrator and its backends.

use crate::model::Order;
use crate::storage::{SaveOutcome, StorageError};
use async_trait::async_trait;
use std::sync::Arc;

/// Durable order persistence.
#[async_trait]
pub trait OrderStorage: Send + Sync {
    /// Writes the header, delivery, payment and items rows in one transaction.
    async fn save_order(&self, order: &Order) -> Result<SaveOutcome, StorageError>;

    /// Rebuilds a full order; [`StorageError::NotFound`] when no header exists.
    async fn get_order(&self, order_uid: &str) -> Result<Order, StorageError>;

    /// All orders created inside the recovery window, oldest first.
    async fn load_orders(&self) -> Result<Vec<Order>, StorageError>;
}

/// Bounded in-process order cache.
pub trait OrderCache: Send + Sync {
    fn get(&self, order_uid: &str) -> Option<Arc<Order>>;

    /// Inserts or replaces the entry; may evict the least recently used one.
    fn set(&self, order: Arc<Order>);
}
