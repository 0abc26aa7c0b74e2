//! Error types for the order service.

use crate::storage::StorageError;
use thiserror::Error;

/// Errors that can occur during order service operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Neither the cache nor storage has the order.
    #[error("Order not found: {0}")]
    NotFound(String),

    /// Persisting an order failed; nothing was cached.
    #[error("Failed to save order {order_uid}: {source}")]
    Save {
        order_uid: String,
        #[source]
        source: StorageError,
    },

    /// Reading an order from storage failed for a reason other than absence.
    #[error("Failed to load order {order_uid}: {source}")]
    Load {
        order_uid: String,
        #[source]
        source: StorageError,
    },

    /// Bulk recovery of recent orders failed.
    #[error("Failed to restore cache: {0}")]
    Restore(#[source] StorageError),
}

impl ServiceError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
