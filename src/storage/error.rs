//! Error types for the storage layer.

use std::fmt;

/// Boxed backend error (sqlx, injected test failures, ...).
pub type BackendError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The sub-insert of a save that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertStage {
    Header,
    Delivery,
    Payment,
    /// Zero-based position of the item within the order.
    Item(usize),
}

impl fmt::Display for InsertStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Header => write!(f, "orders"),
            Self::Delivery => write!(f, "delivery"),
            Self::Payment => write!(f, "payment"),
            Self::Item(index) => write!(f, "items[{index}]"),
        }
    }
}

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// No header row exists for the identifier.
    #[error("Order not found: {0}")]
    NotFound(String),

    /// One of the inserts of a save failed; the transaction was rolled back.
    #[error("Insert into {stage} failed for order {order_uid}: {source}")]
    Insert {
        stage: InsertStage,
        order_uid: String,
        #[source]
        source: BackendError,
    },

    /// A read query or row decode failed.
    #[error("Query {what} failed for order {order_uid}: {source}")]
    Query {
        what: &'static str,
        order_uid: String,
        #[source]
        source: BackendError,
    },

    /// Begin or commit of a transaction failed.
    #[error("Transaction failed for order {order_uid}: {source}")]
    Transaction {
        order_uid: String,
        #[source]
        source: BackendError,
    },

    /// The header exists but a mandatory related row does not.
    #[error("Order {order_uid} is incomplete: missing {missing}")]
    Incomplete {
        order_uid: String,
        missing: &'static str,
    },

    /// The backend cannot be reached at all.
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
