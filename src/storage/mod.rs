//! # Order Storage
//!
//! Durable, normalised persistence of the order aggregate across four tables
//! (`orders`, `delivery`, `payment`, `items`), reconstruction by identifier and
//! bulk recovery of recently created orders for cache warm-up.
//!
//! Two backends implement [`OrderStorage`](crate::service::OrderStorage):
//!
//! - [`PostgresStorage`] - the production backend on a `sqlx` connection pool.
//! - [`MemoryStorage`] - the same four-table model held in memory, with row
//!   counters and failure injection for tests.
//!
//! ## Saves are idempotent
//!
//! A save inserts the header with `ON CONFLICT (order_uid) DO NOTHING`. When
//! the header is already there nothing else is written and the save reports
//! [`SaveOutcome::AlreadyPresent`]. Redelivered broker messages therefore
//! leave exactly `1 + 1 + 1 + items.len()` rows per order.

pub mod error;
pub mod memory;
pub mod postgres;

pub use error::*;
pub use memory::*;
pub use postgres::*;

/// Default age of orders reloaded into the cache at startup.
pub const DEFAULT_RECOVERY_WINDOW_HOURS: i64 = 3;

/// Result of a successful save.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// All four tables were written in one transaction.
    Inserted,
    /// A header with this identifier already existed; nothing was written.
    AlreadyPresent,
}
