//! # Ingestion Pipeline
//!
//! Drains a partitioned broker into the [`OrderService`](crate::service::OrderService).
//!
//! One fetcher task pulls messages and pushes them onto a bounded queue of
//! `2 × workers` entries; when workers fall behind the fetcher blocks, so
//! consumption slows to processing speed. A fixed pool of workers takes one
//! message at a time through decode, validate, persist and commit.
//!
//! ## Commit policy
//!
//! | Outcome | Logged at | Offset |
//! |---------|-----------|--------|
//! | Persisted | `info` | committed |
//! | Malformed JSON | `warn` | committed, never retried |
//! | Failed validation | `warn` | committed, never retried |
//! | Storage failure | `error` | **not** committed, redelivered later |
//!
//! A failed commit after a successful save is logged as a duplicate risk;
//! idempotent saves make the redelivery harmless.
//!
//! Broker positions are cumulative. [`OffsetTracker`] keeps the committed
//! position of each partition at the lowest offset still in flight, so a
//! deferred message is never acknowledged by a later one.
//!
//! Ordering between messages of one partition is not preserved across workers.

mod metrics;
mod mock;
mod offsets;
mod pipeline;
mod source;

#[cfg(feature = "kafka")]
pub mod kafka;

pub use metrics::{PipelineMetrics, PipelineSnapshot};
pub use mock::{MockBroker, MOCK_TOPIC};
pub use offsets::OffsetTracker;
pub use pipeline::{
    process_message, MessageOutcome, Pipeline, PipelineConfig, PipelineError,
    DEFAULT_FETCH_RETRY_BACKOFF, DEFAULT_WORKERS,
};
pub use source::{BrokerError, BrokerMessage, MessageSource};
