//! The broker port consumed by the pipeline.

use async_trait::async_trait;
use thiserror::Error;

/// One record pulled from the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<Vec<u8>>,
    pub payload: Vec<u8>,
}

/// Errors reported by a [`MessageSource`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BrokerError {
    /// Fetching failed; the fetcher backs off and tries again.
    #[error("Fetch failed: {0}")]
    Fetch(String),

    /// Acknowledging a processed message failed.
    #[error("Commit of {topic}[{partition}]@{offset} failed: {reason}")]
    Commit {
        topic: String,
        partition: i32,
        offset: i64,
        reason: String,
    },

    /// The source will never yield another message.
    #[error("Message source closed")]
    Closed,

    /// The client could not be created or subscribed.
    #[error("Broker client error: {0}")]
    Client(String),
}

/// A consumer-group member with manual offset commits.
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Waits for the next message.
    async fn fetch(&self) -> Result<BrokerMessage, BrokerError>;

    /// Marks `message` as processed.
    ///
    /// Sources with cumulative positions only advance past offsets that are
    /// all processed; an earlier message that was never committed keeps
    /// itself and everything after it eligible for redelivery.
    async fn commit(&self, message: &BrokerMessage) -> Result<(), BrokerError>;
}
