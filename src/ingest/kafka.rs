//! Kafka [`MessageSource`] built on `rdkafka`.
//!
//! Auto-commit is disabled; offsets advance only through
//! [`MessageSource::commit`]. Kafka positions are cumulative, so a commit
//! moves the partition to the lowest offset still in flight, never past a
//! deferred message.

use super::{BrokerError, BrokerMessage, MessageSource, OffsetTracker};
use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::{Message, Offset, TopicPartitionList};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info};

/// Consumer-group member subscribed to a single topic.
pub struct KafkaSource {
    consumer: StreamConsumer,
    topic: String,
    offsets: Mutex<OffsetTracker>,
}

impl KafkaSource {
    /// Creates the consumer and subscribes it to `topic`.
    pub fn connect(brokers: &str, group_id: &str, topic: &str) -> Result<Self, BrokerError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("group.id", group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set("session.timeout.ms", "6000")
            .create()
            .map_err(|e| BrokerError::Client(e.to_string()))?;

        consumer
            .subscribe(&[topic])
            .map_err(|e| BrokerError::Client(e.to_string()))?;

        info!(brokers, group_id, topic, "Kafka consumer subscribed");
        Ok(Self {
            consumer,
            topic: topic.to_owned(),
            offsets: Mutex::new(OffsetTracker::new()),
        })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

#[async_trait]
impl MessageSource for KafkaSource {
    async fn fetch(&self) -> Result<BrokerMessage, BrokerError> {
        let message = self
            .consumer
            .recv()
            .await
            .map_err(|e| BrokerError::Fetch(e.to_string()))?;

        self.offsets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .fetched(message.topic(), message.partition(), message.offset());

        Ok(BrokerMessage {
            topic: message.topic().to_owned(),
            partition: message.partition(),
            offset: message.offset(),
            key: message.key().map(<[u8]>::to_vec),
            payload: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
        })
    }

    async fn commit(&self, message: &BrokerMessage) -> Result<(), BrokerError> {
        let commit_err = |reason: String| BrokerError::Commit {
            topic: message.topic.clone(),
            partition: message.partition,
            offset: message.offset,
            reason,
        };

        // Held across the commit so positions reach the broker in order.
        let mut tracker = self.offsets.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(position) = tracker.complete(&message.topic, message.partition, message.offset)
        else {
            debug!(offset = message.offset, "Commit position unchanged");
            return Ok(());
        };

        let mut offsets = TopicPartitionList::new();
        offsets
            .add_partition_offset(&message.topic, message.partition, Offset::Offset(position))
            .map_err(|e| commit_err(e.to_string()))?;

        self.consumer
            .commit(&offsets, CommitMode::Sync)
            .map_err(|e| commit_err(e.to_string()))?;
        tracker.mark_committed(&message.topic, message.partition, position);
        Ok(())
    }
}
