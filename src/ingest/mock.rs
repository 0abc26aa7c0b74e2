//! # Mock Broker
//!
//! A scripted [`MessageSource`] for exercising the pipeline without a broker.
//!
//! Queue payloads or fetch errors with the `push_*` methods; they are returned
//! by `fetch` in order. With the script empty, `fetch` waits for more input,
//! or returns [`BrokerError::Closed`] once [`MockBroker::close`] was called,
//! which lets a test run the pipeline to completion without a shutdown
//! signal. Commits are cumulative, as on a real broker: the partition
//! position only advances past offsets whose messages were all committed.
//!
//! ```ignore
//! let broker = Arc::new(MockBroker::new());
//! let offset = broker.push_payload(br#"{"broken"#.to_vec());
//! broker.close();
//!
//! pipeline.run(shutdown_rx).await;
//! assert!(broker.is_committed(offset));
//! ```

use super::{BrokerError, BrokerMessage, MessageSource, OffsetTracker};
use crate::model::Order;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

/// Topic name stamped on every scripted message.
pub const MOCK_TOPIC: &str = "orders";

#[derive(Default)]
struct Script {
    pending: VecDeque<Result<BrokerMessage, BrokerError>>,
    offsets: OffsetTracker,
    next_offset: i64,
    fail_commits: bool,
    closed: bool,
}

/// In-memory, single-partition message source.
#[derive(Default)]
pub struct MockBroker {
    script: Mutex<Script>,
    ready: Notify,
}

impl MockBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a raw payload and returns its offset.
    pub fn push_payload(&self, payload: Vec<u8>) -> i64 {
        self.push(None, payload)
    }

    /// Queues an order encoded as JSON, keyed by its identifier.
    pub fn push_order(&self, order: &Order) -> Result<i64, serde_json::Error> {
        let payload = order.to_json()?;
        Ok(self.push(Some(order.order_uid.clone().into_bytes()), payload))
    }

    fn push(&self, key: Option<Vec<u8>>, payload: Vec<u8>) -> i64 {
        let offset = {
            let mut script = self.lock();
            let offset = script.next_offset;
            script.next_offset += 1;
            script.pending.push_back(Ok(BrokerMessage {
                topic: MOCK_TOPIC.to_owned(),
                partition: 0,
                offset,
                key,
                payload,
            }));
            offset
        };
        self.ready.notify_one();
        offset
    }

    /// Queues a transient fetch failure.
    pub fn push_fetch_error(&self, reason: &str) {
        self.lock()
            .pending
            .push_back(Err(BrokerError::Fetch(reason.to_owned())));
        self.ready.notify_one();
    }

    /// Makes every subsequent commit fail.
    pub fn fail_commits(&self, fail: bool) {
        self.lock().fail_commits = fail;
    }

    /// After the script is drained, `fetch` reports [`BrokerError::Closed`].
    pub fn close(&self) {
        self.lock().closed = true;
        self.ready.notify_one();
    }

    /// The partition's committed position: the next offset a restarted
    /// consumer would read.
    pub fn committed_position(&self) -> Option<i64> {
        self.lock().offsets.committed_position(MOCK_TOPIC, 0)
    }

    /// Whether `offset` lies below the committed position.
    pub fn is_committed(&self, offset: i64) -> bool {
        self.committed_position()
            .is_some_and(|position| offset < position)
    }

    /// Scripted entries not yet fetched.
    pub fn remaining(&self) -> usize {
        self.lock().pending.len()
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl MessageSource for MockBroker {
    async fn fetch(&self) -> Result<BrokerMessage, BrokerError> {
        loop {
            {
                let mut script = self.lock();
                if let Some(next) = script.pending.pop_front() {
                    if let Ok(message) = &next {
                        script
                            .offsets
                            .fetched(&message.topic, message.partition, message.offset);
                    }
                    return next;
                }
                if script.closed {
                    return Err(BrokerError::Closed);
                }
            }
            self.ready.notified().await;
        }
    }

    async fn commit(&self, message: &BrokerMessage) -> Result<(), BrokerError> {
        let mut script = self.lock();
        let Some(position) =
            script
                .offsets
                .complete(&message.topic, message.partition, message.offset)
        else {
            return Ok(());
        };
        if script.fail_commits {
            return Err(BrokerError::Commit {
                topic: message.topic.clone(),
                partition: message.partition,
                offset: message.offset,
                reason: "injected commit failure".to_owned(),
            });
        }
        script
            .offsets
            .mark_committed(&message.topic, message.partition, position);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fetch_returns_script_in_order_then_closed() {
        let broker = MockBroker::new();
        assert_eq!(broker.push_payload(b"a".to_vec()), 0);
        broker.push_fetch_error("down");
        assert_eq!(broker.push_payload(b"b".to_vec()), 1);
        broker.close();

        assert_eq!(broker.fetch().await.unwrap().payload, b"a");
        assert_eq!(broker.fetch().await, Err(BrokerError::Fetch("down".into())));
        assert_eq!(broker.fetch().await.unwrap().offset, 1);
        assert_eq!(broker.fetch().await, Err(BrokerError::Closed));
    }

    #[tokio::test]
    async fn test_fetch_waits_for_new_messages() {
        let broker = std::sync::Arc::new(MockBroker::new());
        let waiter = {
            let broker = broker.clone();
            tokio::spawn(async move { broker.fetch().await })
        };
        tokio::task::yield_now().await;
        broker.push_payload(b"late".to_vec());

        let message = waiter.await.unwrap().unwrap();
        assert_eq!(message.payload, b"late");
    }

    #[tokio::test]
    async fn test_commits_are_recorded_or_fail() {
        let broker = MockBroker::new();
        broker.push_payload(b"x".to_vec());
        let message = broker.fetch().await.unwrap();

        broker.fail_commits(true);
        assert!(matches!(
            broker.commit(&message).await,
            Err(BrokerError::Commit { offset: 0, .. })
        ));
        assert_eq!(broker.committed_position(), None);
        broker.fail_commits(false);
        broker.commit(&message).await.unwrap();
        assert_eq!(broker.committed_position(), Some(1));
        assert!(broker.is_committed(0));
    }

    #[tokio::test]
    async fn test_position_waits_for_uncommitted_earlier_offset() {
        let broker = MockBroker::new();
        for payload in [b"a", b"b", b"c"] {
            broker.push_payload(payload.to_vec());
        }
        let first = broker.fetch().await.unwrap();
        let second = broker.fetch().await.unwrap();
        let third = broker.fetch().await.unwrap();

        broker.commit(&third).await.unwrap();
        broker.commit(&second).await.unwrap();
        assert!(!broker.is_committed(0));
        assert!(!broker.is_committed(2));

        broker.commit(&first).await.unwrap();
        assert_eq!(broker.committed_position(), Some(3));
    }
}
