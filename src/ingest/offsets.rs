//! Per-partition commit positions for a cumulative-offset broker.
//!
//! A committed position `p` acknowledges every offset below `p`. Workers
//! finish messages out of order and some messages are deferred, so the
//! position may only advance to the lowest offset that is still in flight.

use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Default)]
struct PartitionOffsets {
    /// Fetched but not yet completed.
    in_flight: BTreeSet<i64>,
    highest_done: Option<i64>,
    committed: Option<i64>,
}

impl PartitionOffsets {
    fn position(&self) -> Option<i64> {
        match self.in_flight.first() {
            Some(&lowest) => Some(lowest),
            None => self.highest_done.map(|offset| offset + 1),
        }
    }
}

/// Tracks in-flight and completed offsets for every partition seen.
#[derive(Debug, Default)]
pub struct OffsetTracker {
    partitions: HashMap<(String, i32), PartitionOffsets>,
}

impl OffsetTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a message handed to the pipeline.
    pub fn fetched(&mut self, topic: &str, partition: i32, offset: i64) {
        self.entry(topic, partition).in_flight.insert(offset);
    }

    /// Marks `offset` done and returns the position to commit, if it moved
    /// past the last committed one.
    pub fn complete(&mut self, topic: &str, partition: i32, offset: i64) -> Option<i64> {
        let state = self.entry(topic, partition);
        state.in_flight.remove(&offset);
        state.highest_done = state.highest_done.max(Some(offset));

        let position = state.position()?;
        match state.committed {
            Some(committed) if position <= committed => None,
            _ => Some(position),
        }
    }

    /// Records that the broker accepted `position`.
    pub fn mark_committed(&mut self, topic: &str, partition: i32, position: i64) {
        let state = self.entry(topic, partition);
        state.committed = state.committed.max(Some(position));
    }

    /// The last position the broker accepted for the partition.
    pub fn committed_position(&self, topic: &str, partition: i32) -> Option<i64> {
        self.partitions
            .get(&(topic.to_owned(), partition))
            .and_then(|state| state.committed)
    }

    fn entry(&mut self, topic: &str, partition: i32) -> &mut PartitionOffsets {
        self.partitions
            .entry((topic.to_owned(), partition))
            .or_default()
    }
}
