//! Counters kept by the pipeline while it runs.

use std::sync::atomic::{AtomicU64, Ordering};

/// Live pipeline counters, shared by the fetcher and every worker.
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    /// Messages handed to the worker queue.
    pub fetched: AtomicU64,
    /// Orders stored (or already present) in storage.
    pub persisted: AtomicU64,
    /// Commits the broker accepted.
    pub committed: AtomicU64,
    /// Payloads that were not valid JSON orders.
    pub skipped_malformed: AtomicU64,
    /// Orders that failed validation.
    pub skipped_invalid: AtomicU64,
    /// Messages left uncommitted for redelivery after a storage failure.
    pub deferred: AtomicU64,
    pub commit_failures: AtomicU64,
    pub fetch_errors: AtomicU64,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current snapshot of all counters.
    pub fn snapshot(&self) -> PipelineSnapshot {
        PipelineSnapshot {
            fetched: self.fetched.load(Ordering::Relaxed),
            persisted: self.persisted.load(Ordering::Relaxed),
            committed: self.committed.load(Ordering::Relaxed),
            skipped_malformed: self.skipped_malformed.load(Ordering::Relaxed),
            skipped_invalid: self.skipped_invalid.load(Ordering::Relaxed),
            deferred: self.deferred.load(Ordering::Relaxed),
            commit_failures: self.commit_failures.load(Ordering::Relaxed),
            fetch_errors: self.fetch_errors.load(Ordering::Relaxed),
        }
    }
}

/// Pipeline counters at a point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineSnapshot {
    pub fetched: u64,
    pub persisted: u64,
    pub committed: u64,
    pub skipped_malformed: u64,
    pub skipped_invalid: u64,
    pub deferred: u64,
    pub commit_failures: u64,
    pub fetch_errors: u64,
}
