//! Fetcher task, bounded queue and worker pool.

use super::{BrokerError, BrokerMessage, MessageSource, PipelineMetrics, PipelineSnapshot};
use crate::model::Order;
use crate::service::OrderService;
use crate::validator::OrderValidator;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn, Instrument};

/// Default size of the worker pool.
pub const DEFAULT_WORKERS: usize = 10;

/// Default pause after a failed fetch.
pub const DEFAULT_FETCH_RETRY_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Number of concurrent workers.
    pub workers: usize,
    /// Pause between retries after a fetch error.
    pub fetch_retry_backoff: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            fetch_retry_backoff: DEFAULT_FETCH_RETRY_BACKOFF,
        }
    }
}

impl PipelineConfig {
    /// Capacity of the queue between the fetcher and the workers.
    pub fn queue_capacity(&self) -> usize {
        self.workers * 2
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PipelineError {
    #[error("Pipeline needs at least one worker")]
    NoWorkers,
}

/// What happened to a single message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOutcome {
    /// Stored, or already stored by an earlier delivery.
    Persisted,
    /// The payload is not a JSON order.
    Malformed,
    /// The order failed validation.
    Invalid,
    /// Storage failed; leave the offset for redelivery.
    Deferred,
}

impl MessageOutcome {
    /// Only deferred messages keep their offset uncommitted.
    pub fn should_commit(self) -> bool {
        !matches!(self, Self::Deferred)
    }
}

/// Decodes, validates and persists one payload.
///
/// Never retries; the returned outcome decides whether the offset advances.
pub async fn process_message(
    service: &OrderService,
    validator: &OrderValidator,
    payload: &[u8],
) -> MessageOutcome {
    let order = match Order::from_json(payload) {
        Ok(order) => order,
        Err(e) => {
            warn!(error = %e, bytes = payload.len(), "Malformed message, skipping");
            return MessageOutcome::Malformed;
        }
    };

    if let Err(e) = validator.validate(&order) {
        warn!(order_uid = %order.order_uid, error = %e, "Invalid order, skipping");
        return MessageOutcome::Invalid;
    }

    let order_uid = order.order_uid.clone();
    match service.create_order(order).await {
        Ok(()) => MessageOutcome::Persisted,
        Err(e) => {
            error!(%order_uid, error = %e, "Failed to persist order, will be redelivered");
            MessageOutcome::Deferred
        }
    }
}

/// Drains a [`MessageSource`] into the [`OrderService`].
pub struct Pipeline {
    source: Arc<dyn MessageSource>,
    service: OrderService,
    validator: Arc<OrderValidator>,
    config: PipelineConfig,
    metrics: Arc<PipelineMetrics>,
}

impl Pipeline {
    pub fn new(
        source: Arc<dyn MessageSource>,
        service: OrderService,
        validator: Arc<OrderValidator>,
        config: PipelineConfig,
    ) -> Result<Self, PipelineError> {
        if config.workers == 0 {
            return Err(PipelineError::NoWorkers);
        }
        Ok(Self {
            source,
            service,
            validator,
            config,
            metrics: Arc::new(PipelineMetrics::new()),
        })
    }

    /// Live counters; readable while the pipeline runs.
    pub fn metrics(&self) -> Arc<PipelineMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Runs until `shutdown` turns `true` (or its sender is dropped), or the
    /// source closes.
    ///
    /// The fetcher stops first and closes the queue; workers then finish the
    /// messages already queued and exit. Returns once every task has ended.
    /// Fetched but uncommitted messages are redelivered after a restart.
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> PipelineSnapshot {
        let (tx, rx) = mpsc::channel(self.config.queue_capacity());
        let rx = Arc::new(Mutex::new(rx));

        info!(
            workers = self.config.workers,
            queue_capacity = self.config.queue_capacity(),
            "Pipeline started"
        );

        let fetcher = tokio::spawn(
            fetch_loop(
                Arc::clone(&self.source),
                tx,
                shutdown,
                self.config.fetch_retry_backoff,
                Arc::clone(&self.metrics),
            )
            .instrument(tracing::info_span!("fetcher")),
        );

        let workers: Vec<JoinHandle<()>> = (0..self.config.workers)
            .map(|id| {
                let worker = Worker {
                    source: Arc::clone(&self.source),
                    service: self.service.clone(),
                    validator: Arc::clone(&self.validator),
                    metrics: Arc::clone(&self.metrics),
                };
                tokio::spawn(
                    worker
                        .run(Arc::clone(&rx))
                        .instrument(tracing::info_span!("worker", id)),
                )
            })
            .collect();

        if let Err(e) = fetcher.await {
            error!(error = %e, "Fetcher task failed");
        }
        for handle in workers {
            if let Err(e) = handle.await {
                error!(error = %e, "Worker task failed");
            }
        }

        let snapshot = self.metrics.snapshot();
        info!(
            fetched = snapshot.fetched,
            persisted = snapshot.persisted,
            committed = snapshot.committed,
            skipped_malformed = snapshot.skipped_malformed,
            skipped_invalid = snapshot.skipped_invalid,
            deferred = snapshot.deferred,
            commit_failures = snapshot.commit_failures,
            fetch_errors = snapshot.fetch_errors,
            "Pipeline stopped"
        );
        snapshot
    }
}

/// Resolves once shutdown is requested or the sender is gone.
async fn cancelled(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

async fn fetch_loop(
    source: Arc<dyn MessageSource>,
    tx: mpsc::Sender<BrokerMessage>,
    mut shutdown: watch::Receiver<bool>,
    backoff: Duration,
    metrics: Arc<PipelineMetrics>,
) {
    loop {
        let fetched = tokio::select! {
            biased;
            _ = cancelled(&mut shutdown) => break,
            result = source.fetch() => result,
        };

        match fetched {
            Ok(message) => {
                // Blocks while the queue is full. A message dropped here is
                // never committed and is redelivered.
                tokio::select! {
                    biased;
                    _ = cancelled(&mut shutdown) => break,
                    sent = tx.send(message) => if sent.is_err() { break },
                }
                PipelineMetrics::incr(&metrics.fetched);
            }
            Err(BrokerError::Closed) => {
                info!("Message source closed");
                break;
            }
            Err(e) => {
                PipelineMetrics::incr(&metrics.fetch_errors);
                warn!(error = %e, backoff = ?backoff, "Fetch failed, retrying");
                tokio::select! {
                    biased;
                    _ = cancelled(&mut shutdown) => break,
                    _ = tokio::time::sleep(backoff) => {}
                }
            }
        }
    }
    debug!("Fetcher stopped, closing queue");
}

struct Worker {
    source: Arc<dyn MessageSource>,
    service: OrderService,
    validator: Arc<OrderValidator>,
    metrics: Arc<PipelineMetrics>,
}

impl Worker {
    async fn run(self, rx: Arc<Mutex<mpsc::Receiver<BrokerMessage>>>) {
        loop {
            let next = rx.lock().await.recv().await;
            let Some(message) = next else { break };
            self.handle(message).await;
        }
        debug!("Worker stopped");
    }

    async fn handle(&self, message: BrokerMessage) {
        let outcome = process_message(&self.service, &self.validator, &message.payload).await;
        let counter = match outcome {
            MessageOutcome::Persisted => &self.metrics.persisted,
            MessageOutcome::Malformed => &self.metrics.skipped_malformed,
            MessageOutcome::Invalid => &self.metrics.skipped_invalid,
            MessageOutcome::Deferred => &self.metrics.deferred,
        };
        PipelineMetrics::incr(counter);

        if !outcome.should_commit() {
            return;
        }
        match self.source.commit(&message).await {
            Ok(()) => {
                PipelineMetrics::incr(&self.metrics.committed);
                debug!(partition = message.partition, offset = message.offset, "Committed");
            }
            Err(e) => {
                PipelineMetrics::incr(&self.metrics.commit_failures);
                error!(
                    partition = message.partition,
                    offset = message.offset,
                    error = %e,
                    "Commit failed, message may be redelivered (duplicate risk)"
                );
            }
        }
    }
}
