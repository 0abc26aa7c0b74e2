use super::StartupError;
use crate::ingest::{MessageSource, Pipeline, PipelineConfig, PipelineMetrics, PipelineSnapshot};
use crate::service::{OrderCache, OrderService, OrderStorage};
use crate::validator::OrderValidator;
use sqlx::PgPool;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// The running order ingestion service.
///
/// `OrderSystem` is responsible for:
/// - **Startup order**: the cache is restored from storage before the
///   pipeline fetches its first message
/// - **Wiring**: one [`OrderService`] shared by the pipeline and readers
/// - **Shutdown**: cancel the pipeline, wait for in-flight messages, close
///   the database pool
///
/// # Example
///
/// ```ignore
/// let system = OrderSystem::start(cache, storage, broker, validator, config).await?;
///
/// let order = system.service.get_order("b563feb7b2b84b6test").await?;
///
/// shutdown_signal().await;
/// let summary = system.shutdown().await?;
/// ```
pub struct OrderSystem {
    /// Read and write entry point shared with the pipeline
    pub service: OrderService,

    /// Orders loaded into the cache at startup
    pub restored: usize,

    metrics: Arc<PipelineMetrics>,
    shutdown_tx: watch::Sender<bool>,
    pipeline: JoinHandle<PipelineSnapshot>,
    pool: Option<PgPool>,
}

impl OrderSystem {
    /// Restores the cache, then starts the pipeline.
    ///
    /// # Errors
    ///
    /// A failed cache restore or an invalid pipeline configuration is fatal;
    /// nothing is left running.
    pub async fn start(
        cache: Arc<dyn OrderCache>,
        storage: Arc<dyn OrderStorage>,
        source: Arc<dyn MessageSource>,
        validator: OrderValidator,
        config: PipelineConfig,
    ) -> Result<Self, StartupError> {
        let service = OrderService::new(cache, storage);

        // 1. Warm the cache; readers must not see a silently empty cache
        let restored = service.restore_cache().await?;

        // 2. Start the fetcher and workers
        let pipeline = Pipeline::new(source, service.clone(), Arc::new(validator), config)?;
        let metrics = pipeline.metrics();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let pipeline = tokio::spawn(pipeline.run(shutdown_rx));

        info!(restored, "Order system started");
        Ok(Self {
            service,
            restored,
            metrics,
            shutdown_tx,
            pipeline,
            pool: None,
        })
    }

    /// Connects to `PostgreSQL` and Kafka as configured and starts the system.
    #[cfg(feature = "kafka")]
    pub async fn connect(config: &crate::config::AppConfig) -> Result<Self, StartupError> {
        use crate::cache::MemoryCache;
        use crate::ingest::kafka::KafkaSource;
        use crate::storage::{create_pool, PostgresStorage};

        let cache = Arc::new(MemoryCache::new(config.cache_capacity)?);
        let pool = create_pool(&config.database.url, config.database.max_connections).await?;
        info!(max_connections = config.database.max_connections, "Database pool ready");

        let storage = Arc::new(
            PostgresStorage::new(pool.clone()).with_recovery_window(config.restore_window),
        );
        let source = Arc::new(KafkaSource::connect(
            &config.kafka.brokers,
            &config.kafka.group_id,
            &config.kafka.topic,
        )?);
        let validator = OrderValidator::new()?;

        match Self::start(cache, storage, source, validator, config.pipeline.clone()).await {
            Ok(mut system) => {
                system.pool = Some(pool);
                Ok(system)
            }
            Err(e) => {
                pool.close().await;
                Err(e)
            }
        }
    }

    /// Current pipeline counters.
    pub fn metrics(&self) -> PipelineSnapshot {
        self.metrics.snapshot()
    }

    /// Stops fetching, waits for workers to finish and releases the pool.
    ///
    /// # Returns
    ///
    /// - `Ok(snapshot)` with the final pipeline counters
    /// - `Err(JoinError)` if the pipeline task panicked
    pub async fn shutdown(self) -> Result<PipelineSnapshot, tokio::task::JoinError> {
        info!("Shutting down order system...");

        // The pipeline may already have stopped on its own.
        let _ = self.shutdown_tx.send(true);

        let result = self.pipeline.await;
        if let Err(e) = &result {
            error!(error = %e, "Pipeline task failed");
        }

        if let Some(pool) = self.pool {
            pool.close().await;
        }

        info!("Order system shutdown complete.");
        result
    }
}
