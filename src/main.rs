use order_ingest::config::AppConfig;
use order_ingest::lifecycle::{setup_tracing, shutdown_signal, OrderSystem, StartupError};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), StartupError> {
    setup_tracing();

    let config = AppConfig::from_env().inspect_err(|e| error!(error = %e, "Invalid configuration"))?;
    info!(
        topic = %config.kafka.topic,
        group_id = %config.kafka.group_id,
        workers = config.pipeline.workers,
        cache_capacity = config.cache_capacity,
        "Starting order ingestion"
    );

    let system = OrderSystem::connect(&config)
        .await
        .inspect_err(|e| error!(error = %e, "Startup failed"))?;

    shutdown_signal().await;

    match system.shutdown().await {
        Ok(summary) => info!(
            persisted = summary.persisted,
            committed = summary.committed,
            deferred = summary.deferred,
            "Stopped"
        ),
        Err(e) => error!(error = %e, "Shutdown did not complete cleanly"),
    }
    Ok(())
}
