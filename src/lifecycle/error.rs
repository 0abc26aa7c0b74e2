//! Fatal startup errors.

use crate::cache::CacheError;
use crate::config::ConfigError;
use crate::ingest::{BrokerError, PipelineError};
use crate::service::ServiceError;
use thiserror::Error;

/// Anything that stops the service from starting.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Database connection failed: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Validator setup failed: {0}")]
    Validator(#[from] regex::Error),

    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    /// The initial cache warm-up failed.
    #[error("Cache restore failed: {0}")]
    Restore(#[from] ServiceError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}
