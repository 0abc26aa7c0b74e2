//! Service configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! | Variable | Default |
//! |----------|---------|
//! | `DATABASE_URL` | built from the `DB_*` variables below |
//! | `DB_HOST` / `DB_PORT` / `DB_USER` / `DB_PASSWORD` / `DB_NAME` | `localhost` / `5432` / `postgres` / required / `orders` |
//! | `DB_MAX_CONNECTIONS` | `10` |
//! | `KAFKA_BROKERS` | required, comma separated |
//! | `KAFKA_TOPIC` | `orders` |
//! | `KAFKA_GROUP_ID` | `order-service` |
//! | `WORKER_COUNT` | `10` |
//! | `CACHE_CAPACITY` | `1000` |
//! | `RESTORE_WINDOW_HOURS` | `3` |
//! | `FETCH_RETRY_BACKOFF_MS` | `1000` |

use crate::cache::DEFAULT_CAPACITY;
use crate::ingest::{PipelineConfig, DEFAULT_WORKERS};
use crate::storage::DEFAULT_RECOVERY_WINDOW_HOURS;
use secrecy::{ExposeSecret, SecretString};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// `PostgreSQL` connection URL (contains password)
    pub url: SecretString,
    pub max_connections: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KafkaConfig {
    /// Comma separated `host:port` list
    pub brokers: String,
    pub topic: String,
    pub group_id: String,
}

/// Full service configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub kafka: KafkaConfig,
    pub pipeline: PipelineConfig,
    pub cache_capacity: usize,
    /// Age of orders reloaded into the cache at startup
    pub restore_window: chrono::Duration,
}

impl AppConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        let database = DatabaseConfig {
            url: env.database_url()?,
            max_connections: env.parse_or("DB_MAX_CONNECTIONS", 10)?,
        };

        let kafka = KafkaConfig {
            brokers: env.required("KAFKA_BROKERS")?,
            topic: env.or_default("KAFKA_TOPIC", "orders"),
            group_id: env.or_default("KAFKA_GROUP_ID", "order-service"),
        };

        let workers: usize = env.parse_or("WORKER_COUNT", DEFAULT_WORKERS)?;
        if workers == 0 {
            return Err(ConfigError::InvalidEnvVar(
                "WORKER_COUNT".to_string(),
                "must be at least 1".to_string(),
            ));
        }
        let backoff_ms: u64 = env.parse_or("FETCH_RETRY_BACKOFF_MS", 1000)?;
        let pipeline = PipelineConfig {
            workers,
            fetch_retry_backoff: Duration::from_millis(backoff_ms),
        };

        let cache_capacity = env.parse_or("CACHE_CAPACITY", DEFAULT_CAPACITY)?;
        let restore_hours: i64 =
            env.parse_or("RESTORE_WINDOW_HOURS", DEFAULT_RECOVERY_WINDOW_HOURS)?;
        let restore_window = chrono::Duration::try_hours(restore_hours)
            .filter(|window| *window >= chrono::Duration::zero())
            .ok_or_else(|| {
                ConfigError::InvalidEnvVar(
                    "RESTORE_WINDOW_HOURS".to_string(),
                    "must be a non-negative number of hours".to_string(),
                )
            })?;

        Ok(Self {
            database,
            kafka,
            pipeline,
            cache_capacity,
            restore_window,
        })
    }
}

struct Env<F>(F);

impl<F: Fn(&str) -> Option<String>> Env<F> {
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.is_empty())
    }

    fn required(&self, key: &str) -> Result<String, ConfigError> {
        self.get(key)
            .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
    }

    fn or_default(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    fn parse_or<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(key) {
            Some(raw) => raw
                .parse()
                .map_err(|e: T::Err| ConfigError::InvalidEnvVar(key.to_string(), e.to_string())),
            None => Ok(default),
        }
    }

    /// `DATABASE_URL` wins; otherwise the URL is assembled from `DB_*` parts.
    fn database_url(&self) -> Result<SecretString, ConfigError> {
        if let Some(url) = self.get("DATABASE_URL") {
            return Ok(SecretString::from(url));
        }
        let host = self.or_default("DB_HOST", "localhost");
        let port: u16 = self.parse_or("DB_PORT", 5432)?;
        let user = self.or_default("DB_USER", "postgres");
        let password = SecretString::from(self.required("DB_PASSWORD")?);
        let name = self.or_default("DB_NAME", "orders");
        Ok(SecretString::from(format!(
            "postgres://{user}:{}@{host}:{port}/{name}?sslmode=disable",
            password.expose_secret()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[
            ("DATABASE_URL", "postgres://u:p@db/orders"),
            ("KAFKA_BROKERS", "kafka:9092"),
        ])
        .unwrap();

        assert_eq!(config.database.url.expose_secret(), "postgres://u:p@db/orders");
        assert_eq!(config.database.max_connections, 10);
        assert_eq!(config.kafka.topic, "orders");
        assert_eq!(config.kafka.group_id, "order-service");
        assert_eq!(config.pipeline.workers, 10);
        assert_eq!(config.pipeline.fetch_retry_backoff, Duration::from_secs(1));
        assert_eq!(config.cache_capacity, 1000);
        assert_eq!(config.restore_window, chrono::Duration::hours(3));
    }

    #[test]
    fn test_database_url_from_parts() {
        let config = load(&[
            ("DB_HOST", "pg"),
            ("DB_USER", "svc"),
            ("DB_PASSWORD", "secret"),
            ("DB_NAME", "wb"),
            ("KAFKA_BROKERS", "kafka:9092"),
        ])
        .unwrap();
        assert_eq!(
            config.database.url.expose_secret(),
            "postgres://svc:secret@pg:5432/wb?sslmode=disable"
        );
    }

    #[test]
    fn test_missing_required() {
        let err = load(&[("DATABASE_URL", "postgres://x")]).unwrap_err();
        assert_eq!(err, ConfigError::MissingEnvVar("KAFKA_BROKERS".to_string()));

        let err = load(&[("KAFKA_BROKERS", "k:9092")]).unwrap_err();
        assert_eq!(err, ConfigError::MissingEnvVar("DB_PASSWORD".to_string()));
    }

    #[test]
    fn test_invalid_numbers_are_rejected() {
        let base = [("DATABASE_URL", "postgres://x"), ("KAFKA_BROKERS", "k:9092")];

        let mut vars = base.to_vec();
        vars.push(("WORKER_COUNT", "0"));
        assert!(matches!(
            load(&vars),
            Err(ConfigError::InvalidEnvVar(key, _)) if key == "WORKER_COUNT"
        ));

        let mut vars = base.to_vec();
        vars.push(("CACHE_CAPACITY", "lots"));
        assert!(matches!(
            load(&vars),
            Err(ConfigError::InvalidEnvVar(key, _)) if key == "CACHE_CAPACITY"
        ));
    }
}
