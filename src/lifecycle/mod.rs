//! Startup, wiring and shutdown of the running service.
//!
//! - [`OrderSystem`] - builds the service, warms the cache, runs the pipeline
//! - [`setup_tracing`] - initializes logging
//! - [`shutdown_signal`] - resolves on Ctrl+C or SIGTERM

pub mod error;
pub mod order_system;
pub mod signal;
pub mod tracing;

pub use error::*;
pub use order_system::*;
pub use signal::*;
pub use self::tracing::setup_tracing;
