//! # Observability & Tracing
//!
//! [`setup_tracing`] installs a compact `tracing-subscriber` formatter. The
//! level comes from `RUST_LOG` and defaults to `info`.
//!
//! ```bash
//! # Default: one line per stored order, skip and startup summary
//! RUST_LOG=info order-ingest
//!
//! # Cache hits, commits, evictions
//! RUST_LOG=debug order-ingest
//!
//! # Only the pipeline, quietly everywhere else
//! RUST_LOG=warn,order_ingest::ingest=debug order-ingest
//! ```
//!
//! Workers run inside a `worker{id=..}` span and the fetcher inside
//! `fetcher`, so every pipeline line names the task that wrote it:
//!
//! ```text
//! INFO worker{id=3}:create_order{order_uid=b563feb7b2b84b6test}: Order created
//! WARN worker{id=7}: Invalid order, skipping order_uid="x" error=Order "x" is invalid: locale must be one of [ru, en]
//! ERROR worker{id=1}: Failed to persist order, will be redelivered order_uid="y" error=...
//! ```

use tracing_subscriber::EnvFilter;

pub fn setup_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false) // Spans already name the component
        .compact()
        .init();
}
