//! # Order Ingest
//!
//! > **Orders from a partitioned log, into `PostgreSQL`, served from memory.**
//!
//! This crate consumes JSON orders from a broker topic, stores each one
//! across four normalized tables and serves point lookups through a bounded
//! LRU cache. Delivery is at-least-once; saves are idempotent, so a
//! redelivered message has no visible effect.
//!
//! ## 🏗️ Data Flow
//!
//! ```text
//! broker ──► fetcher ──► bounded queue (2 × workers) ──► worker pool
//!                                                          │ decode, validate
//!                                                          ▼
//!                                   OrderService::create_order
//!                                      │ 1. storage (one transaction)
//!                                      │ 2. cache
//!                                      ▼
//! reader ──► OrderService::get_order ──► cache hit, or storage + cache fill
//! ```
//!
//! ## 🚀 Core Concepts
//!
//! ### Storage is authoritative
//! [`OrderService`](service::OrderService) writes storage before the cache and
//! never caches a miss. Whatever the cache returns, storage can also return.
//!
//! ### Every failure class has one policy
//! Malformed and invalid messages are logged and committed: retrying them
//! cannot help. Storage failures are logged and **not** committed, so the
//! broker redelivers them. See [`ingest`] for the full table.
//!
//! ### Ports, not backends
//! The service depends on the [`OrderStorage`](service::OrderStorage) and
//! [`OrderCache`](service::OrderCache) traits. Tests swap in
//! [`MemoryStorage`](storage::MemoryStorage) and
//! [`MockBroker`](ingest::MockBroker), which ship with the crate.
//!
//! ## 🗺️ Module Tour
//!
//! - [`model`] - the `Order` aggregate and its JSON form
//! - [`cache`] - owned LRU behind a single mutex
//! - [`storage`] - `PostgreSQL` and in-memory backends
//! - [`validator`] - structural rules, all violations collected
//! - [`service`] - the orchestrator and its ports
//! - [`ingest`] - fetcher, worker pool, commit policy, Kafka adapter
//! - [`config`] - environment configuration
//! - [`lifecycle`] - startup order, tracing, signals, shutdown
//!
//! ## Running
//!
//! ```bash
//! psql "$DATABASE_URL" -f schema.sql
//! KAFKA_BROKERS=localhost:9092 RUST_LOG=info cargo run --features kafka
//! ```
//!
//! Tests against a real database are ignored by default:
//!
//! ```bash
//! TEST_DATABASE_URL=postgres://... cargo test -- --ignored
//! ```

pub mod cache;
pub mod config;
pub mod ingest;
pub mod lifecycle;
pub mod model;
pub mod service;
pub mod storage;
pub mod validator;

#[cfg(test)]
mod test_support;
