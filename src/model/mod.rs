//! Pure data structures for the order aggregate.
//!
//! These are the shapes carried on the wire (JSON on the broker), held in the
//! cache and reconstructed from the relational store.

pub mod order;

pub use order::*;
