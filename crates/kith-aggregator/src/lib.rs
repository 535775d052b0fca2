//! The Kith aggregation engine.
//!
//! Decides which raw contacts describe the same person and keeps their
//! aggregate contacts (membership, display name, flags, lookup key) in step
//! with the data and the manual directives. The engine is synchronous and
//! runs over an [`AggregationTx`](kith_core::store::AggregationTx) supplied by
//! a backend; [`MemoryStore`] is the in-process backend.

pub mod candidates;
pub mod config;
pub mod dsu;
pub mod exceptions;
pub mod score;
pub mod summary;

mod engine;
mod lookup;
mod memory;
mod resolver;
mod suggest;

pub use config::AggregatorConfig;
pub use engine::Aggregator;
pub use memory::{MemoryState, MemoryStore};

#[cfg(test)]
mod tests;
