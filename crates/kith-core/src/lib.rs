//! Core types and trait definitions for the Kith contacts aggregation store.
//!
//! This crate is deliberately free of database dependencies. It holds the
//! domain model, the pure normalizer and lookup-key codec, and the storage
//! seams every backend implements.

pub mod aggregate;
pub mod contact;
pub mod error;
pub mod exception;
pub mod lookup;
pub mod match_key;
pub mod nickname;
pub mod normalize;
pub mod store;

pub use error::{Error, Result};
