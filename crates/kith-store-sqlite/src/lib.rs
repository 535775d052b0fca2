//! SQLite backend for the Kith contact store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Every write runs the aggregation engine
//! inside the same IMMEDIATE transaction as the data change it reacts to.

mod encode;
mod intern;
mod schema;
mod store;
mod tx;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;
pub use tx::SqliteTx;
