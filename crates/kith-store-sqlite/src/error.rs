//! Error type for `kith-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] kith_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A stored enum or counter column holds a value this build does not know.
  #[error("invalid column value: {0}")]
  InvalidColumn(String),
}

impl Error {
  /// Whether this is one of the engine's "not found" outcomes.
  pub fn is_not_found(&self) -> bool {
    matches!(self, Self::Core(e) if e.is_not_found())
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
