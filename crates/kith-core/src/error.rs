//! Error types for `kith-core`.

use thiserror::Error;

use crate::contact::{AggregateId, RawContactId};

#[derive(Debug, Error)]
pub enum Error {
  #[error("raw contact not found: {0}")]
  RawContactNotFound(RawContactId),

  #[error("aggregate not found: {0}")]
  AggregateNotFound(AggregateId),

  #[error("cannot write an aggregation exception between {0} and itself")]
  SelfException(RawContactId),

  #[error("invalid lookup key: {0}")]
  InvalidLookupKey(String),

  #[error("stale lookup key: {0:?} matches no raw contact")]
  StaleLookupKey(String),

  #[error("unknown mimetype: {0:?}")]
  UnknownMimetype(String),

  #[error("storage error: {0}")]
  Storage(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  /// Whether the caller should treat this error as "not found" rather than as
  /// a failure of the store.
  pub fn is_not_found(&self) -> bool {
    matches!(
      self,
      Self::RawContactNotFound(_)
        | Self::AggregateNotFound(_)
        | Self::InvalidLookupKey(_)
        | Self::StaleLookupKey(_)
    )
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
