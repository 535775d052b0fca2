//! Aggregation exceptions — manual override directives between two raw
//! contacts.
//!
//! A directive is keyed by the unordered pair of raw contacts. Callers may
//! name the pair in either order; [`ExceptionKey`] canonicalises it.

use serde::{Deserialize, Serialize};
use strum::{EnumString, IntoStaticStr};

use crate::{Error, Result, contact::RawContactId};

/// The directive type. `Automatic` is never stored: writing it clears the
/// directive for the pair.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  EnumString,
  IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ExceptionType {
  Automatic,
  /// Force both raw contacts into the same aggregate.
  KeepIn,
  /// Never aggregate the pair.
  KeepOut,
  /// Never aggregate the pair; written by sync adapters.
  KeepSeparate,
}

impl ExceptionType {
  pub fn as_str(self) -> &'static str { self.into() }

  /// `KeepOut` and `KeepSeparate` behave identically during resolution.
  pub fn is_separation(self) -> bool {
    matches!(self, Self::KeepOut | Self::KeepSeparate)
  }
}

/// An unordered raw contact pair stored as `(min, max)`.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize,
  Deserialize,
)]
pub struct ExceptionKey {
  low:  RawContactId,
  high: RawContactId,
}

impl ExceptionKey {
  /// Canonicalise `(a, b)`. A raw contact cannot be paired with itself.
  pub fn new(a: RawContactId, b: RawContactId) -> Result<Self> {
    if a == b {
      return Err(Error::SelfException(a));
    }
    Ok(Self { low: a.min(b), high: a.max(b) })
  }

  pub fn low(&self) -> RawContactId { self.low }

  pub fn high(&self) -> RawContactId { self.high }

  pub fn contains(&self, id: RawContactId) -> bool {
    self.low == id || self.high == id
  }

  /// The other side of the pair, if `id` is one side.
  pub fn other(&self, id: RawContactId) -> Option<RawContactId> {
    if id == self.low {
      Some(self.high)
    } else if id == self.high {
      Some(self.low)
    } else {
      None
    }
  }
}

/// A stored directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationException {
  pub key:  ExceptionKey,
  pub kind: ExceptionType,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn key_is_order_agnostic() {
    let a = RawContactId(7);
    let b = RawContactId(3);
    assert_eq!(ExceptionKey::new(a, b).unwrap(), ExceptionKey::new(b, a).unwrap());
    let key = ExceptionKey::new(a, b).unwrap();
    assert_eq!(key.low(), b);
    assert_eq!(key.other(a), Some(b));
    assert_eq!(key.other(RawContactId(1)), None);
  }

  #[test]
  fn self_pair_is_rejected() {
    let err = ExceptionKey::new(RawContactId(1), RawContactId(1)).unwrap_err();
    assert!(matches!(err, Error::SelfException(RawContactId(1))));
  }

  #[test]
  fn exception_type_text_roundtrip() {
    for kind in [
      ExceptionType::KeepIn,
      ExceptionType::KeepOut,
      ExceptionType::KeepSeparate,
    ] {
      assert_eq!(kind.as_str().parse::<ExceptionType>().unwrap(), kind);
    }
    assert_eq!(ExceptionType::KeepSeparate.as_str(), "keep_separate");
  }
}
