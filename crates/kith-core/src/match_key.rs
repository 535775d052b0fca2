//! Match keys — the normalized identity signals indexed per raw contact.
//!
//! Two live raw contacts sharing an exact-signal key match exactly. Keys are
//! regenerated by the aggregation engine whenever a raw contact is resolved.

use serde::{Deserialize, Serialize};
use strum::{EnumString, IntoStaticStr};

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Serialize,
  Deserialize,
  EnumString,
  IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MatchKind {
  /// A concatenated ordering of full-name tokens, or `family#cluster`.
  Name,
  /// Matchable phone suffix.
  Phone,
  Email,
  /// Normalized nickname text.
  Nickname,
  /// Nickname cluster id of a nickname value.
  NicknameCluster,
  /// Lookup form of the display text; only used to resolve `n` segments.
  DisplayName,
}

impl MatchKind {
  pub fn as_str(self) -> &'static str { self.into() }

  /// Whether sharing a key of this kind is an exact aggregation signal.
  pub fn is_exact_signal(self) -> bool { !matches!(self, Self::DisplayName) }
}

#[derive(
  Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct MatchKey {
  pub kind:  MatchKind,
  pub value: String,
}

impl MatchKey {
  pub fn new(kind: MatchKind, value: impl Into<String>) -> Self {
    Self { kind, value: value.into() }
  }
}
