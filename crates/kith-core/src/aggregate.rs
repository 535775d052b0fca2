//! Aggregate contacts — the merged, logical person exposed to callers.
//!
//! Every field here is derived from the member raw contacts. Nothing in an
//! aggregate is authored directly; it is recomputed whenever membership or
//! member data changes.

use serde::{Deserialize, Serialize};
use strum::{EnumString, IntoStaticStr};

use crate::contact::{AggregateId, RawContactId};

/// Where an aggregate's display name came from, ordered from weakest to
/// strongest.
#[derive(
  Debug,
  Clone,
  Copy,
  Default,
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
pub enum DisplayNameSource {
  #[default]
  Undefined,
  Email,
  Phone,
  Nickname,
  /// A free-form display name, or a structured name missing given or family.
  PartialName,
  /// A structured name with both given and family parts.
  FullName,
}

impl DisplayNameSource {
  pub fn as_str(self) -> &'static str { self.into() }
}

/// The computed columns of an aggregate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateSummary {
  pub display_name:        Option<String>,
  pub display_name_source: DisplayNameSource,
  /// Any member starred.
  pub starred:             bool,
  /// AND over members with an explicit value; `false` when none has one.
  pub send_to_voicemail:   bool,
  /// First non-empty ringtone in raw contact id order.
  pub custom_ringtone:     Option<String>,
  pub lookup_key:          String,
}

/// An aggregate together with its members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateContact {
  pub id:         AggregateId,
  #[serde(flatten)]
  pub summary:    AggregateSummary,
  /// Ascending.
  pub member_ids: Vec<RawContactId>,
}

/// A non-binding proposal to join another aggregate, produced from
/// approximate name similarity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationSuggestion {
  pub aggregate_id: AggregateId,
  pub display_name: Option<String>,
  /// Normalized similarity in `0.0..=1.0`.
  pub similarity:   f64,
}

/// What one resolution (or a whole sweep) changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolveReport {
  /// Raw contacts examined.
  pub examined:           usize,
  /// Raw contacts whose aggregate changed.
  pub moved:              usize,
  pub aggregates_created: usize,
  pub aggregates_deleted: usize,
  /// Aggregates whose computed columns were rewritten.
  pub aggregates_updated: usize,
}

impl ResolveReport {
  pub fn is_noop(&self) -> bool {
    self.moved == 0
      && self.aggregates_created == 0
      && self.aggregates_deleted == 0
      && self.aggregates_updated == 0
  }

  pub fn absorb(&mut self, other: ResolveReport) {
    self.examined += other.examined;
    self.moved += other.moved;
    self.aggregates_created += other.aggregates_created;
    self.aggregates_deleted += other.aggregates_deleted;
    self.aggregates_updated += other.aggregates_updated;
  }
}
