//! Resolving lookup keys back to aggregates after membership has changed.

use std::collections::{BTreeMap, BTreeSet};

use kith_core::{
  Error, Result,
  contact::{AggregateId, RawContact, RawContactId},
  lookup::{LookupKeySegment, account_hash, parse_lookup_key},
  match_key::{MatchKey, MatchKind},
  store::AggregationTx,
};
use tracing::warn;

use crate::Aggregator;

impl Aggregator {
  /// Find the aggregate that now best represents `text`.
  ///
  /// An exact match on a current lookup key wins outright. Otherwise every
  /// segment is matched to live raw contacts (by source id, or by normalized
  /// display name for `n` segments) within the same account hash, and the
  /// aggregate holding the most matched segments wins, ties going to the
  /// lowest id.
  pub fn resolve_lookup_key<T: AggregationTx + ?Sized>(
    &self,
    tx: &T,
    text: &str,
  ) -> Result<AggregateId> {
    if let Some(id) = tx.aggregate_by_lookup_key(text)? {
      return Ok(id);
    }

    let segments = parse_lookup_key(text).inspect_err(|err| {
      warn!(lookup_key = text, error = %err, "rejected malformed lookup key");
    })?;

    let mut hits: BTreeMap<AggregateId, usize> = BTreeMap::new();
    for segment in &segments {
      for aggregate in segment_aggregates(tx, segment)? {
        *hits.entry(aggregate).or_default() += 1;
      }
    }

    hits
      .into_iter()
      .max_by(|(a, a_hits), (b, b_hits)| a_hits.cmp(b_hits).then_with(|| b.cmp(a)))
      .map(|(aggregate, _)| aggregate)
      .ok_or_else(|| {
        warn!(lookup_key = text, "lookup key matches no live raw contact");
        Error::StaleLookupKey(text.to_owned())
      })
  }
}

/// Aggregates of the live raw contacts a single segment identifies.
fn segment_aggregates<T: AggregationTx + ?Sized>(
  tx: &T,
  segment: &LookupKeySegment,
) -> Result<BTreeSet<AggregateId>> {
  let candidates: Vec<RawContactId> = if segment.source_id_lookup {
    tx.raw_contacts_by_source_id(&segment.key)?
  } else if segment.key.is_empty() {
    Vec::new()
  } else {
    tx.raw_contacts_with_key(&MatchKey::new(MatchKind::DisplayName, segment.key.as_str()))?
  };

  let mut found = BTreeSet::new();
  for id in candidates {
    let Some(raw) = tx.raw_contact(id)?.filter(RawContact::is_live) else {
      continue;
    };
    if account_hash(raw.account.as_ref()) != segment.account_hash {
      continue;
    }
    found.extend(raw.aggregate_id);
  }
  Ok(found)
}
