//! Match scoring between a raw contact and a candidate aggregate.

use std::collections::BTreeSet;

use kith_core::{
  Result,
  contact::{ContactPoint, RawContact, RawContactId},
  match_key::MatchKey,
  normalize::{NormalizedName, normalize_name},
  store::AggregationTx,
};
use strsim::normalized_levenshtein;

use crate::{candidates::match_keys, config::AggregatorConfig};

/// Strength of a match, ordered weakest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MatchStrength {
  None,
  /// Similar names only. Never merges on its own; feeds suggestions.
  Approximate,
  Exact,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Score {
  pub strength:   MatchStrength,
  /// Best name similarity seen, `1.0` for exact matches.
  pub similarity: f64,
}

impl Score {
  const NONE: Score = Score { strength: MatchStrength::None, similarity: 0.0 };
}

/// What the scorer needs to know about one raw contact.
#[derive(Debug, Clone)]
pub struct MatchProfile {
  pub id:   RawContactId,
  /// Exact-signal keys only.
  pub keys: BTreeSet<MatchKey>,
  pub name: NormalizedName,
}

impl MatchProfile {
  pub fn new(
    raw: &RawContact,
    points: &[ContactPoint],
    config: &AggregatorConfig,
  ) -> Self {
    Self {
      id:   raw.id,
      keys: match_keys(raw, points, config)
        .into_iter()
        .filter(|k| k.kind.is_exact_signal())
        .collect(),
      name: normalize_name(&raw.display_text()),
    }
  }

  /// Profile of a live raw contact; `None` if it is missing or deleted.
  pub fn load<T: AggregationTx + ?Sized>(
    tx: &T,
    id: RawContactId,
    config: &AggregatorConfig,
  ) -> Result<Option<Self>> {
    let Some(raw) = tx.raw_contact(id)?.filter(RawContact::is_live) else {
      return Ok(None);
    };
    let points = tx.contact_points(id)?;
    Ok(Some(Self::new(&raw, &points, config)))
  }
}

/// Similarity of two names in `0.0..=1.0`, the better of comparing them in
/// written order and in sorted-token order.
pub fn name_similarity(a: &NormalizedName, b: &NormalizedName) -> f64 {
  if a.is_empty() || b.is_empty() {
    return 0.0;
  }
  normalized_levenshtein(&a.key(), &b.key())
    .max(normalized_levenshtein(&a.comparable(), &b.comparable()))
}

#[derive(Debug, Clone, Copy)]
pub struct MatchScorer {
  threshold: f64,
}

impl MatchScorer {
  pub fn new(config: &AggregatorConfig) -> Self {
    Self { threshold: config.approximate_threshold }
  }

  /// Score `subject` against the members of one aggregate. Exact if any
  /// member shares an exact-signal key with the subject.
  pub fn score(&self, subject: &MatchProfile, members: &[MatchProfile]) -> Score {
    let mut best = Score::NONE;
    for member in members.iter().filter(|m| m.id != subject.id) {
      if !subject.keys.is_disjoint(&member.keys) {
        return Score { strength: MatchStrength::Exact, similarity: 1.0 };
      }
      let similarity = name_similarity(&subject.name, &member.name);
      if similarity > best.similarity {
        best.similarity = similarity;
      }
    }
    if best.similarity >= self.threshold {
      best.strength = MatchStrength::Approximate;
    }
    best
  }
}
