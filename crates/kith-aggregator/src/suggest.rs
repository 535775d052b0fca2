//! Aggregation suggestions: aggregates whose names are close to one of ours
//! but which share no exact signal with it.

use std::collections::{BTreeMap, BTreeSet};

use kith_core::{
  Error, Result,
  aggregate::AggregationSuggestion,
  contact::{AggregateId, RawContactId},
  store::AggregationTx,
};

use crate::{
  Aggregator,
  score::{MatchProfile, MatchStrength},
};

impl Aggregator {
  pub fn suggestions<T: AggregationTx + ?Sized>(
    &self,
    tx: &T,
    id: AggregateId,
  ) -> Result<Vec<AggregationSuggestion>> {
    let members = tx.aggregate_members(id)?;
    if members.is_empty() {
      return Err(Error::AggregateNotFound(id));
    }

    let mut own = Vec::with_capacity(members.len());
    let mut kept_apart: BTreeSet<RawContactId> = BTreeSet::new();
    for member in &members {
      own.extend(MatchProfile::load(tx, *member, &self.config)?);
      for exception in tx.exceptions_touching(*member)? {
        if exception.kind.is_separation() {
          kept_apart.extend(exception.key.other(*member));
        }
      }
    }

    let mut others: BTreeMap<AggregateId, Vec<MatchProfile>> = BTreeMap::new();
    for other in tx.live_raw_contact_ids()? {
      let Some(raw) = tx.raw_contact(other)? else { continue };
      let Some(aggregate) = raw.aggregate_id.filter(|a| *a != id) else {
        continue;
      };
      let points = tx.contact_points(other)?;
      others
        .entry(aggregate)
        .or_default()
        .push(MatchProfile::new(&raw, &points, &self.config));
    }

    let mut suggestions = Vec::new();
    'aggregates: for (aggregate, profiles) in others {
      if profiles.iter().any(|p| kept_apart.contains(&p.id)) {
        continue;
      }
      let mut best: Option<f64> = None;
      for subject in &own {
        let score = self.scorer.score(subject, &profiles);
        match score.strength {
          MatchStrength::Exact => continue 'aggregates,
          MatchStrength::Approximate => {
            best = Some(best.map_or(score.similarity, |b| b.max(score.similarity)));
          }
          MatchStrength::None => {}
        }
      }
      if let Some(similarity) = best {
        let display_name = tx
          .aggregate_summary(aggregate)?
          .and_then(|summary| summary.display_name);
        suggestions.push(AggregationSuggestion {
          aggregate_id: aggregate,
          display_name,
          similarity,
        });
      }
    }

    suggestions.sort_by(|a, b| {
      b.similarity
        .total_cmp(&a.similarity)
        .then_with(|| a.aggregate_id.cmp(&b.aggregate_id))
    });
    suggestions.truncate(self.config.suggestion_limit);
    Ok(suggestions)
  }
}
