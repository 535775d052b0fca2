//! The cluster resolver.
//!
//! A trigger names one or more raw contacts. The resolver collects every raw
//! contact transitively connected to them (by current co-membership, shared
//! exact-signal keys, or a KEEP_IN directive), repartitions that universe from
//! scratch, and writes back only what changed. Because the partition depends
//! only on the universe's keys and directives, resolving the same state twice
//! produces no writes the second time.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use kith_core::{
  Error, Result,
  aggregate::ResolveReport,
  contact::{AggregateId, RawContact, RawContactId},
  exception::{ExceptionKey, ExceptionType},
  store::AggregationTx,
};
use tracing::{debug, info};

use crate::{
  Aggregator,
  candidates::{exact_partners, match_keys},
  dsu::{MergeOutcome, Partition},
  summary::{Member, summarize},
};

// ─── Universe ────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct Universe {
  contacts:   BTreeMap<RawContactId, RawContact>,
  /// Aggregates currently holding a member of the universe.
  aggregates: BTreeSet<AggregateId>,
  exact:      BTreeSet<(RawContactId, RawContactId)>,
  keep_in:    BTreeSet<ExceptionKey>,
  keep_apart: BTreeSet<ExceptionKey>,
}

impl Universe {
  fn collect<T: AggregationTx + ?Sized>(
    tx: &T,
    seeds: impl IntoIterator<Item = RawContactId>,
  ) -> Result<Self> {
    let mut universe = Self::default();
    let mut directives = BTreeMap::new();
    let mut seen = BTreeSet::new();
    let mut queue: VecDeque<RawContactId> = seeds.into_iter().collect();

    while let Some(id) = queue.pop_front() {
      if !seen.insert(id) {
        continue;
      }
      let Some(raw) = tx.raw_contact(id)?.filter(RawContact::is_live) else {
        continue;
      };

      let mut neighbours = BTreeSet::new();
      if let Some(aggregate) = raw.aggregate_id {
        universe.aggregates.insert(aggregate);
        neighbours.extend(tx.aggregate_members(aggregate)?);
      }
      for partner in exact_partners(tx, id, &tx.match_keys(id)?)? {
        universe.exact.insert((id.min(partner), id.max(partner)));
        neighbours.insert(partner);
      }
      for exception in tx.exceptions_touching(id)? {
        directives.insert(exception.key, exception.kind);
        if exception.kind == ExceptionType::KeepIn
          && let Some(other) = exception.key.other(id)
        {
          neighbours.insert(other);
        }
      }

      universe.contacts.insert(id, raw);
      queue.extend(neighbours.into_iter().filter(|n| !seen.contains(n)));
    }

    // Edges to deleted or missing raw contacts carry no weight.
    let live = |a: &RawContactId, b: &RawContactId| {
      universe.contacts.contains_key(a) && universe.contacts.contains_key(b)
    };
    universe.exact.retain(|(a, b)| live(a, b));
    for (key, kind) in directives {
      if !live(&key.low(), &key.high()) {
        continue;
      }
      if kind == ExceptionType::KeepIn {
        universe.keep_in.insert(key);
      } else if kind.is_separation() {
        universe.keep_apart.insert(key);
      }
    }
    Ok(universe)
  }

  fn ids(&self) -> BTreeSet<RawContactId> {
    self.contacts.keys().copied().collect()
  }

  /// Separations first, then KEEP_IN unions, then exact-match unions.
  fn partition(&self) -> Vec<Vec<RawContactId>> {
    let mut partition = Partition::new(self.contacts.keys().copied());
    for key in &self.keep_apart {
      partition.keep_apart(key.low(), key.high());
    }
    for key in &self.keep_in {
      if partition.union(key.low(), key.high()) == MergeOutcome::Blocked {
        debug!(low = %key.low(), high = %key.high(), "keep-in overridden by a separation");
      }
    }
    for &(a, b) in &self.exact {
      partition.union(a, b);
    }
    partition.groups()
  }
}

// ─── Resolution ──────────────────────────────────────────────────────────────

impl Aggregator {
  /// Regenerate and store the match keys of `raw`, skipping the write when
  /// they are unchanged.
  pub(crate) fn refresh_match_keys<T: AggregationTx + ?Sized>(
    &self,
    tx: &mut T,
    raw: &RawContact,
  ) -> Result<()> {
    let points = if raw.is_live() { tx.contact_points(raw.id)? } else { Vec::new() };
    let keys = match_keys(raw, &points, &self.config);
    let mut stored = tx.match_keys(raw.id)?;
    stored.sort();
    if stored != keys {
      tx.replace_match_keys(raw.id, &keys)?;
    }
    Ok(())
  }

  /// Trigger for a changed raw contact: refresh its keys and re-resolve
  /// everything connected to it. A deleted raw contact is detached instead.
  pub fn on_raw_contact_changed<T: AggregationTx + ?Sized>(
    &self,
    tx: &mut T,
    id: RawContactId,
  ) -> Result<ResolveReport> {
    let raw = tx.raw_contact(id)?.ok_or(Error::RawContactNotFound(id))?;
    self.refresh_match_keys(tx, &raw)?;
    if raw.deleted {
      return self.detach(tx, &raw);
    }
    Ok(self.resolve(tx, [id])?.0)
  }

  /// Trigger for a written or cleared directive between `a` and `b`.
  pub fn on_exception_changed<T: AggregationTx + ?Sized>(
    &self,
    tx: &mut T,
    a: RawContactId,
    b: RawContactId,
  ) -> Result<ResolveReport> {
    Ok(self.resolve(tx, [a, b])?.0)
  }

  /// Remove a deleted raw contact from its aggregate and re-resolve whoever
  /// is left behind.
  pub(crate) fn detach<T: AggregationTx + ?Sized>(
    &self,
    tx: &mut T,
    raw: &RawContact,
  ) -> Result<ResolveReport> {
    let Some(previous) = raw.aggregate_id else {
      return Ok(ResolveReport::default());
    };
    tx.set_raw_contact_aggregate(raw.id, None)?;
    let mut report = ResolveReport { moved: 1, ..ResolveReport::default() };
    report.absorb(self.resolve_former_members(tx, previous)?);
    Ok(report)
  }

  /// Re-resolve the remaining members of `aggregate`, or delete it when none
  /// are left.
  pub(crate) fn resolve_former_members<T: AggregationTx + ?Sized>(
    &self,
    tx: &mut T,
    aggregate: AggregateId,
  ) -> Result<ResolveReport> {
    let remaining = tx.aggregate_members(aggregate)?;
    if remaining.is_empty() {
      tx.delete_aggregate(aggregate)?;
      return Ok(ResolveReport { aggregates_deleted: 1, ..ResolveReport::default() });
    }
    Ok(self.resolve(tx, remaining)?.0)
  }

  /// Resolve the universe around `seeds`. Also returns the universe, so a
  /// sweep can skip raw contacts already covered.
  pub(crate) fn resolve<T: AggregationTx + ?Sized>(
    &self,
    tx: &mut T,
    seeds: impl IntoIterator<Item = RawContactId>,
  ) -> Result<(ResolveReport, BTreeSet<RawContactId>)> {
    let universe = Universe::collect(&*tx, seeds)?;
    if universe.contacts.is_empty() {
      return Ok((ResolveReport::default(), BTreeSet::new()));
    }
    let groups = universe.partition();
    let report = self.apply(tx, &universe, groups)?;
    debug!(
      universe = universe.contacts.len(),
      moved = report.moved,
      created = report.aggregates_created,
      deleted = report.aggregates_deleted,
      "resolved aggregation universe"
    );
    Ok((report, universe.ids()))
  }

  fn apply<T: AggregationTx + ?Sized>(
    &self,
    tx: &mut T,
    universe: &Universe,
    mut groups: Vec<Vec<RawContactId>>,
  ) -> Result<ResolveReport> {
    let mut report =
      ResolveReport { examined: universe.contacts.len(), ..ResolveReport::default() };

    // Largest groups choose their identity first.
    groups.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.first().cmp(&b.first())));

    let mut claimed = BTreeSet::new();
    let mut assignments = Vec::with_capacity(groups.len());
    for group in groups {
      let mut votes: BTreeMap<AggregateId, usize> = BTreeMap::new();
      for id in &group {
        if let Some(aggregate) = universe.contacts[id].aggregate_id {
          *votes.entry(aggregate).or_default() += 1;
        }
      }
      let inherited = votes
        .into_iter()
        .filter(|(aggregate, _)| !claimed.contains(aggregate))
        .max_by(|(a, a_votes), (b, b_votes)| a_votes.cmp(b_votes).then_with(|| b.cmp(a)))
        .map(|(aggregate, _)| aggregate);
      let target = match inherited {
        Some(aggregate) => aggregate,
        None => {
          report.aggregates_created += 1;
          tx.create_aggregate()?
        }
      };
      claimed.insert(target);
      assignments.push((target, group));
    }

    for (target, group) in &assignments {
      for id in group {
        if universe.contacts[id].aggregate_id != Some(*target) {
          tx.set_raw_contact_aggregate(*id, Some(*target))?;
          report.moved += 1;
        }
      }
    }

    for aggregate in universe.aggregates.difference(&claimed) {
      tx.delete_aggregate(*aggregate)?;
      report.aggregates_deleted += 1;
    }

    for (target, group) in &assignments {
      let points = group
        .iter()
        .map(|id| tx.contact_points(*id))
        .collect::<Result<Vec<_>>>()?;
      let members: Vec<Member<'_>> = group
        .iter()
        .zip(&points)
        .map(|(id, points)| Member { raw: &universe.contacts[id], points })
        .collect();
      let summary = summarize(&members);
      if tx.aggregate_summary(*target)?.as_ref() != Some(&summary) {
        tx.write_aggregate_summary(*target, &summary)?;
        report.aggregates_updated += 1;
      }
    }

    Ok(report)
  }

  /// Regenerate every live raw contact's keys, then resolve all of them.
  /// Running it on an already consistent store reports no changes.
  pub fn reaggregate_all<T: AggregationTx + ?Sized>(
    &self,
    tx: &mut T,
  ) -> Result<ResolveReport> {
    let ids = tx.live_raw_contact_ids()?;
    for id in &ids {
      if let Some(raw) = tx.raw_contact(*id)? {
        self.refresh_match_keys(tx, &raw)?;
      }
    }

    let mut report = ResolveReport::default();
    let mut covered = BTreeSet::new();
    for id in ids {
      if covered.contains(&id) {
        continue;
      }
      let (resolved, universe) = self.resolve(tx, [id])?;
      report.absorb(resolved);
      covered.extend(universe);
    }
    info!(
      examined = report.examined,
      moved = report.moved,
      created = report.aggregates_created,
      deleted = report.aggregates_deleted,
      updated = report.aggregates_updated,
      "re-aggregation sweep finished"
    );
    Ok(report)
  }
}
