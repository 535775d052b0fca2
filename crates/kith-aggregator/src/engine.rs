//! [`Aggregator`]: the engine entry points a backend calls inside one unit of
//! work. Every write here ends by running the matching trigger, so the
//! aggregation state is consistent again before the unit of work commits.

use std::collections::BTreeSet;

use chrono::Utc;
use kith_core::{
  Error, Result,
  aggregate::{AggregateContact, ResolveReport},
  contact::{
    AggregateId, ContactPoint, NewRawContact, RawContact, RawContactId,
    RawContactUpdate,
  },
  exception::{AggregationException, ExceptionType},
  store::AggregationTx,
};
use tracing::debug;

use crate::{
  candidates::{find_candidates, match_keys},
  config::AggregatorConfig,
  exceptions,
  score::MatchScorer,
};

#[derive(Debug, Clone)]
pub struct Aggregator {
  pub(crate) config: AggregatorConfig,
  pub(crate) scorer: MatchScorer,
}

impl Default for Aggregator {
  fn default() -> Self { Self::new(AggregatorConfig::default()) }
}

impl Aggregator {
  pub fn new(config: AggregatorConfig) -> Self {
    let scorer = MatchScorer::new(&config);
    Self { config, scorer }
  }

  pub fn config(&self) -> &AggregatorConfig { &self.config }

  fn load<T: AggregationTx + ?Sized>(tx: &T, id: RawContactId) -> Result<RawContact> {
    tx.raw_contact(id)?.ok_or(Error::RawContactNotFound(id))
  }

  /// Record a data change on `raw` and persist it.
  fn touch<T: AggregationTx + ?Sized>(tx: &mut T, raw: &mut RawContact) -> Result<()> {
    raw.version += 1;
    raw.dirty = true;
    raw.updated_at = Utc::now();
    tx.update_raw_contact(raw)
  }

  // ─── Raw contact writes ───────────────────────────────────────────────────

  pub fn insert_raw_contact<T: AggregationTx + ?Sized>(
    &self,
    tx: &mut T,
    input: &NewRawContact,
  ) -> Result<RawContact> {
    let raw = tx.insert_raw_contact(input, Utc::now())?;
    if !input.contact_points.is_empty() {
      tx.replace_contact_points(raw.id, &input.contact_points)?;
    }
    debug!(id = %raw.id, "inserted raw contact");
    self.on_raw_contact_changed(tx, raw.id)?;
    Self::load(tx, raw.id)
  }

  /// Apply `update`; a no-op update writes nothing and triggers nothing.
  pub fn update_raw_contact<T: AggregationTx + ?Sized>(
    &self,
    tx: &mut T,
    id: RawContactId,
    update: RawContactUpdate,
  ) -> Result<RawContact> {
    let mut raw = Self::load(tx, id)?;
    if update.apply_to(&mut raw) {
      Self::touch(tx, &mut raw)?;
      self.on_raw_contact_changed(tx, id)?;
    }
    Self::load(tx, id)
  }

  pub fn set_contact_points<T: AggregationTx + ?Sized>(
    &self,
    tx: &mut T,
    id: RawContactId,
    points: &[ContactPoint],
  ) -> Result<()> {
    let mut raw = Self::load(tx, id)?;
    if tx.contact_points(id)? == points {
      return Ok(());
    }
    tx.replace_contact_points(id, points)?;
    Self::touch(tx, &mut raw)?;
    self.on_raw_contact_changed(tx, id)?;
    Ok(())
  }

  /// Soft delete. The row and its directives stay; it leaves its aggregate
  /// and no longer matches anything.
  pub fn delete_raw_contact<T: AggregationTx + ?Sized>(
    &self,
    tx: &mut T,
    id: RawContactId,
  ) -> Result<ResolveReport> {
    let mut raw = Self::load(tx, id)?;
    if raw.deleted {
      return Ok(ResolveReport::default());
    }
    raw.deleted = true;
    Self::touch(tx, &mut raw)?;
    self.on_raw_contact_changed(tx, id)
  }

  /// Hard delete: the row, its data, its match keys, and every directive
  /// naming it are removed, then former co-members and KEEP_IN partners are
  /// re-resolved.
  pub fn purge_raw_contact<T: AggregationTx + ?Sized>(
    &self,
    tx: &mut T,
    id: RawContactId,
  ) -> Result<ResolveReport> {
    let raw = Self::load(tx, id)?;
    let mut partners = BTreeSet::new();
    for exception in tx.exceptions_touching(id)? {
      tx.remove_exception(exception.key)?;
      partners.extend(exception.key.other(id));
    }
    if raw.aggregate_id.is_some() {
      tx.set_raw_contact_aggregate(id, None)?;
    }
    tx.delete_raw_contact(id)?;
    debug!(%id, "purged raw contact");

    let mut report = ResolveReport::default();
    if let Some(previous) = raw.aggregate_id {
      report.moved += 1;
      report.absorb(self.resolve_former_members(tx, previous)?);
    }
    report.absorb(self.resolve(tx, partners)?.0);
    Ok(report)
  }

  // ─── Exceptions ───────────────────────────────────────────────────────────

  pub fn set_exception<T: AggregationTx + ?Sized>(
    &self,
    tx: &mut T,
    kind: ExceptionType,
    a: RawContactId,
    b: RawContactId,
  ) -> Result<ResolveReport> {
    let key = exceptions::write_exception(tx, kind, a, b)?;
    self.on_exception_changed(tx, key.low(), key.high())
  }

  pub fn directives<T: AggregationTx + ?Sized>(
    &self,
    tx: &T,
    id: RawContactId,
  ) -> Result<Vec<AggregationException>> {
    Self::load(tx, id)?;
    exceptions::directives(tx, id)
  }

  // ─── Reads ────────────────────────────────────────────────────────────────

  /// The aggregates an as-yet-unaggregated view of `id` would exactly match,
  /// computed from its current data rather than its stored keys.
  pub fn find_candidates<T: AggregationTx + ?Sized>(
    &self,
    tx: &T,
    id: RawContactId,
  ) -> Result<BTreeSet<AggregateId>> {
    let raw = Self::load(tx, id)?;
    let points = tx.contact_points(id)?;
    let keys = match_keys(&raw, &points, &self.config);
    find_candidates(tx, id, &keys)
  }

  pub fn aggregate_for_raw_contact<T: AggregationTx + ?Sized>(
    &self,
    tx: &T,
    id: RawContactId,
  ) -> Result<Option<AggregateId>> {
    Ok(Self::load(tx, id)?.aggregate_id)
  }

  pub fn aggregate<T: AggregationTx + ?Sized>(
    &self,
    tx: &T,
    id: AggregateId,
  ) -> Result<Option<AggregateContact>> {
    let Some(summary) = tx.aggregate_summary(id)? else {
      return Ok(None);
    };
    let member_ids = tx.aggregate_members(id)?;
    Ok(Some(AggregateContact { id, summary, member_ids }))
  }
}
