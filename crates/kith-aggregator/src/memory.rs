//! In-memory backend.
//!
//! [`MemoryStore`] holds all state behind one mutex. A unit of work runs on a
//! clone of the state and replaces the original only if it returns `Ok`, so a
//! failed operation leaves nothing behind.

use std::{
  collections::{BTreeMap, BTreeSet},
  sync::{Mutex, MutexGuard},
};

use chrono::{DateTime, Utc};
use kith_core::{
  Error, Result,
  aggregate::{AggregateContact, AggregateSummary, AggregationSuggestion, ResolveReport},
  contact::{
    AggregateId, ContactPoint, NewRawContact, RawContact, RawContactId,
    RawContactUpdate,
  },
  exception::{AggregationException, ExceptionKey, ExceptionType},
  match_key::MatchKey,
  store::{AggregationTx, ContactStore},
};

use crate::{Aggregator, AggregatorConfig};

// ─── State ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct MemoryState {
  last_raw_contact_id: i64,
  last_aggregate_id:   i64,
  raw_contacts:        BTreeMap<RawContactId, RawContact>,
  contact_points:      BTreeMap<RawContactId, Vec<ContactPoint>>,
  match_keys:          BTreeMap<RawContactId, Vec<MatchKey>>,
  key_index:           BTreeMap<MatchKey, BTreeSet<RawContactId>>,
  aggregates:          BTreeMap<AggregateId, AggregateSummary>,
  exceptions:          BTreeMap<ExceptionKey, ExceptionType>,
}

impl MemoryState {
  fn unindex(&mut self, id: RawContactId) {
    for key in self.match_keys.remove(&id).unwrap_or_default() {
      if let Some(holders) = self.key_index.get_mut(&key) {
        holders.remove(&id);
        if holders.is_empty() {
          self.key_index.remove(&key);
        }
      }
    }
  }
}

impl AggregationTx for MemoryState {
  fn raw_contact(&self, id: RawContactId) -> Result<Option<RawContact>> {
    Ok(self.raw_contacts.get(&id).cloned())
  }

  fn insert_raw_contact(
    &mut self,
    input: &NewRawContact,
    now: DateTime<Utc>,
  ) -> Result<RawContact> {
    self.last_raw_contact_id += 1;
    let contact = RawContact {
      id:                RawContactId(self.last_raw_contact_id),
      aggregate_id:      None,
      account:           input.account.clone(),
      source_id:         input.source_id.clone(),
      deleted:           false,
      name:              input.name.clone(),
      display_name:      input.display_name.clone(),
      starred:           input.starred,
      send_to_voicemail: input.send_to_voicemail,
      custom_ringtone:   input.custom_ringtone.clone(),
      dirty:             true,
      version:           1,
      created_at:        now,
      updated_at:        now,
    };
    self.raw_contacts.insert(contact.id, contact.clone());
    Ok(contact)
  }

  fn update_raw_contact(&mut self, contact: &RawContact) -> Result<()> {
    let slot = self
      .raw_contacts
      .get_mut(&contact.id)
      .ok_or(Error::RawContactNotFound(contact.id))?;
    *slot = contact.clone();
    Ok(())
  }

  fn delete_raw_contact(&mut self, id: RawContactId) -> Result<()> {
    self
      .raw_contacts
      .remove(&id)
      .ok_or(Error::RawContactNotFound(id))?;
    self.contact_points.remove(&id);
    self.unindex(id);
    Ok(())
  }

  fn set_raw_contact_aggregate(
    &mut self,
    id: RawContactId,
    aggregate: Option<AggregateId>,
  ) -> Result<()> {
    let contact = self
      .raw_contacts
      .get_mut(&id)
      .ok_or(Error::RawContactNotFound(id))?;
    contact.aggregate_id = aggregate;
    Ok(())
  }

  fn live_raw_contact_ids(&self) -> Result<Vec<RawContactId>> {
    Ok(
      self
        .raw_contacts
        .values()
        .filter(|c| c.is_live())
        .map(|c| c.id)
        .collect(),
    )
  }

  fn raw_contacts_by_source_id(&self, source_id: &str) -> Result<Vec<RawContactId>> {
    Ok(
      self
        .raw_contacts
        .values()
        .filter(|c| c.source_id() == Some(source_id))
        .map(|c| c.id)
        .collect(),
    )
  }

  fn contact_points(&self, id: RawContactId) -> Result<Vec<ContactPoint>> {
    Ok(self.contact_points.get(&id).cloned().unwrap_or_default())
  }

  fn replace_contact_points(
    &mut self,
    id: RawContactId,
    points: &[ContactPoint],
  ) -> Result<()> {
    if points.is_empty() {
      self.contact_points.remove(&id);
    } else {
      self.contact_points.insert(id, points.to_vec());
    }
    Ok(())
  }

  fn match_keys(&self, id: RawContactId) -> Result<Vec<MatchKey>> {
    Ok(self.match_keys.get(&id).cloned().unwrap_or_default())
  }

  fn replace_match_keys(&mut self, id: RawContactId, keys: &[MatchKey]) -> Result<()> {
    self.unindex(id);
    if keys.is_empty() {
      return Ok(());
    }
    for key in keys {
      self.key_index.entry(key.clone()).or_default().insert(id);
    }
    self.match_keys.insert(id, keys.to_vec());
    Ok(())
  }

  fn raw_contacts_with_key(&self, key: &MatchKey) -> Result<Vec<RawContactId>> {
    Ok(
      self
        .key_index
        .get(key)
        .map(|holders| holders.iter().copied().collect())
        .unwrap_or_default(),
    )
  }

  fn create_aggregate(&mut self) -> Result<AggregateId> {
    self.last_aggregate_id += 1;
    let id = AggregateId(self.last_aggregate_id);
    self.aggregates.insert(id, AggregateSummary::default());
    Ok(id)
  }

  fn delete_aggregate(&mut self, id: AggregateId) -> Result<()> {
    self
      .aggregates
      .remove(&id)
      .ok_or(Error::AggregateNotFound(id))?;
    Ok(())
  }

  fn aggregate_summary(&self, id: AggregateId) -> Result<Option<AggregateSummary>> {
    Ok(self.aggregates.get(&id).cloned())
  }

  fn write_aggregate_summary(
    &mut self,
    id: AggregateId,
    summary: &AggregateSummary,
  ) -> Result<()> {
    let slot = self
      .aggregates
      .get_mut(&id)
      .ok_or(Error::AggregateNotFound(id))?;
    *slot = summary.clone();
    Ok(())
  }

  fn aggregate_members(&self, id: AggregateId) -> Result<Vec<RawContactId>> {
    Ok(
      self
        .raw_contacts
        .values()
        .filter(|c| c.aggregate_id == Some(id))
        .map(|c| c.id)
        .collect(),
    )
  }

  fn aggregate_by_lookup_key(&self, lookup_key: &str) -> Result<Option<AggregateId>> {
    Ok(
      self
        .aggregates
        .iter()
        .find(|(_, summary)| !summary.lookup_key.is_empty() && summary.lookup_key == lookup_key)
        .map(|(id, _)| *id),
    )
  }

  fn put_exception(&mut self, exception: &AggregationException) -> Result<()> {
    self.exceptions.insert(exception.key, exception.kind);
    Ok(())
  }

  fn remove_exception(&mut self, key: ExceptionKey) -> Result<()> {
    self.exceptions.remove(&key);
    Ok(())
  }

  fn exceptions_touching(&self, id: RawContactId) -> Result<Vec<AggregationException>> {
    Ok(
      self
        .exceptions
        .iter()
        .filter(|(key, _)| key.contains(id))
        .map(|(key, kind)| AggregationException { key: *key, kind: *kind })
        .collect(),
    )
  }
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A [`ContactStore`] that keeps everything in process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
  state:      Mutex<MemoryState>,
  aggregator: Aggregator,
}

impl MemoryStore {
  pub fn new(config: AggregatorConfig) -> Self {
    Self { state: Mutex::default(), aggregator: Aggregator::new(config) }
  }

  fn lock(&self) -> Result<MutexGuard<'_, MemoryState>> {
    self
      .state
      .lock()
      .map_err(|_| Error::Storage("memory store lock poisoned".into()))
  }

  /// Run `f` as one unit of work. Its writes become visible only if it
  /// returns `Ok`.
  pub fn transact<R>(
    &self,
    f: impl FnOnce(&Aggregator, &mut MemoryState) -> Result<R>,
  ) -> Result<R> {
    let mut guard = self.lock()?;
    let mut working = guard.clone();
    let out = f(&self.aggregator, &mut working)?;
    *guard = working;
    Ok(out)
  }

  pub fn read<R>(
    &self,
    f: impl FnOnce(&Aggregator, &MemoryState) -> Result<R>,
  ) -> Result<R> {
    let guard = self.lock()?;
    f(&self.aggregator, &guard)
  }
}

impl ContactStore for MemoryStore {
  type Error = Error;

  async fn insert_raw_contact(&self, input: NewRawContact) -> Result<RawContact> {
    self.transact(|agg, tx| agg.insert_raw_contact(tx, &input))
  }

  async fn update_raw_contact(
    &self,
    id: RawContactId,
    update: RawContactUpdate,
  ) -> Result<RawContact> {
    self.transact(|agg, tx| agg.update_raw_contact(tx, id, update))
  }

  async fn set_contact_points(
    &self,
    id: RawContactId,
    points: Vec<ContactPoint>,
  ) -> Result<()> {
    self.transact(|agg, tx| agg.set_contact_points(tx, id, &points))
  }

  async fn delete_raw_contact(&self, id: RawContactId) -> Result<()> {
    self.transact(|agg, tx| agg.delete_raw_contact(tx, id).map(drop))
  }

  async fn purge_raw_contact(&self, id: RawContactId) -> Result<()> {
    self.transact(|agg, tx| agg.purge_raw_contact(tx, id).map(drop))
  }

  async fn set_exception(
    &self,
    kind: ExceptionType,
    raw_contact_id1: RawContactId,
    raw_contact_id2: RawContactId,
  ) -> Result<()> {
    self.transact(|agg, tx| {
      agg
        .set_exception(tx, kind, raw_contact_id1, raw_contact_id2)
        .map(drop)
    })
  }

  async fn directives(&self, id: RawContactId) -> Result<Vec<AggregationException>> {
    self.read(|agg, tx| agg.directives(tx, id))
  }

  async fn get_raw_contact(&self, id: RawContactId) -> Result<Option<RawContact>> {
    self.read(|_, tx| tx.raw_contact(id))
  }

  async fn contact_points(&self, id: RawContactId) -> Result<Vec<ContactPoint>> {
    self.read(|_, tx| tx.contact_points(id))
  }

  async fn aggregate_for_raw_contact(
    &self,
    id: RawContactId,
  ) -> Result<Option<AggregateId>> {
    self.read(|agg, tx| agg.aggregate_for_raw_contact(tx, id))
  }

  async fn get_aggregate(&self, id: AggregateId) -> Result<Option<AggregateContact>> {
    self.read(|agg, tx| agg.aggregate(tx, id))
  }

  async fn resolve_lookup_key(&self, lookup_key: &str) -> Result<AggregateId> {
    self.read(|agg, tx| agg.resolve_lookup_key(tx, lookup_key))
  }

  async fn suggestions(&self, id: AggregateId) -> Result<Vec<AggregationSuggestion>> {
    self.read(|agg, tx| agg.suggestions(tx, id))
  }

  async fn reaggregate_all(&self) -> Result<ResolveReport> {
    self.transact(|agg, tx| agg.reaggregate_all(tx))
  }
}
