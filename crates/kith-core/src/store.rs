//! Storage seams.
//!
//! [`AggregationTx`] is one open unit of work against a backend: the
//! aggregation engine runs synchronously over it and the backend commits or
//! discards everything at once. [`ContactStore`] is the async surface a
//! backend exposes to callers; every write method runs its data change and
//! the resulting aggregation inside a single unit of work.

use std::future::Future;

use chrono::{DateTime, Utc};

use crate::{
  Result,
  aggregate::{AggregateContact, AggregateSummary, AggregationSuggestion, ResolveReport},
  contact::{
    AggregateId, ContactPoint, NewRawContact, RawContact, RawContactId,
    RawContactUpdate,
  },
  exception::{AggregationException, ExceptionKey, ExceptionType},
  match_key::MatchKey,
};

// ─── Unit of work ────────────────────────────────────────────────────────────

/// Reads and writes available to the aggregation engine inside one
/// transaction. Implementations must make every write invisible to other
/// readers until the surrounding transaction commits.
pub trait AggregationTx {
  // ── Raw contacts ──────────────────────────────────────────────────────

  fn raw_contact(&self, id: RawContactId) -> Result<Option<RawContact>>;

  /// Persist a new raw contact with no aggregate and no contact points.
  fn insert_raw_contact(
    &mut self,
    input: &NewRawContact,
    now: DateTime<Utc>,
  ) -> Result<RawContact>;

  /// Overwrite every stored column of an existing raw contact.
  fn update_raw_contact(&mut self, contact: &RawContact) -> Result<()>;

  /// Remove a raw contact together with its contact points and match keys.
  fn delete_raw_contact(&mut self, id: RawContactId) -> Result<()>;

  fn set_raw_contact_aggregate(
    &mut self,
    id: RawContactId,
    aggregate: Option<AggregateId>,
  ) -> Result<()>;

  /// Ids of all raw contacts not flagged deleted, ascending.
  fn live_raw_contact_ids(&self) -> Result<Vec<RawContactId>>;

  /// Raw contacts (live or not) with exactly this source id.
  fn raw_contacts_by_source_id(&self, source_id: &str) -> Result<Vec<RawContactId>>;

  // ── Contact points ────────────────────────────────────────────────────

  fn contact_points(&self, id: RawContactId) -> Result<Vec<ContactPoint>>;

  fn replace_contact_points(
    &mut self,
    id: RawContactId,
    points: &[ContactPoint],
  ) -> Result<()>;

  // ── Match keys ────────────────────────────────────────────────────────

  fn match_keys(&self, id: RawContactId) -> Result<Vec<MatchKey>>;

  fn replace_match_keys(&mut self, id: RawContactId, keys: &[MatchKey]) -> Result<()>;

  /// Raw contacts holding `key`, ascending.
  fn raw_contacts_with_key(&self, key: &MatchKey) -> Result<Vec<RawContactId>>;

  // ── Aggregates ────────────────────────────────────────────────────────

  /// Allocate a new aggregate id. The caller assigns members and writes the
  /// summary before the unit of work ends.
  fn create_aggregate(&mut self) -> Result<AggregateId>;

  fn delete_aggregate(&mut self, id: AggregateId) -> Result<()>;

  fn aggregate_summary(&self, id: AggregateId) -> Result<Option<AggregateSummary>>;

  fn write_aggregate_summary(
    &mut self,
    id: AggregateId,
    summary: &AggregateSummary,
  ) -> Result<()>;

  /// Raw contacts currently assigned to `id`, ascending.
  fn aggregate_members(&self, id: AggregateId) -> Result<Vec<RawContactId>>;

  fn aggregate_by_lookup_key(&self, lookup_key: &str) -> Result<Option<AggregateId>>;

  // ── Exceptions ────────────────────────────────────────────────────────

  /// Insert or replace the directive for `exception.key`.
  fn put_exception(&mut self, exception: &AggregationException) -> Result<()>;

  fn remove_exception(&mut self, key: ExceptionKey) -> Result<()>;

  /// Directives naming `id` on either side.
  fn exceptions_touching(&self, id: RawContactId) -> Result<Vec<AggregationException>>;
}

// ─── Async surface ───────────────────────────────────────────────────────────

/// Abstraction over a contacts store backend.
///
/// All methods return `Send` futures so the trait can be used from
/// multi-threaded async runtimes.
pub trait ContactStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Raw contact writes ────────────────────────────────────────────────

  /// Insert a raw contact with its contact points and aggregate it.
  fn insert_raw_contact(
    &self,
    input: NewRawContact,
  ) -> impl Future<Output = Result<RawContact, Self::Error>> + Send + '_;

  fn update_raw_contact(
    &self,
    id: RawContactId,
    update: RawContactUpdate,
  ) -> impl Future<Output = Result<RawContact, Self::Error>> + Send + '_;

  /// Replace all contact points of a raw contact and re-aggregate it.
  fn set_contact_points(
    &self,
    id: RawContactId,
    points: Vec<ContactPoint>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Soft delete: flag the raw contact and detach it from its aggregate.
  fn delete_raw_contact(
    &self,
    id: RawContactId,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Hard delete: remove the raw contact, its data, and its directives.
  fn purge_raw_contact(
    &self,
    id: RawContactId,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Exceptions ────────────────────────────────────────────────────────

  /// Write a directive (`Automatic` clears it) and re-aggregate the pair.
  fn set_exception(
    &self,
    kind: ExceptionType,
    raw_contact_id1: RawContactId,
    raw_contact_id2: RawContactId,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn directives(
    &self,
    id: RawContactId,
  ) -> impl Future<Output = Result<Vec<AggregationException>, Self::Error>> + Send + '_;

  // ── Reads ─────────────────────────────────────────────────────────────

  fn get_raw_contact(
    &self,
    id: RawContactId,
  ) -> impl Future<Output = Result<Option<RawContact>, Self::Error>> + Send + '_;

  fn contact_points(
    &self,
    id: RawContactId,
  ) -> impl Future<Output = Result<Vec<ContactPoint>, Self::Error>> + Send + '_;

  fn aggregate_for_raw_contact(
    &self,
    id: RawContactId,
  ) -> impl Future<Output = Result<Option<AggregateId>, Self::Error>> + Send + '_;

  fn get_aggregate(
    &self,
    id: AggregateId,
  ) -> impl Future<Output = Result<Option<AggregateContact>, Self::Error>> + Send + '_;

  /// Resolve a lookup key to the aggregate that now best represents it.
  fn resolve_lookup_key<'a>(
    &'a self,
    lookup_key: &'a str,
  ) -> impl Future<Output = Result<AggregateId, Self::Error>> + Send + 'a;

  fn suggestions(
    &self,
    id: AggregateId,
  ) -> impl Future<Output = Result<Vec<AggregationSuggestion>, Self::Error>> + Send + '_;

  // ── Maintenance ───────────────────────────────────────────────────────

  /// Re-aggregate every live raw contact. Idempotent.
  fn reaggregate_all(
    &self,
  ) -> impl Future<Output = Result<ResolveReport, Self::Error>> + Send + '_;
}
