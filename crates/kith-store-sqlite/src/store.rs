//! [`SqliteStore`] — the SQLite implementation of [`ContactStore`].

use std::{path::Path, sync::Arc};

use kith_aggregator::{Aggregator, AggregatorConfig};
use kith_core::{
  aggregate::{AggregateContact, AggregationSuggestion, ResolveReport},
  contact::{
    AggregateId, ContactPoint, NewRawContact, RawContact, RawContactId,
    RawContactUpdate,
  },
  exception::{AggregationException, ExceptionType},
  store::{AggregationTx, ContactStore},
};
use rusqlite::TransactionBehavior;
use tracing::debug;

use crate::{Result, intern::InternCache, schema::SCHEMA, tx::SqliteTx};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Kith contact store backed by a single SQLite file.
///
/// Cloning is cheap — the connection, the interning cache, and the engine are
/// all shared.
#[derive(Clone)]
pub struct SqliteStore {
  conn:       tokio_rusqlite::Connection,
  cache:      Arc<InternCache>,
  aggregator: Arc<Aggregator>,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>, config: AggregatorConfig) -> Result<Self> {
    let path = path.as_ref();
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self::with_connection(conn, config);
    store.init_schema().await?;
    debug!(path = %path.display(), "opened sqlite contact store");
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory(config: AggregatorConfig) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self::with_connection(conn, config);
    store.init_schema().await?;
    Ok(store)
  }

  fn with_connection(conn: tokio_rusqlite::Connection, config: AggregatorConfig) -> Self {
    Self {
      conn,
      cache: Arc::new(InternCache::default()),
      aggregator: Arc::new(Aggregator::new(config)),
    }
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Run `f` inside one IMMEDIATE transaction, which takes the database's
  /// write lock up front. The transaction commits only if `f` returns `Ok`;
  /// otherwise it is rolled back and nothing `f` wrote is visible.
  pub async fn transact<R, F>(&self, f: F) -> Result<R>
  where
    F: FnOnce(&Aggregator, &mut SqliteTx<'_>) -> kith_core::Result<R> + Send + 'static,
    R: Send + 'static,
  {
    let aggregator = Arc::clone(&self.aggregator);
    let cache = Arc::clone(&self.cache);
    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut unit = SqliteTx::new(&tx, &cache);
        let out = match f(aggregator.as_ref(), &mut unit) {
          Ok(out) => out,
          Err(err) => {
            debug!(error = %err, "rolling back unit of work");
            return Ok(Err(err));
          }
        };
        let learned = unit.into_learned();
        tx.commit()?;
        cache.publish(learned);
        Ok(Ok(out))
      })
      .await?;
    Ok(outcome?)
  }

  /// Run a read-only `f` against the current committed state.
  pub async fn read<R, F>(&self, f: F) -> Result<R>
  where
    F: FnOnce(&Aggregator, &SqliteTx<'_>) -> kith_core::Result<R> + Send + 'static,
    R: Send + 'static,
  {
    let aggregator = Arc::clone(&self.aggregator);
    let cache = Arc::clone(&self.cache);
    let outcome = self
      .conn
      .call(move |conn| {
        let unit = SqliteTx::new(conn, &cache);
        Ok(f(aggregator.as_ref(), &unit))
      })
      .await?;
    Ok(outcome?)
  }
}

// ─── ContactStore impl ───────────────────────────────────────────────────────

impl ContactStore for SqliteStore {
  type Error = crate::Error;

  // ── Raw contact writes ────────────────────────────────────────────────────

  async fn insert_raw_contact(&self, input: NewRawContact) -> Result<RawContact> {
    self
      .transact(move |agg, tx| agg.insert_raw_contact(tx, &input))
      .await
  }

  async fn update_raw_contact(
    &self,
    id: RawContactId,
    update: RawContactUpdate,
  ) -> Result<RawContact> {
    self
      .transact(move |agg, tx| agg.update_raw_contact(tx, id, update))
      .await
  }

  async fn set_contact_points(
    &self,
    id: RawContactId,
    points: Vec<ContactPoint>,
  ) -> Result<()> {
    self
      .transact(move |agg, tx| agg.set_contact_points(tx, id, &points))
      .await
  }

  async fn delete_raw_contact(&self, id: RawContactId) -> Result<()> {
    self
      .transact(move |agg, tx| agg.delete_raw_contact(tx, id).map(drop))
      .await
  }

  async fn purge_raw_contact(&self, id: RawContactId) -> Result<()> {
    self
      .transact(move |agg, tx| agg.purge_raw_contact(tx, id).map(drop))
      .await
  }

  // ── Exceptions ────────────────────────────────────────────────────────────

  async fn set_exception(
    &self,
    kind: ExceptionType,
    raw_contact_id1: RawContactId,
    raw_contact_id2: RawContactId,
  ) -> Result<()> {
    self
      .transact(move |agg, tx| {
        agg
          .set_exception(tx, kind, raw_contact_id1, raw_contact_id2)
          .map(drop)
      })
      .await
  }

  async fn directives(&self, id: RawContactId) -> Result<Vec<AggregationException>> {
    self.read(move |agg, tx| agg.directives(tx, id)).await
  }

  // ── Reads ─────────────────────────────────────────────────────────────────

  async fn get_raw_contact(&self, id: RawContactId) -> Result<Option<RawContact>> {
    self.read(move |_, tx| tx.raw_contact(id)).await
  }

  async fn contact_points(&self, id: RawContactId) -> Result<Vec<ContactPoint>> {
    self.read(move |_, tx| tx.contact_points(id)).await
  }

  async fn aggregate_for_raw_contact(
    &self,
    id: RawContactId,
  ) -> Result<Option<AggregateId>> {
    self
      .read(move |agg, tx| agg.aggregate_for_raw_contact(tx, id))
      .await
  }

  async fn get_aggregate(&self, id: AggregateId) -> Result<Option<AggregateContact>> {
    self.read(move |agg, tx| agg.aggregate(tx, id)).await
  }

  async fn resolve_lookup_key(&self, lookup_key: &str) -> Result<AggregateId> {
    let text = lookup_key.to_owned();
    self
      .read(move |agg, tx| agg.resolve_lookup_key(tx, &text))
      .await
  }

  async fn suggestions(&self, id: AggregateId) -> Result<Vec<AggregationSuggestion>> {
    self.read(move |agg, tx| agg.suggestions(tx, id)).await
  }

  // ── Maintenance ───────────────────────────────────────────────────────────

  async fn reaggregate_all(&self) -> Result<ResolveReport> {
    self.transact(|agg, tx| agg.reaggregate_all(tx)).await
  }
}
