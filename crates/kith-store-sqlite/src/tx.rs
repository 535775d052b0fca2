//! [`SqliteTx`] — the aggregation engine's unit of work over one SQLite
//! connection or open transaction.

use chrono::{DateTime, Utc};
use kith_core::{
  Error as CoreError, Result,
  aggregate::AggregateSummary,
  contact::{
    Account, AggregateId, ContactPoint, NewRawContact, RawContact, RawContactId,
  },
  exception::{AggregationException, ExceptionKey, ExceptionType},
  match_key::{MatchKey, MatchKind},
  store::AggregationTx,
};
use rusqlite::{Connection, OptionalExtension as _, params};

use crate::{
  encode::{
    AGGREGATE_SELECT, AggregateRow, RAW_CONTACT_SELECT, RawContactRow,
    decode_enum, encode_dt, encode_name, encode_version,
  },
  intern::{self, InternCache, Learned},
};

/// Wrap any backend error as an engine storage error.
trait StorageExt<T> {
  fn storage(self) -> Result<T>;
}

impl<T, E> StorageExt<T> for std::result::Result<T, E>
where
  E: std::error::Error + Send + Sync + 'static,
{
  fn storage(self) -> Result<T> {
    self.map_err(|e| CoreError::Storage(Box::new(e)))
  }
}

fn ids<T>(
  conn: &Connection,
  sql: &str,
  params: impl rusqlite::Params,
  wrap: fn(i64) -> T,
) -> Result<Vec<T>> {
  let mut stmt = conn.prepare_cached(sql).storage()?;
  let found = stmt
    .query_map(params, |row| row.get::<_, i64>(0))
    .storage()?
    .map(|id| id.map(wrap))
    .collect::<rusqlite::Result<Vec<_>>>()
    .storage()?;
  Ok(found)
}

pub struct SqliteTx<'a> {
  conn:    &'a Connection,
  cache:   &'a InternCache,
  learned: Vec<Learned>,
}

impl<'a> SqliteTx<'a> {
  pub fn new(conn: &'a Connection, cache: &'a InternCache) -> Self {
    Self { conn, cache, learned: Vec::new() }
  }

  /// Ids interned by this unit of work, to publish once it commits.
  pub fn into_learned(self) -> Vec<Learned> { self.learned }

  fn mimetype_id(&mut self, mimetype: &str) -> Result<i64> {
    if let Some(id) = self.cache.mimetype(mimetype) {
      return Ok(id);
    }
    if let Some(id) = self.learned.iter().find_map(|l| match l {
      Learned::Mimetype(m, id) if m == mimetype => Some(*id),
      _ => None,
    }) {
      return Ok(id);
    }
    let id = intern::mimetype_id(self.conn, mimetype).storage()?;
    self.learned.push(Learned::Mimetype(mimetype.to_owned(), id));
    Ok(id)
  }

  fn account_id(&mut self, account: &Account) -> Result<i64> {
    if let Some(id) = self.cache.account(account) {
      return Ok(id);
    }
    if let Some(id) = self.learned.iter().find_map(|l| match l {
      Learned::Account(a, id) if a == account => Some(*id),
      _ => None,
    }) {
      return Ok(id);
    }
    let id = intern::account_id(self.conn, account).storage()?;
    self.learned.push(Learned::Account(account.clone(), id));
    Ok(id)
  }
}

impl AggregationTx for SqliteTx<'_> {
  // ── Raw contacts ──────────────────────────────────────────────────────────

  fn raw_contact(&self, id: RawContactId) -> Result<Option<RawContact>> {
    let row = self
      .conn
      .prepare_cached(&format!("{RAW_CONTACT_SELECT} WHERE r.raw_contact_id = ?1"))
      .storage()?
      .query_row(params![id.0], RawContactRow::from_row)
      .optional()
      .storage()?;
    row.map(|r| r.into_raw_contact().storage()).transpose()
  }

  fn insert_raw_contact(
    &mut self,
    input: &NewRawContact,
    now: DateTime<Utc>,
  ) -> Result<RawContact> {
    let account_id = input
      .account
      .as_ref()
      .map(|account| self.account_id(account))
      .transpose()?;
    let name_json = encode_name(&input.name).storage()?;
    let now_str = encode_dt(now);

    self
      .conn
      .execute(
        "INSERT INTO raw_contacts (
           account_id, source_id, name_json, display_name, starred,
           send_to_voicemail, custom_ringtone, dirty, version,
           created_at, updated_at
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, 1, ?8, ?8)",
        params![
          account_id,
          input.source_id,
          name_json,
          input.display_name,
          input.starred,
          input.send_to_voicemail,
          input.custom_ringtone,
          now_str,
        ],
      )
      .storage()?;
    let id = RawContactId(self.conn.last_insert_rowid());

    Ok(RawContact {
      id,
      aggregate_id: None,
      account: input.account.clone(),
      source_id: input.source_id.clone(),
      deleted: false,
      name: input.name.clone(),
      display_name: input.display_name.clone(),
      starred: input.starred,
      send_to_voicemail: input.send_to_voicemail,
      custom_ringtone: input.custom_ringtone.clone(),
      dirty: true,
      version: 1,
      created_at: now,
      updated_at: now,
    })
  }

  fn update_raw_contact(&mut self, contact: &RawContact) -> Result<()> {
    let account_id = contact
      .account
      .as_ref()
      .map(|account| self.account_id(account))
      .transpose()?;
    let name_json = encode_name(&contact.name).storage()?;
    let version = encode_version(contact.version).storage()?;

    let changed = self
      .conn
      .execute(
        "UPDATE raw_contacts
            SET aggregate_id = ?1, account_id = ?2, source_id = ?3,
                deleted = ?4, name_json = ?5, display_name = ?6, starred = ?7,
                send_to_voicemail = ?8, custom_ringtone = ?9, dirty = ?10,
                version = ?11, updated_at = ?12
          WHERE raw_contact_id = ?13",
        params![
          contact.aggregate_id.map(|a| a.0),
          account_id,
          contact.source_id,
          contact.deleted,
          name_json,
          contact.display_name,
          contact.starred,
          contact.send_to_voicemail,
          contact.custom_ringtone,
          contact.dirty,
          version,
          encode_dt(contact.updated_at),
          contact.id.0,
        ],
      )
      .storage()?;
    if changed == 0 {
      return Err(CoreError::RawContactNotFound(contact.id));
    }
    Ok(())
  }

  fn delete_raw_contact(&mut self, id: RawContactId) -> Result<()> {
    self
      .conn
      .execute("DELETE FROM data WHERE raw_contact_id = ?1", params![id.0])
      .storage()?;
    self
      .conn
      .execute("DELETE FROM match_keys WHERE raw_contact_id = ?1", params![id.0])
      .storage()?;
    let deleted = self
      .conn
      .execute("DELETE FROM raw_contacts WHERE raw_contact_id = ?1", params![id.0])
      .storage()?;
    if deleted == 0 {
      return Err(CoreError::RawContactNotFound(id));
    }
    Ok(())
  }

  fn set_raw_contact_aggregate(
    &mut self,
    id: RawContactId,
    aggregate: Option<AggregateId>,
  ) -> Result<()> {
    let changed = self
      .conn
      .execute(
        "UPDATE raw_contacts SET aggregate_id = ?1 WHERE raw_contact_id = ?2",
        params![aggregate.map(|a| a.0), id.0],
      )
      .storage()?;
    if changed == 0 {
      return Err(CoreError::RawContactNotFound(id));
    }
    Ok(())
  }

  fn live_raw_contact_ids(&self) -> Result<Vec<RawContactId>> {
    ids(
      self.conn,
      "SELECT raw_contact_id FROM raw_contacts WHERE deleted = 0 ORDER BY raw_contact_id",
      [],
      RawContactId,
    )
  }

  fn raw_contacts_by_source_id(&self, source_id: &str) -> Result<Vec<RawContactId>> {
    ids(
      self.conn,
      "SELECT raw_contact_id FROM raw_contacts WHERE source_id = ?1 ORDER BY raw_contact_id",
      params![source_id],
      RawContactId,
    )
  }

  // ── Contact points ────────────────────────────────────────────────────────

  fn contact_points(&self, id: RawContactId) -> Result<Vec<ContactPoint>> {
    let mut stmt = self
      .conn
      .prepare_cached(
        "SELECT m.mimetype, d.value
           FROM data d
           JOIN mimetypes m ON m.mimetype_id = d.mimetype_id
          WHERE d.raw_contact_id = ?1
          ORDER BY d.data_id",
      )
      .storage()?;
    let rows = stmt
      .query_map(params![id.0], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
      .storage()?
      .collect::<rusqlite::Result<Vec<_>>>()
      .storage()?;
    rows
      .into_iter()
      .map(|(mimetype, value)| ContactPoint::from_parts(&mimetype, value))
      .collect()
  }

  fn replace_contact_points(
    &mut self,
    id: RawContactId,
    points: &[ContactPoint],
  ) -> Result<()> {
    self
      .conn
      .execute("DELETE FROM data WHERE raw_contact_id = ?1", params![id.0])
      .storage()?;
    for point in points {
      let mimetype_id = self.mimetype_id(point.mimetype().as_str())?;
      self
        .conn
        .execute(
          "INSERT INTO data (raw_contact_id, mimetype_id, value) VALUES (?1, ?2, ?3)",
          params![id.0, mimetype_id, point.value()],
        )
        .storage()?;
    }
    Ok(())
  }

  // ── Match keys ────────────────────────────────────────────────────────────

  fn match_keys(&self, id: RawContactId) -> Result<Vec<MatchKey>> {
    let mut stmt = self
      .conn
      .prepare_cached("SELECT kind, key FROM match_keys WHERE raw_contact_id = ?1")
      .storage()?;
    let rows = stmt
      .query_map(params![id.0], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
      .storage()?
      .collect::<rusqlite::Result<Vec<_>>>()
      .storage()?;
    rows
      .into_iter()
      .map(|(kind, value)| {
        let kind: MatchKind = decode_enum("kind", &kind).storage()?;
        Ok(MatchKey { kind, value })
      })
      .collect()
  }

  fn replace_match_keys(&mut self, id: RawContactId, keys: &[MatchKey]) -> Result<()> {
    self
      .conn
      .execute("DELETE FROM match_keys WHERE raw_contact_id = ?1", params![id.0])
      .storage()?;
    let mut stmt = self
      .conn
      .prepare_cached(
        "INSERT OR IGNORE INTO match_keys (raw_contact_id, kind, key) VALUES (?1, ?2, ?3)",
      )
      .storage()?;
    for key in keys {
      stmt
        .execute(params![id.0, key.kind.as_str(), key.value])
        .storage()?;
    }
    Ok(())
  }

  fn raw_contacts_with_key(&self, key: &MatchKey) -> Result<Vec<RawContactId>> {
    ids(
      self.conn,
      "SELECT raw_contact_id FROM match_keys WHERE kind = ?1 AND key = ?2
        ORDER BY raw_contact_id",
      params![key.kind.as_str(), key.value],
      RawContactId,
    )
  }

  // ── Aggregates ────────────────────────────────────────────────────────────

  fn create_aggregate(&mut self) -> Result<AggregateId> {
    self
      .conn
      .execute("INSERT INTO aggregates DEFAULT VALUES", [])
      .storage()?;
    Ok(AggregateId(self.conn.last_insert_rowid()))
  }

  fn delete_aggregate(&mut self, id: AggregateId) -> Result<()> {
    let deleted = self
      .conn
      .execute("DELETE FROM aggregates WHERE aggregate_id = ?1", params![id.0])
      .storage()?;
    if deleted == 0 {
      return Err(CoreError::AggregateNotFound(id));
    }
    Ok(())
  }

  fn aggregate_summary(&self, id: AggregateId) -> Result<Option<AggregateSummary>> {
    let row = self
      .conn
      .prepare_cached(&format!("{AGGREGATE_SELECT} WHERE aggregate_id = ?1"))
      .storage()?
      .query_row(params![id.0], AggregateRow::from_row)
      .optional()
      .storage()?;
    row.map(|r| r.into_summary().storage()).transpose()
  }

  fn write_aggregate_summary(
    &mut self,
    id: AggregateId,
    summary: &AggregateSummary,
  ) -> Result<()> {
    let changed = self
      .conn
      .execute(
        "UPDATE aggregates
            SET display_name = ?1, display_name_source = ?2, starred = ?3,
                send_to_voicemail = ?4, custom_ringtone = ?5, lookup_key = ?6
          WHERE aggregate_id = ?7",
        params![
          summary.display_name,
          summary.display_name_source.as_str(),
          summary.starred,
          summary.send_to_voicemail,
          summary.custom_ringtone,
          summary.lookup_key,
          id.0,
        ],
      )
      .storage()?;
    if changed == 0 {
      return Err(CoreError::AggregateNotFound(id));
    }
    Ok(())
  }

  fn aggregate_members(&self, id: AggregateId) -> Result<Vec<RawContactId>> {
    ids(
      self.conn,
      "SELECT raw_contact_id FROM raw_contacts WHERE aggregate_id = ?1
        ORDER BY raw_contact_id",
      params![id.0],
      RawContactId,
    )
  }

  fn aggregate_by_lookup_key(&self, lookup_key: &str) -> Result<Option<AggregateId>> {
    if lookup_key.is_empty() {
      return Ok(None);
    }
    let found = ids(
      self.conn,
      "SELECT aggregate_id FROM aggregates WHERE lookup_key = ?1
        ORDER BY aggregate_id LIMIT 1",
      params![lookup_key],
      AggregateId,
    )?;
    Ok(found.into_iter().next())
  }

  // ── Exceptions ────────────────────────────────────────────────────────────

  fn put_exception(&mut self, exception: &AggregationException) -> Result<()> {
    self
      .conn
      .execute(
        "INSERT INTO aggregation_exceptions (raw_contact_id1, raw_contact_id2, type)
         VALUES (?1, ?2, ?3)
         ON CONFLICT (raw_contact_id1, raw_contact_id2) DO UPDATE SET type = excluded.type",
        params![
          exception.key.low().0,
          exception.key.high().0,
          exception.kind.as_str(),
        ],
      )
      .storage()?;
    Ok(())
  }

  fn remove_exception(&mut self, key: ExceptionKey) -> Result<()> {
    self
      .conn
      .execute(
        "DELETE FROM aggregation_exceptions
          WHERE raw_contact_id1 = ?1 AND raw_contact_id2 = ?2",
        params![key.low().0, key.high().0],
      )
      .storage()?;
    Ok(())
  }

  fn exceptions_touching(&self, id: RawContactId) -> Result<Vec<AggregationException>> {
    let mut stmt = self
      .conn
      .prepare_cached(
        "SELECT raw_contact_id1, raw_contact_id2, type
           FROM aggregation_exceptions
          WHERE raw_contact_id1 = ?1 OR raw_contact_id2 = ?1
          ORDER BY raw_contact_id1, raw_contact_id2",
      )
      .storage()?;
    let rows = stmt
      .query_map(params![id.0], |row| {
        Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?, row.get::<_, String>(2)?))
      })
      .storage()?
      .collect::<rusqlite::Result<Vec<_>>>()
      .storage()?;
    rows
      .into_iter()
      .map(|(low, high, kind)| {
        let key = ExceptionKey::new(RawContactId(low), RawContactId(high))?;
        let kind: ExceptionType = decode_enum("type", &kind).storage()?;
        Ok(AggregationException { key, kind })
      })
      .collect()
  }
}
