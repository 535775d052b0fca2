//! Interning of the `mimetypes` and `accounts` lookup tables.
//!
//! Ids are cached in a [`DashMap`] shared by every unit of work on a store.
//! A miss inserts the row; if a concurrent writer got there first the unique
//! constraint fires and the existing row is re-selected. Ids learned inside a
//! transaction stay private to it until [`InternCache::publish`] is called
//! after commit, so a rolled-back insert never leaks into the cache.

use dashmap::DashMap;
use kith_core::contact::Account;
use rusqlite::{Connection, ErrorCode, ToSql};

#[derive(Debug, Default)]
pub struct InternCache {
  mimetypes: DashMap<String, i64>,
  accounts:  DashMap<Account, i64>,
}

/// An id discovered inside an uncommitted transaction.
#[derive(Debug, Clone)]
pub enum Learned {
  Mimetype(String, i64),
  Account(Account, i64),
}

impl InternCache {
  pub fn mimetype(&self, mimetype: &str) -> Option<i64> {
    self.mimetypes.get(mimetype).map(|id| *id)
  }

  pub fn account(&self, account: &Account) -> Option<i64> {
    self.accounts.get(account).map(|id| *id)
  }

  pub fn publish(&self, learned: Vec<Learned>) {
    for entry in learned {
      match entry {
        Learned::Mimetype(mimetype, id) => {
          self.mimetypes.insert(mimetype, id);
        }
        Learned::Account(account, id) => {
          self.accounts.insert(account, id);
        }
      }
    }
  }

  #[cfg(test)]
  pub fn len(&self) -> usize { self.mimetypes.len() + self.accounts.len() }
}

/// Insert a lookup row, or select the id of the row that already holds the
/// same unique values.
pub fn insert_or_select(
  conn: &Connection,
  insert: &str,
  select: &str,
  params: &[&dyn ToSql],
) -> rusqlite::Result<i64> {
  match conn.execute(insert, params) {
    Ok(_) => Ok(conn.last_insert_rowid()),
    Err(rusqlite::Error::SqliteFailure(e, _))
      if e.code == ErrorCode::ConstraintViolation =>
    {
      conn.query_row(select, params, |row| row.get(0))
    }
    Err(e) => Err(e),
  }
}

pub fn mimetype_id(conn: &Connection, mimetype: &str) -> rusqlite::Result<i64> {
  insert_or_select(
    conn,
    "INSERT INTO mimetypes (mimetype) VALUES (?1)",
    "SELECT mimetype_id FROM mimetypes WHERE mimetype = ?1",
    rusqlite::params![mimetype],
  )
}

pub fn account_id(conn: &Connection, account: &Account) -> rusqlite::Result<i64> {
  let data_set = account.data_set.as_deref().unwrap_or("");
  insert_or_select(
    conn,
    "INSERT INTO accounts (account_type, account_name, data_set) VALUES (?1, ?2, ?3)",
    "SELECT account_id FROM accounts
      WHERE account_type = ?1 AND account_name = ?2 AND data_set = ?3",
    rusqlite::params![account.account_type, account.account_name, data_set],
  )
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::schema::SCHEMA;

  #[test]
  fn conflicting_insert_reselects_existing_row() {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(SCHEMA).unwrap();

    let first = mimetype_id(&conn, "vnd.kith.item/email_v2").unwrap();
    let again = mimetype_id(&conn, "vnd.kith.item/email_v2").unwrap();
    let other = mimetype_id(&conn, "vnd.kith.item/phone_v2").unwrap();
    assert_eq!(first, again);
    assert_ne!(first, other);

    let account = Account::new("com.example", "me@example.com");
    assert_eq!(
      account_id(&conn, &account).unwrap(),
      account_id(&conn, &account.clone()).unwrap()
    );
  }

  #[test]
  fn publish_makes_ids_visible() {
    let cache = InternCache::default();
    assert_eq!(cache.mimetype("m"), None);
    cache.publish(vec![
      Learned::Mimetype("m".into(), 4),
      Learned::Account(Account::new("t", "n"), 9),
    ]);
    assert_eq!(cache.mimetype("m"), Some(4));
    assert_eq!(cache.account(&Account::new("t", "n")), Some(9));
    assert_eq!(cache.len(), 2);
  }
}
