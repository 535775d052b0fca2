//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! All timestamps are stored as RFC 3339 strings. Structured names are stored
//! as compact JSON. Enums are stored as their snake_case names.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use kith_core::{
  aggregate::{AggregateSummary, DisplayNameSource},
  contact::{Account, AggregateId, RawContact, RawContactId, StructuredName},
};

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── StructuredName ──────────────────────────────────────────────────────────

pub fn encode_name(name: &StructuredName) -> Result<String> {
  Ok(serde_json::to_string(name)?)
}

pub fn decode_name(s: &str) -> Result<StructuredName> { Ok(serde_json::from_str(s)?) }

// ─── Enums and counters ──────────────────────────────────────────────────────

/// Parse a snake_case enum column.
pub fn decode_enum<T: FromStr>(column: &str, s: &str) -> Result<T> {
  s.parse()
    .map_err(|_| Error::InvalidColumn(format!("{column} = {s:?}")))
}

pub fn encode_version(version: u64) -> Result<i64> {
  i64::try_from(version).map_err(|_| Error::InvalidColumn(format!("version = {version}")))
}

pub fn decode_version(version: i64) -> Result<u64> {
  u64::try_from(version).map_err(|_| Error::InvalidColumn(format!("version = {version}")))
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Selects every column [`RawContactRow::from_row`] reads, with the account
/// joined in.
pub const RAW_CONTACT_SELECT: &str = "
  SELECT r.raw_contact_id, r.aggregate_id, a.account_type, a.account_name,
         a.data_set, r.source_id, r.deleted, r.name_json, r.display_name,
         r.starred, r.send_to_voicemail, r.custom_ringtone, r.dirty, r.version,
         r.created_at, r.updated_at
    FROM raw_contacts r
    LEFT JOIN accounts a ON a.account_id = r.account_id";

/// Raw values read directly from a `raw_contacts` row joined with `accounts`.
pub struct RawContactRow {
  pub raw_contact_id:    i64,
  pub aggregate_id:      Option<i64>,
  pub account_type:      Option<String>,
  pub account_name:      Option<String>,
  pub data_set:          Option<String>,
  pub source_id:         Option<String>,
  pub deleted:           bool,
  pub name_json:         String,
  pub display_name:      Option<String>,
  pub starred:           bool,
  pub send_to_voicemail: Option<bool>,
  pub custom_ringtone:   Option<String>,
  pub dirty:             bool,
  pub version:           i64,
  pub created_at:        String,
  pub updated_at:        String,
}

impl RawContactRow {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      raw_contact_id:    row.get(0)?,
      aggregate_id:      row.get(1)?,
      account_type:      row.get(2)?,
      account_name:      row.get(3)?,
      data_set:          row.get(4)?,
      source_id:         row.get(5)?,
      deleted:           row.get(6)?,
      name_json:         row.get(7)?,
      display_name:      row.get(8)?,
      starred:           row.get(9)?,
      send_to_voicemail: row.get(10)?,
      custom_ringtone:   row.get(11)?,
      dirty:             row.get(12)?,
      version:           row.get(13)?,
      created_at:        row.get(14)?,
      updated_at:        row.get(15)?,
    })
  }

  pub fn into_raw_contact(self) -> Result<RawContact> {
    let account = match (self.account_type, self.account_name) {
      (Some(account_type), Some(account_name)) => Some(Account {
        account_type,
        account_name,
        data_set: self.data_set.filter(|s| !s.is_empty()),
      }),
      _ => None,
    };

    Ok(RawContact {
      id: RawContactId(self.raw_contact_id),
      aggregate_id: self.aggregate_id.map(AggregateId),
      account,
      source_id: self.source_id,
      deleted: self.deleted,
      name: decode_name(&self.name_json)?,
      display_name: self.display_name,
      starred: self.starred,
      send_to_voicemail: self.send_to_voicemail,
      custom_ringtone: self.custom_ringtone,
      dirty: self.dirty,
      version: decode_version(self.version)?,
      created_at: decode_dt(&self.created_at)?,
      updated_at: decode_dt(&self.updated_at)?,
    })
  }
}

pub const AGGREGATE_SELECT: &str = "
  SELECT display_name, display_name_source, starred, send_to_voicemail,
         custom_ringtone, lookup_key
    FROM aggregates";

/// Raw values read directly from an `aggregates` row.
pub struct AggregateRow {
  pub display_name:        Option<String>,
  pub display_name_source: String,
  pub starred:             bool,
  pub send_to_voicemail:   bool,
  pub custom_ringtone:     Option<String>,
  pub lookup_key:          String,
}

impl AggregateRow {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      display_name:        row.get(0)?,
      display_name_source: row.get(1)?,
      starred:             row.get(2)?,
      send_to_voicemail:   row.get(3)?,
      custom_ringtone:     row.get(4)?,
      lookup_key:          row.get(5)?,
    })
  }

  pub fn into_summary(self) -> Result<AggregateSummary> {
    Ok(AggregateSummary {
      display_name:        self.display_name,
      display_name_source: decode_enum::<DisplayNameSource>(
        "display_name_source",
        &self.display_name_source,
      )?,
      starred:             self.starred,
      send_to_voicemail:   self.send_to_voicemail,
      custom_ringtone:     self.custom_ringtone,
      lookup_key:          self.lookup_key,
    })
  }
}

#[cfg(test)]
mod tests {
  use kith_core::{exception::ExceptionType, match_key::MatchKind};

  use super::*;

  #[test]
  fn enum_columns_roundtrip() {
    let kind: MatchKind = decode_enum("kind", MatchKind::NicknameCluster.as_str()).unwrap();
    assert_eq!(kind, MatchKind::NicknameCluster);
    let kind: ExceptionType = decode_enum("type", "keep_separate").unwrap();
    assert_eq!(kind, ExceptionType::KeepSeparate);
    let err = decode_enum::<DisplayNameSource>("display_name_source", "bogus").unwrap_err();
    assert!(matches!(err, Error::InvalidColumn(_)));
  }

  #[test]
  fn name_json_roundtrip() {
    let name = StructuredName::new(Some("Ada"), Some("Lovelace"));
    assert_eq!(decode_name(&encode_name(&name).unwrap()).unwrap(), name);
  }

  #[test]
  fn negative_version_is_rejected() {
    assert!(decode_version(-1).is_err());
    assert_eq!(decode_version(3).unwrap(), 3);
  }
}
