//! Raw contacts — one account's view of a person — and the contact points
//! attached to them.
//!
//! Raw contacts are written by sources (accounts, SIM, apps). The aggregation
//! engine only ever changes their `aggregate_id`; everything else belongs to
//! the data-write path.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{EnumString, IntoStaticStr};

use crate::{Error, Result};

// ─── Identifiers ─────────────────────────────────────────────────────────────

macro_rules! id_type {
  ($(#[$meta:meta])* $name:ident) => {
    $(#[$meta])*
    #[derive(
      Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize,
      Deserialize,
    )]
    #[serde(transparent)]
    pub struct $name(pub i64);

    impl fmt::Display for $name {
      fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
      }
    }

    impl From<i64> for $name {
      fn from(id: i64) -> Self { Self(id) }
    }
  };
}

id_type!(
  /// Primary key of a raw contact.
  RawContactId
);
id_type!(
  /// Primary key of an aggregate contact. Never reused once deleted.
  AggregateId
);

// ─── Account ─────────────────────────────────────────────────────────────────

/// The account a raw contact was supplied by. Raw contacts without an account
/// are local to the device.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Account {
  pub account_type: String,
  pub account_name: String,
  /// Optional sub-partition of an account (e.g. "plus" for a social feed).
  #[serde(default)]
  pub data_set:     Option<String>,
}

impl Account {
  pub fn new(
    account_type: impl Into<String>,
    account_name: impl Into<String>,
  ) -> Self {
    Self {
      account_type: account_type.into(),
      account_name: account_name.into(),
      data_set:     None,
    }
  }
}

// ─── Names ───────────────────────────────────────────────────────────────────

/// A structured person name. All parts are optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StructuredName {
  pub prefix: Option<String>,
  pub given:  Option<String>,
  pub middle: Option<String>,
  pub family: Option<String>,
  pub suffix: Option<String>,
}

fn present(part: &Option<String>) -> Option<&str> {
  part.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl StructuredName {
  pub fn new(given: Option<&str>, family: Option<&str>) -> Self {
    Self {
      given: given.map(str::to_owned),
      family: family.map(str::to_owned),
      ..Self::default()
    }
  }

  pub fn given(&self) -> Option<&str> { present(&self.given) }

  pub fn middle(&self) -> Option<&str> { present(&self.middle) }

  pub fn family(&self) -> Option<&str> { present(&self.family) }

  pub fn is_empty(&self) -> bool {
    [&self.prefix, &self.given, &self.middle, &self.family, &self.suffix]
      .into_iter()
      .all(|p| present(p).is_none())
  }

  /// `prefix given middle family suffix`, single-spaced, empty parts skipped.
  pub fn formatted(&self) -> String {
    [&self.prefix, &self.given, &self.middle, &self.family, &self.suffix]
      .into_iter()
      .filter_map(present)
      .collect::<Vec<_>>()
      .join(" ")
  }
}

// ─── Contact points ──────────────────────────────────────────────────────────

/// The data kinds stored in the generic data table, identified by mimetype.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, IntoStaticStr,
)]
pub enum Mimetype {
  #[strum(serialize = "vnd.kith.item/phone_v2")]
  Phone,
  #[strum(serialize = "vnd.kith.item/email_v2")]
  Email,
  #[strum(serialize = "vnd.kith.item/nickname")]
  Nickname,
}

impl Mimetype {
  pub fn as_str(self) -> &'static str { self.into() }
}

/// A phone number, email address, or nickname attached to a raw contact.
/// Only ever read by the aggregation engine, as a matching signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ContactPoint {
  Phone(String),
  Email(String),
  Nickname(String),
}

impl ContactPoint {
  pub fn mimetype(&self) -> Mimetype {
    match self {
      Self::Phone(_) => Mimetype::Phone,
      Self::Email(_) => Mimetype::Email,
      Self::Nickname(_) => Mimetype::Nickname,
    }
  }

  pub fn value(&self) -> &str {
    match self {
      Self::Phone(v) | Self::Email(v) | Self::Nickname(v) => v,
    }
  }

  /// Rebuild a contact point from the mimetype string and value stored in the
  /// data table.
  pub fn from_parts(mimetype: &str, value: String) -> Result<Self> {
    let kind: Mimetype = mimetype
      .parse()
      .map_err(|_| Error::UnknownMimetype(mimetype.to_owned()))?;
    Ok(match kind {
      Mimetype::Phone => Self::Phone(value),
      Mimetype::Email => Self::Email(value),
      Mimetype::Nickname => Self::Nickname(value),
    })
  }
}

// ─── RawContact ──────────────────────────────────────────────────────────────

/// One identity record from one account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawContact {
  pub id:                RawContactId,
  /// The aggregate this raw contact currently belongs to. `None` only while
  /// the raw contact is soft-deleted (or between insert and its first
  /// aggregation, inside one unit of work).
  pub aggregate_id:      Option<AggregateId>,
  pub account:           Option<Account>,
  /// Sync anchor assigned by the owning account.
  pub source_id:         Option<String>,
  pub deleted:           bool,
  pub name:              StructuredName,
  /// Free-form display name, e.g. from a SIM record.
  pub display_name:      Option<String>,
  pub starred:           bool,
  pub send_to_voicemail: Option<bool>,
  pub custom_ringtone:   Option<String>,
  pub dirty:             bool,
  pub version:           u64,
  pub created_at:        DateTime<Utc>,
  pub updated_at:        DateTime<Utc>,
}

impl RawContact {
  /// The text this raw contact would be displayed as: the free-form display
  /// name when present, otherwise the formatted structured name.
  pub fn display_text(&self) -> String {
    match present(&self.display_name) {
      Some(display) => display.to_owned(),
      None => self.name.formatted(),
    }
  }

  pub fn source_id(&self) -> Option<&str> {
    self.source_id.as_deref().filter(|s| !s.is_empty())
  }

  pub fn is_live(&self) -> bool { !self.deleted }
}

// ─── NewRawContact ───────────────────────────────────────────────────────────

/// Input to [`crate::store::ContactStore::insert_raw_contact`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NewRawContact {
  pub account:           Option<Account>,
  pub source_id:         Option<String>,
  pub name:              StructuredName,
  pub display_name:      Option<String>,
  pub starred:           bool,
  pub send_to_voicemail: Option<bool>,
  pub custom_ringtone:   Option<String>,
  pub contact_points:    Vec<ContactPoint>,
}

impl NewRawContact {
  pub fn new() -> Self { Self::default() }

  pub fn named(given: Option<&str>, family: Option<&str>) -> Self {
    Self { name: StructuredName::new(given, family), ..Self::default() }
  }

  pub fn with_display_name(mut self, display_name: &str) -> Self {
    self.display_name = Some(display_name.to_owned());
    self
  }

  pub fn with_account(mut self, account: Account) -> Self {
    self.account = Some(account);
    self
  }

  pub fn with_source_id(mut self, source_id: &str) -> Self {
    self.source_id = Some(source_id.to_owned());
    self
  }

  pub fn with_point(mut self, point: ContactPoint) -> Self {
    self.contact_points.push(point);
    self
  }
}

// ─── RawContactUpdate ────────────────────────────────────────────────────────

/// A partial update of a raw contact's own columns. `None` leaves a field
/// untouched; `Some(None)` clears a nullable field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawContactUpdate {
  pub name:              Option<StructuredName>,
  pub display_name:      Option<Option<String>>,
  pub source_id:         Option<Option<String>>,
  pub starred:           Option<bool>,
  pub send_to_voicemail: Option<Option<bool>>,
  pub custom_ringtone:   Option<Option<String>>,
}

impl RawContactUpdate {
  /// Apply this update to `contact`. Returns whether anything changed.
  pub fn apply_to(self, contact: &mut RawContact) -> bool {
    let before = contact.clone();
    if let Some(name) = self.name {
      contact.name = name;
    }
    if let Some(display_name) = self.display_name {
      contact.display_name = display_name;
    }
    if let Some(source_id) = self.source_id {
      contact.source_id = source_id;
    }
    if let Some(starred) = self.starred {
      contact.starred = starred;
    }
    if let Some(send_to_voicemail) = self.send_to_voicemail {
      contact.send_to_voicemail = send_to_voicemail;
    }
    if let Some(custom_ringtone) = self.custom_ringtone {
      contact.custom_ringtone = custom_ringtone;
    }
    *contact != before
  }
}
