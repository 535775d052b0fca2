//! Lookup keys — stable, re-resolvable textual identifiers for aggregates.
//!
//! # Format
//!
//! ```text
//! key     := segment ("." segment)*
//! segment := [digits] type value
//! type    := "n" | "i" | "e"
//! ```
//!
//! `digits` is the account hash (omitted means 0). `n` carries a normalized
//! display name, `i` a source id without dots, and `e` a source id in which
//! every literal `.` is doubled. Keys produced here always write the account
//! hash, including `0`.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{
  Error, Result,
  contact::{Account, RawContact},
  normalize::lookup_name,
};

/// Account hashes fall in `1..=ACCOUNT_HASH_MODULUS`; `0` is reserved for
/// raw contacts without an account.
const ACCOUNT_HASH_MODULUS: u32 = 0xFFF;

/// One unit of a lookup key: the identity of a single member raw contact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LookupKeySegment {
  pub account_hash:     u32,
  /// `true` when `key` is a source id, `false` when it is a normalized name.
  pub source_id_lookup: bool,
  /// The unescaped value.
  pub key:              String,
}

impl LookupKeySegment {
  pub fn source_id(account_hash: u32, source_id: impl Into<String>) -> Self {
    Self { account_hash, source_id_lookup: true, key: source_id.into() }
  }

  pub fn name(account_hash: u32, name: impl Into<String>) -> Self {
    Self { account_hash, source_id_lookup: false, key: name.into() }
  }

  /// The segment identifying `raw`: its source id when it has one, otherwise
  /// its normalized display text.
  pub fn for_raw_contact(raw: &RawContact) -> Self {
    let hash = account_hash(raw.account.as_ref());
    match raw.source_id() {
      Some(source_id) => Self::source_id(hash, source_id),
      None => Self::name(hash, lookup_name(&raw.display_text())),
    }
  }

  pub fn type_letter(&self) -> char {
    match (self.source_id_lookup, self.key.contains('.')) {
      (false, _) => 'n',
      (true, false) => 'i',
      (true, true) => 'e',
    }
  }

  fn encode_into(&self, out: &mut String) {
    out.push_str(&self.account_hash.to_string());
    let letter = self.type_letter();
    out.push(letter);
    if letter == 'e' {
      out.push_str(&self.key.replace('.', ".."));
    } else {
      out.push_str(&self.key);
    }
  }
}

/// A stable hash of `(account_name, account_type)`; `0` for local raw
/// contacts.
pub fn account_hash(account: Option<&Account>) -> u32 {
  let Some(account) = account else { return 0 };
  let mut hasher = Sha256::new();
  hasher.update(account.account_type.as_bytes());
  hasher.update([0u8]);
  hasher.update(account.account_name.as_bytes());
  let digest = hasher.finalize();
  let prefix = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
  prefix % ACCOUNT_HASH_MODULUS + 1
}

/// Concatenate segments with `.`.
pub fn encode_lookup_key(segments: &[LookupKeySegment]) -> String {
  let mut out = String::new();
  for (i, segment) in segments.iter().enumerate() {
    if i > 0 {
      out.push('.');
    }
    segment.encode_into(&mut out);
  }
  out
}

/// Build the lookup key of an aggregate from its members, one segment per
/// member in ascending raw contact id order.
pub fn build_lookup_key<'a>(
  members: impl IntoIterator<Item = &'a RawContact>,
) -> String {
  let mut members: Vec<&RawContact> = members.into_iter().collect();
  members.sort_by_key(|raw| raw.id);
  let segments: Vec<LookupKeySegment> = members
    .into_iter()
    .map(LookupKeySegment::for_raw_contact)
    .collect();
  encode_lookup_key(&segments)
}

/// Split `text` into segments, undoing `e` escaping.
pub fn parse_lookup_key(text: &str) -> Result<Vec<LookupKeySegment>> {
  let invalid = |why: String| Error::InvalidLookupKey(format!("{why} in {text:?}"));

  if text.is_empty() {
    return Err(invalid("empty key".into()));
  }

  let mut segments = Vec::new();
  let mut chars = text.chars().peekable();
  loop {
    let mut digits = String::new();
    while let Some(&c) = chars.peek() {
      if !c.is_ascii_digit() {
        break;
      }
      digits.push(c);
      chars.next();
    }
    let account_hash = if digits.is_empty() {
      0
    } else {
      digits
        .parse::<u32>()
        .map_err(|_| invalid(format!("account hash {digits} out of range")))?
    };

    let letter = chars
      .next()
      .ok_or_else(|| invalid("segment without a type letter".into()))?;
    let escaped = match letter {
      'n' | 'i' => false,
      'e' => true,
      other => return Err(invalid(format!("unknown segment type {other:?}"))),
    };

    let mut key = String::new();
    let mut more = false;
    while let Some(c) = chars.next() {
      if c != '.' {
        key.push(c);
      } else if escaped && chars.peek() == Some(&'.') {
        chars.next();
        key.push('.');
      } else {
        more = true;
        break;
      }
    }

    if letter != 'n' && key.is_empty() {
      return Err(invalid("empty source id".into()));
    }
    segments.push(LookupKeySegment {
      account_hash,
      source_id_lookup: letter != 'n',
      key,
    });

    if !more {
      return Ok(segments);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn roundtrip(text: &str) -> String {
    encode_lookup_key(&parse_lookup_key(text).unwrap())
  }

  #[test]
  fn escaped_source_id_roundtrips() {
    let segments = parse_lookup_key("0i123.0e4..5..6").unwrap();
    assert_eq!(
      segments,
      vec![
        LookupKeySegment::source_id(0, "123"),
        LookupKeySegment::source_id(0, "4.5.6"),
      ]
    );
    assert_eq!(roundtrip("0i123.0e4..5..6"), "0i123.0e4..5..6");
  }

  #[test]
  fn name_segments_roundtrip() {
    let text = "0n3B4537432F4531.0n3B4537432F4531";
    let segments = parse_lookup_key(text).unwrap();
    assert_eq!(segments.len(), 2);
    assert!(segments.iter().all(|s| !s.source_id_lookup && s.account_hash == 0));
    assert_eq!(roundtrip(text), text);
  }

  #[test]
  fn missing_account_hash_defaults_to_zero() {
    let segments = parse_lookup_key("i1.n").unwrap();
    assert_eq!(segments[0], LookupKeySegment::source_id(0, "1"));
    assert_eq!(segments[1], LookupKeySegment::name(0, ""));
  }

  #[test]
  fn account_hash_prefix_is_kept() {
    let segments = parse_lookup_key("1234i99").unwrap();
    assert_eq!(segments[0].account_hash, 1234);
    assert_eq!(roundtrip("1234i99"), "1234i99");
  }

  #[test]
  fn trailing_dot_inside_escaped_value() {
    let segment = LookupKeySegment::source_id(5, "4.");
    let text = encode_lookup_key(&[segment.clone(), LookupKeySegment::source_id(0, "7")]);
    assert_eq!(text, "5e4...0i7");
    assert_eq!(parse_lookup_key(&text).unwrap()[0], segment);
  }

  #[test]
  fn malformed_keys_are_rejected() {
    for bad in ["", "0x12", "0i1.", "0i1..0i2", "0i", "99999999999i1", "."] {
      let err = parse_lookup_key(bad).unwrap_err();
      assert!(matches!(err, Error::InvalidLookupKey(_)), "{bad:?}: {err}");
    }
  }

  #[test]
  fn account_hash_is_stable_and_never_zero() {
    let google = Account::new("com.google", "alice@gmail.com");
    let exchange = Account::new("com.exchange", "alice@corp.example");
    assert_eq!(account_hash(None), 0);
    assert_eq!(account_hash(Some(&google)), account_hash(Some(&google.clone())));
    assert_ne!(account_hash(Some(&google)), 0);
    assert!(account_hash(Some(&exchange)) <= ACCOUNT_HASH_MODULUS);
  }
}
