//! Candidate finding: which existing aggregates share a strong identity
//! signal with a raw contact.
//!
//! Signals are expressed as [`MatchKey`]s. A raw contact's keys are derived
//! from its name and contact points; two live raw contacts sharing any
//! exact-signal key are exact partners.

use std::collections::BTreeSet;

use kith_core::{
  Result,
  contact::{AggregateId, ContactPoint, RawContact, RawContactId},
  match_key::{MatchKey, MatchKind},
  normalize::{
    NormalizedName, lookup_name, normalize_email, normalize_name,
    normalize_nickname, normalize_phone,
  },
  store::AggregationTx,
};

use crate::config::AggregatorConfig;

// ─── Key generation ──────────────────────────────────────────────────────────

/// The full name of `raw` as used for exact matching, or `None` when the raw
/// contact has no usable full name.
///
/// A structured name without a family part is first-name-only and yields
/// `None`: first names alone are too weak to aggregate on. A family-only name
/// is allowed.
pub fn full_name(raw: &RawContact) -> Option<NormalizedName> {
  let name = &raw.name;
  if name.given().is_some() || name.middle().is_some() || name.family().is_some() {
    name.family()?;
    let tokens = [name.given(), name.middle(), name.family()]
      .into_iter()
      .flatten()
      .flat_map(|part| normalize_name(part).tokens().to_vec())
      .collect();
    return Some(NormalizedName::from_tokens(tokens)).filter(|n| !n.is_empty());
  }
  raw
    .display_name
    .as_deref()
    .map(normalize_name)
    .filter(|n| !n.is_empty())
}

/// Every match key of `raw`, sorted and de-duplicated. Deleted raw contacts
/// have none.
pub fn match_keys(
  raw: &RawContact,
  points: &[ContactPoint],
  config: &AggregatorConfig,
) -> Vec<MatchKey> {
  let mut keys = BTreeSet::new();
  if raw.deleted {
    return Vec::new();
  }

  if let Some(name) = full_name(raw) {
    for key in name.permutation_keys(config.max_permutation_tokens) {
      keys.insert(MatchKey::new(MatchKind::Name, key));
    }
  }

  // "Bill Smith" and "William Smith" share `smith#<cluster>`.
  if let (Some(given), Some(family)) = (raw.name.given(), raw.name.family()) {
    let family = normalize_name(family).key();
    if !family.is_empty() {
      for cluster in normalize_nickname(given) {
        keys.insert(MatchKey::new(MatchKind::Name, format!("{family}#{cluster}")));
      }
    }
  }

  for point in points {
    match point {
      ContactPoint::Phone(number) => {
        let phone = normalize_phone(number, config.phone_min_match);
        if !phone.is_empty() {
          keys.insert(MatchKey::new(MatchKind::Phone, phone.suffix));
        }
      }
      ContactPoint::Email(address) => {
        let address = normalize_email(address);
        if !address.is_empty() {
          keys.insert(MatchKey::new(MatchKind::Email, address));
        }
      }
      ContactPoint::Nickname(nickname) => {
        let normalized = normalize_name(nickname).key();
        if !normalized.is_empty() {
          keys.insert(MatchKey::new(MatchKind::Nickname, normalized));
        }
        for cluster in normalize_nickname(nickname) {
          keys.insert(MatchKey::new(MatchKind::NicknameCluster, cluster.to_string()));
        }
      }
    }
  }

  let display = lookup_name(&raw.display_text());
  if !display.is_empty() {
    keys.insert(MatchKey::new(MatchKind::DisplayName, display));
  }

  keys.into_iter().collect()
}

// ─── Lookup ──────────────────────────────────────────────────────────────────

/// Raw contacts other than `id` sharing an exact-signal key from `keys`.
pub fn exact_partners<T: AggregationTx + ?Sized>(
  tx: &T,
  id: RawContactId,
  keys: &[MatchKey],
) -> Result<BTreeSet<RawContactId>> {
  let mut partners = BTreeSet::new();
  for key in keys.iter().filter(|k| k.kind.is_exact_signal()) {
    partners.extend(tx.raw_contacts_with_key(key)?.into_iter().filter(|&p| p != id));
  }
  Ok(partners)
}

/// Aggregates currently containing a live exact partner of `id`. Empty when
/// nothing matches, which is the normal "new, distinct person" case.
pub fn find_candidates<T: AggregationTx + ?Sized>(
  tx: &T,
  id: RawContactId,
  keys: &[MatchKey],
) -> Result<BTreeSet<AggregateId>> {
  let mut candidates = BTreeSet::new();
  for partner in exact_partners(tx, id, keys)? {
    if let Some(raw) = tx.raw_contact(partner)?
      && raw.is_live()
      && let Some(aggregate) = raw.aggregate_id
    {
      candidates.insert(aggregate);
    }
  }
  Ok(candidates)
}
