//! Normalization of names and contact points into comparable forms.
//!
//! Every function here is pure and total: malformed input normalizes to an
//! empty value, which never matches anything.

use std::collections::BTreeSet;

use unicode_normalization::{UnicodeNormalization, char::is_combining_mark};

use crate::nickname::{self, NicknameCluster};

/// Default number of trailing digits two phone numbers must share.
pub const DEFAULT_PHONE_MIN_MATCH: usize = 7;

// ─── Names ───────────────────────────────────────────────────────────────────

/// A name folded to lower case with diacritics and punctuation removed,
/// split into tokens in their original order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedName {
  tokens: Vec<String>,
}

impl NormalizedName {
  pub fn from_tokens(tokens: Vec<String>) -> Self {
    Self { tokens: tokens.into_iter().filter(|t| !t.is_empty()).collect() }
  }

  pub fn tokens(&self) -> &[String] { &self.tokens }

  pub fn is_empty(&self) -> bool { self.tokens.is_empty() }

  /// Tokens concatenated in their original order: "John Doe" → "johndoe".
  pub fn key(&self) -> String { self.tokens.concat() }

  /// Tokens sorted, then concatenated; independent of name order.
  pub fn comparable(&self) -> String {
    let mut sorted = self.tokens.clone();
    sorted.sort();
    sorted.concat()
  }

  /// Concatenations of every ordering of the tokens. Names with more than
  /// `max_tokens` tokens yield only [`Self::key`] and [`Self::comparable`].
  pub fn permutation_keys(&self, max_tokens: usize) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    if self.is_empty() {
      return out;
    }
    if self.tokens.len() > max_tokens {
      out.insert(self.key());
      out.insert(self.comparable());
      return out;
    }
    let mut rest: Vec<&str> = self.tokens.iter().map(String::as_str).collect();
    permute(&mut rest, String::new(), &mut out);
    out
  }
}

fn permute(rest: &mut Vec<&str>, prefix: String, out: &mut BTreeSet<String>) {
  if rest.is_empty() {
    out.insert(prefix);
    return;
  }
  for i in 0..rest.len() {
    let token = rest.remove(i);
    permute(rest, format!("{prefix}{token}"), out);
    rest.insert(i, token);
  }
}

/// Lower-case, strip diacritics (NFKD, then drop combining marks), and split
/// on anything that is not a letter or digit.
pub fn normalize_name(raw: &str) -> NormalizedName {
  let folded: String = raw
    .nfkd()
    .filter(|c| !is_combining_mark(*c))
    .flat_map(char::to_lowercase)
    .collect();
  NormalizedName::from_tokens(
    folded
      .split(|c: char| !c.is_alphanumeric())
      .map(str::to_owned)
      .collect(),
  )
}

/// The name form used in `n` lookup-key segments. Never contains `.`.
pub fn lookup_name(display: &str) -> String { normalize_name(display).key() }

// ─── Phones ──────────────────────────────────────────────────────────────────

/// A phone number reduced to digits, plus the suffix used for matching.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedPhone {
  pub digits: String,
  /// The last `min_match` digits, or all digits for shorter numbers.
  pub suffix: String,
}

impl NormalizedPhone {
  pub fn is_empty(&self) -> bool { self.digits.is_empty() }
}

/// Strip everything but ASCII digits and keep a matchable suffix, so numbers
/// differing only by country or trunk prefix compare equal.
pub fn normalize_phone(raw: &str, min_match: usize) -> NormalizedPhone {
  let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
  let start = if min_match > 0 {
    digits.len().saturating_sub(min_match)
  } else {
    0
  };
  let suffix = digits[start..].to_owned();
  NormalizedPhone { digits, suffix }
}

// ─── Emails ──────────────────────────────────────────────────────────────────

pub fn normalize_email(raw: &str) -> String { raw.trim().to_lowercase() }

// ─── Nicknames ───────────────────────────────────────────────────────────────

/// The nickname clusters `raw` belongs to; empty for unmapped names.
pub fn normalize_nickname(raw: &str) -> BTreeSet<NicknameCluster> {
  nickname::clusters_for(&normalize_name(raw).key())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn name_folds_case_diacritics_and_punctuation() {
    let name = normalize_name("  José  O'Brien-Smith ");
    assert_eq!(name.tokens(), &["jose", "o", "brien", "smith"]);
    assert_eq!(name.key(), "joseobriensmith");
  }

  #[test]
  fn concatenated_and_spaced_names_share_a_key() {
    assert_eq!(normalize_name("John Doe").key(), normalize_name("johndoe").key());
    assert_eq!(lookup_name("John Doe"), "johndoe");
  }

  #[test]
  fn comparable_form_ignores_token_order() {
    assert_eq!(
      normalize_name("Doe, John").comparable(),
      normalize_name("John Doe").comparable()
    );
  }

  #[test]
  fn permutations_cover_every_order() {
    let keys = normalize_name("John Doe").permutation_keys(4);
    assert_eq!(
      keys.into_iter().collect::<Vec<_>>(),
      vec!["doejohn".to_string(), "johndoe".to_string()]
    );
    assert_eq!(normalize_name("a b c").permutation_keys(4).len(), 6);
    let long = normalize_name("e d c b a");
    assert_eq!(
      long.permutation_keys(4),
      BTreeSet::from([long.key(), long.comparable()])
    );
    assert_eq!(long.permutation_keys(4).len(), 2);
  }

  #[test]
  fn punctuation_only_name_is_empty() {
    assert!(normalize_name("--- ...").is_empty());
    assert!(normalize_name("").permutation_keys(4).is_empty());
  }

  #[test]
  fn phone_prefixes_do_not_matter() {
    let a = normalize_phone("+1 (650) 555-1234", DEFAULT_PHONE_MIN_MATCH);
    let b = normalize_phone("650.555.1234", DEFAULT_PHONE_MIN_MATCH);
    let c = normalize_phone("0 555 1234", DEFAULT_PHONE_MIN_MATCH);
    assert_eq!(a.suffix, "5551234");
    assert_eq!(a.suffix, b.suffix);
    assert_eq!(b.suffix, c.suffix);
    assert_ne!(a.digits, b.digits);
  }

  #[test]
  fn short_and_malformed_phones() {
    assert_eq!(normalize_phone("911", 7).suffix, "911");
    assert!(normalize_phone("call me", 7).is_empty());
    assert_eq!(normalize_phone("555-1234", 0).suffix, "5551234");
  }

  #[test]
  fn email_is_trimmed_and_lowercased() {
    assert_eq!(normalize_email("  Bob@Example.COM "), "bob@example.com");
  }

  #[test]
  fn nicknames_share_clusters() {
    let bill = normalize_nickname("Bill");
    let william = normalize_nickname("WILLIAM");
    assert!(!bill.is_empty());
    assert!(bill.intersection(&william).next().is_some());
    assert!(normalize_nickname("Frozone").is_empty());
    // "al" belongs to both Albert and Alexander.
    assert_eq!(normalize_nickname("Al").len(), 2);
  }
}
