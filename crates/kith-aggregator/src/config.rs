//! Tunables of the aggregation engine, deserialised from the `[aggregation]`
//! table of the tool's config file.

use kith_core::normalize::DEFAULT_PHONE_MIN_MATCH;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
  /// Trailing digits two phone numbers must share to match.
  pub phone_min_match:        usize,
  /// Normalized Levenshtein similarity at or above which two names are an
  /// approximate match. Empirically tuned; fixtures sit between 0.6 and 0.85.
  pub approximate_threshold:  f64,
  /// Names with more tokens than this produce no permutation keys.
  pub max_permutation_tokens: usize,
  pub suggestion_limit:       usize,
}

impl Default for AggregatorConfig {
  fn default() -> Self {
    Self {
      phone_min_match:        DEFAULT_PHONE_MIN_MATCH,
      approximate_threshold:  0.8,
      max_permutation_tokens: 4,
      suggestion_limit:       10,
    }
  }
}
