//! Writing and reading aggregation exceptions.

use kith_core::{
  Error, Result,
  contact::RawContactId,
  exception::{AggregationException, ExceptionKey, ExceptionType},
  store::AggregationTx,
};
use tracing::info;

/// Record `kind` for the pair, replacing any previous directive. `Automatic`
/// clears the directive. Both raw contacts must exist (deleted ones count).
pub fn write_exception<T: AggregationTx + ?Sized>(
  tx: &mut T,
  kind: ExceptionType,
  a: RawContactId,
  b: RawContactId,
) -> Result<ExceptionKey> {
  let key = ExceptionKey::new(a, b)?;
  for id in [key.low(), key.high()] {
    if tx.raw_contact(id)?.is_none() {
      return Err(Error::RawContactNotFound(id));
    }
  }

  match kind {
    ExceptionType::Automatic => tx.remove_exception(key)?,
    _ => tx.put_exception(&AggregationException { key, kind })?,
  }
  info!(low = %key.low(), high = %key.high(), kind = kind.as_str(), "wrote aggregation exception");
  Ok(key)
}

/// Every directive naming `id`, ordered by pair.
pub fn directives<T: AggregationTx + ?Sized>(
  tx: &T,
  id: RawContactId,
) -> Result<Vec<AggregationException>> {
  let mut found = tx.exceptions_touching(id)?;
  found.sort_by_key(|e| e.key);
  Ok(found)
}
