//! Reduction of member raw contacts into an aggregate's computed columns.

use kith_core::{
  aggregate::{AggregateSummary, DisplayNameSource},
  contact::{ContactPoint, RawContact},
  lookup::build_lookup_key,
};

/// A member raw contact and its contact points.
#[derive(Debug, Clone, Copy)]
pub struct Member<'a> {
  pub raw:    &'a RawContact,
  pub points: &'a [ContactPoint],
}

/// The best display name `raw` can offer, with its rank.
pub fn display_name_candidate(
  raw: &RawContact,
  points: &[ContactPoint],
) -> (DisplayNameSource, Option<String>) {
  let text = raw.display_text();
  if !text.is_empty() {
    let source = if raw.name.given().is_some() && raw.name.family().is_some() {
      DisplayNameSource::FullName
    } else {
      DisplayNameSource::PartialName
    };
    return (source, Some(text));
  }

  let first = |want: fn(&ContactPoint) -> bool| {
    points
      .iter()
      .filter(|p| want(p))
      .map(|p| p.value().trim())
      .find(|v| !v.is_empty())
      .map(str::to_owned)
  };
  if let Some(nickname) = first(|p| matches!(p, ContactPoint::Nickname(_))) {
    return (DisplayNameSource::Nickname, Some(nickname));
  }
  if let Some(phone) = first(|p| matches!(p, ContactPoint::Phone(_))) {
    return (DisplayNameSource::Phone, Some(phone));
  }
  if let Some(email) = first(|p| matches!(p, ContactPoint::Email(_))) {
    return (DisplayNameSource::Email, Some(email));
  }
  (DisplayNameSource::Undefined, None)
}

/// Compute the summary of an aggregate with exactly these members.
pub fn summarize(members: &[Member<'_>]) -> AggregateSummary {
  let mut members = members.to_vec();
  members.sort_by_key(|m| m.raw.id);

  let mut summary = AggregateSummary::default();
  for member in &members {
    let (source, name) = display_name_candidate(member.raw, member.points);
    // Strictly greater keeps the lowest id on ties.
    if source > summary.display_name_source {
      summary.display_name_source = source;
      summary.display_name = name;
    }
  }

  summary.starred = members.iter().any(|m| m.raw.starred);

  let explicit: Vec<bool> = members
    .iter()
    .filter_map(|m| m.raw.send_to_voicemail)
    .collect();
  summary.send_to_voicemail = !explicit.is_empty() && explicit.iter().all(|&v| v);

  summary.custom_ringtone = members
    .iter()
    .filter_map(|m| m.raw.custom_ringtone.as_deref())
    .find(|r| !r.trim().is_empty())
    .map(str::to_owned);

  summary.lookup_key = build_lookup_key(members.iter().map(|m| m.raw));
  summary
}

#[cfg(test)]
mod tests {
  use chrono::Utc;
  use kith_core::contact::{RawContactId, StructuredName};

  use super::*;

  fn raw(id: i64) -> RawContact {
    RawContact {
      id:                RawContactId(id),
      aggregate_id:      None,
      account:           None,
      source_id:         None,
      deleted:           false,
      name:              StructuredName::default(),
      display_name:      None,
      starred:           false,
      send_to_voicemail: None,
      custom_ringtone:   None,
      dirty:             false,
      version:           1,
      created_at:        Utc::now(),
      updated_at:        Utc::now(),
    }
  }

  #[test]
  fn full_name_beats_earlier_weaker_sources() {
    let a = raw(1);
    let a_points = [ContactPoint::Email("bob@example.com".into())];
    let mut b = raw(2);
    b.display_name = Some("Bobby".into());
    let mut c = raw(3);
    c.name = StructuredName::new(Some("Robert"), Some("Paulson"));

    let summary = summarize(&[
      Member { raw: &c, points: &[] },
      Member { raw: &a, points: &a_points },
      Member { raw: &b, points: &[] },
    ]);
    assert_eq!(summary.display_name.as_deref(), Some("Robert Paulson"));
    assert_eq!(summary.display_name_source, DisplayNameSource::FullName);
    assert_eq!(summary.lookup_key, "0n.0nbobby.0nrobertpaulson");
  }

  #[test]
  fn ties_go_to_lowest_id() {
    let mut a = raw(4);
    a.display_name = Some("Second".into());
    let mut b = raw(2);
    b.display_name = Some("First".into());
    let summary = summarize(&[
      Member { raw: &a, points: &[] },
      Member { raw: &b, points: &[] },
    ]);
    assert_eq!(summary.display_name.as_deref(), Some("First"));
  }

  #[test]
  fn flags_reduce_across_members() {
    let mut a = raw(1);
    a.send_to_voicemail = Some(true);
    a.custom_ringtone = Some(" ".into());
    let mut b = raw(2);
    b.starred = true;
    b.custom_ringtone = Some("chime.ogg".into());
    let c = raw(3);

    let members = [
      Member { raw: &a, points: &[] },
      Member { raw: &b, points: &[] },
      Member { raw: &c, points: &[] },
    ];
    let summary = summarize(&members);
    assert!(summary.starred);
    assert!(summary.send_to_voicemail);
    assert_eq!(summary.custom_ringtone.as_deref(), Some("chime.ogg"));

    // No member states a preference.
    let (x, y) = (raw(5), raw(6));
    let unset = summarize(&[
      Member { raw: &x, points: &[] },
      Member { raw: &y, points: &[] },
    ]);
    assert!(!unset.send_to_voicemail);

    b.send_to_voicemail = Some(false);
    let members = [Member { raw: &a, points: &[] }, Member { raw: &b, points: &[] }];
    assert!(!summarize(&members).send_to_voicemail);
  }

  #[test]
  fn contact_point_fallbacks_are_ranked() {
    let a = raw(1);
    let points = [
      ContactPoint::Email("x@example.com".into()),
      ContactPoint::Phone("555-0100".into()),
    ];
    let (source, name) = display_name_candidate(&a, &points);
    assert_eq!(source, DisplayNameSource::Phone);
    assert_eq!(name.as_deref(), Some("555-0100"));
    assert_eq!(display_name_candidate(&a, &[]).0, DisplayNameSource::Undefined);
  }
}
