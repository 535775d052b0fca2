//! Engine tests against the in-memory backend.

use kith_core::{
  Error,
  aggregate::{AggregateContact, DisplayNameSource},
  contact::{
    Account, AggregateId, ContactPoint, NewRawContact, RawContactId,
    RawContactUpdate, StructuredName,
  },
  exception::ExceptionType,
  lookup::account_hash,
  store::{AggregationTx, ContactStore},
};

use crate::MemoryStore;

fn store() -> MemoryStore { MemoryStore::default() }

async fn insert(s: &MemoryStore, input: NewRawContact) -> RawContactId {
  s.insert_raw_contact(input).await.unwrap().id
}

async fn aggregate_of(s: &MemoryStore, id: RawContactId) -> AggregateId {
  s.aggregate_for_raw_contact(id)
    .await
    .unwrap()
    .expect("live raw contact has an aggregate")
}

async fn aggregate(s: &MemoryStore, id: AggregateId) -> AggregateContact {
  s.get_aggregate(id).await.unwrap().expect("aggregate exists")
}

fn email(address: &str) -> ContactPoint { ContactPoint::Email(address.into()) }

fn phone(number: &str) -> ContactPoint { ContactPoint::Phone(number.into()) }

// ─── Scenarios ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn spaced_and_unspaced_names_aggregate() {
  let s = store();
  let a = insert(&s, NewRawContact::named(Some("John"), Some("Doe"))).await;
  let b = insert(&s, NewRawContact::new().with_display_name("johndoe")).await;

  let id = aggregate_of(&s, a).await;
  assert_eq!(aggregate_of(&s, b).await, id);

  let contact = aggregate(&s, id).await;
  assert_eq!(contact.member_ids, vec![a, b]);
  assert_eq!(contact.summary.display_name.as_deref(), Some("John Doe"));
  assert_eq!(contact.summary.display_name_source, DisplayNameSource::FullName);
  assert_eq!(contact.summary.lookup_key, "0njohndoe.0njohndoe");
}

#[tokio::test]
async fn shared_source_id_across_accounts_is_not_a_match() {
  let s = store();
  let x = Account::new("com.example.x", "x@example.com");
  let y = Account::new("com.example.y", "y@example.com");
  let a = insert(&s, NewRawContact::new().with_account(x.clone()).with_source_id("1")).await;
  let b = insert(&s, NewRawContact::new().with_account(y.clone()).with_source_id("1")).await;

  let agg_a = aggregate_of(&s, a).await;
  let agg_b = aggregate_of(&s, b).await;
  assert_ne!(agg_a, agg_b);

  let key_a = aggregate(&s, agg_a).await.summary.lookup_key;
  let key_b = aggregate(&s, agg_b).await.summary.lookup_key;
  assert_eq!(key_a, format!("{}i1", account_hash(Some(&x))));
  assert_eq!(key_b, format!("{}i1", account_hash(Some(&y))));
  assert_ne!(key_a, key_b);
}

#[tokio::test]
async fn keep_out_splits_a_name_match() {
  let s = store();
  let a = insert(&s, NewRawContact::named(Some("John"), Some("Smith"))).await;
  let b = insert(&s, NewRawContact::new().with_display_name("Smith John")).await;
  let merged = aggregate_of(&s, a).await;
  assert_eq!(aggregate_of(&s, b).await, merged);
  assert_eq!(
    aggregate(&s, merged).await.summary.display_name.as_deref(),
    Some("John Smith")
  );

  s.set_exception(ExceptionType::KeepOut, b, a).await.unwrap();

  // The first member keeps the old identity.
  assert_eq!(aggregate_of(&s, a).await, merged);
  let split = aggregate_of(&s, b).await;
  assert_ne!(split, merged);
  assert_eq!(aggregate(&s, merged).await.member_ids, vec![a]);
  let b_contact = aggregate(&s, split).await;
  assert_eq!(b_contact.member_ids, vec![b]);
  assert_eq!(b_contact.summary.display_name.as_deref(), Some("Smith John"));
  assert_eq!(b_contact.summary.display_name_source, DisplayNameSource::PartialName);
}

#[tokio::test]
async fn stale_lookup_key_follows_the_larger_half() {
  let s = store();
  let mut ids = Vec::new();
  for source_id in ["1", "2", "3"] {
    let input = NewRawContact::named(Some("Ada"), Some("Lovelace")).with_source_id(source_id);
    ids.push(insert(&s, input).await);
  }
  let original = aggregate_of(&s, ids[0]).await;
  let key = aggregate(&s, original).await.summary.lookup_key;
  assert_eq!(key, "0i1.0i2.0i3");

  s.set_exception(ExceptionType::KeepSeparate, ids[0], ids[2]).await.unwrap();
  s.set_exception(ExceptionType::KeepSeparate, ids[1], ids[2]).await.unwrap();

  let pair = aggregate_of(&s, ids[0]).await;
  let single = aggregate_of(&s, ids[2]).await;
  assert_eq!(aggregate_of(&s, ids[1]).await, pair);
  assert_ne!(pair, single);
  assert_eq!(aggregate(&s, pair).await.summary.lookup_key, "0i1.0i2");
  assert_eq!(aggregate(&s, single).await.summary.lookup_key, "0i3");

  assert_eq!(s.resolve_lookup_key(&key).await.unwrap(), pair);
  assert_eq!(s.resolve_lookup_key("0i3").await.unwrap(), single);
}

#[tokio::test]
async fn matching_nicknames_aggregate_without_names() {
  let s = store();
  let a = insert(
    &s,
    NewRawContact::named(Some("Lucius"), Some("Best"))
      .with_point(ContactPoint::Nickname("Frozone".into())),
  )
  .await;
  let b = insert(&s, NewRawContact::new().with_point(ContactPoint::Nickname("Frozone".into()))).await;
  assert_eq!(aggregate_of(&s, a).await, aggregate_of(&s, b).await);
}

// ─── Matching rules ──────────────────────────────────────────────────────────

#[tokio::test]
async fn first_name_alone_never_aggregates() {
  let s = store();
  let a = insert(&s, NewRawContact::named(Some("Frank"), None)).await;
  let b = insert(&s, NewRawContact::named(Some("Frank"), Some("Zappa"))).await;
  let c = insert(&s, NewRawContact::named(Some("Frank"), None)).await;
  let d = insert(&s, NewRawContact::new().with_display_name("Frank")).await;

  let aggregates = [
    aggregate_of(&s, a).await,
    aggregate_of(&s, b).await,
    aggregate_of(&s, c).await,
  ];
  assert_ne!(aggregates[0], aggregates[1]);
  assert_ne!(aggregates[0], aggregates[2]);
  assert_ne!(aggregates[1], aggregates[2]);
  // A free-form single-token display name is not a structured first name.
  assert_ne!(aggregate_of(&s, d).await, aggregates[0]);
}

#[tokio::test]
async fn last_name_alone_aggregates() {
  let s = store();
  let a = insert(&s, NewRawContact::named(None, Some("Johnson"))).await;
  let b = insert(&s, NewRawContact::named(None, Some("johnson"))).await;
  assert_eq!(aggregate_of(&s, a).await, aggregate_of(&s, b).await);
}

#[tokio::test]
async fn nickname_cluster_of_given_name_matches() {
  let s = store();
  let a = insert(&s, NewRawContact::named(Some("Bill"), Some("Smith"))).await;
  let b = insert(&s, NewRawContact::named(Some("William"), Some("Smith"))).await;
  let c = insert(&s, NewRawContact::named(Some("Bill"), Some("Jones"))).await;
  assert_eq!(aggregate_of(&s, a).await, aggregate_of(&s, b).await);
  assert_ne!(aggregate_of(&s, a).await, aggregate_of(&s, c).await);
}

#[tokio::test]
async fn phone_numbers_match_on_suffix() {
  let s = store();
  let a = insert(&s, NewRawContact::named(Some("Ann"), Some("Lee")).with_point(phone("+1 (650) 555-1234"))).await;
  let b = insert(&s, NewRawContact::new().with_point(phone("555 1234"))).await;
  assert_eq!(aggregate_of(&s, a).await, aggregate_of(&s, b).await);
}

#[tokio::test]
async fn exact_matches_close_transitively() {
  let s = store();
  let a = insert(&s, NewRawContact::new().with_point(email("a@example.com"))).await;
  let c = insert(&s, NewRawContact::new().with_point(phone("555-0100"))).await;
  let agg_a = aggregate_of(&s, a).await;
  let agg_c = aggregate_of(&s, c).await;
  assert_ne!(agg_a, agg_c);

  // b bridges a and c; the two aggregates collapse into one.
  let b = insert(
    &s,
    NewRawContact::new()
      .with_point(email("A@Example.com "))
      .with_point(phone("5550100")),
  )
  .await;
  let merged = aggregate_of(&s, b).await;
  assert_eq!(aggregate_of(&s, a).await, merged);
  assert_eq!(aggregate_of(&s, c).await, merged);
  assert_eq!(merged, agg_a);
  assert!(s.get_aggregate(agg_c).await.unwrap().is_none());
}

#[tokio::test]
async fn changing_contact_points_regroups() {
  let s = store();
  let a = insert(&s, NewRawContact::named(Some("Alice"), Some("Walker")).with_point(email("alice@example.com"))).await;
  let b = insert(&s, NewRawContact::new().with_display_name("Al")).await;
  assert_ne!(aggregate_of(&s, a).await, aggregate_of(&s, b).await);

  s.set_contact_points(b, vec![email("alice@example.com")]).await.unwrap();
  assert_eq!(aggregate_of(&s, a).await, aggregate_of(&s, b).await);
  let raw = s.get_raw_contact(b).await.unwrap().unwrap();
  assert_eq!(raw.version, 2);
  assert!(raw.dirty);

  s.set_contact_points(b, Vec::new()).await.unwrap();
  assert_ne!(aggregate_of(&s, a).await, aggregate_of(&s, b).await);
}

#[tokio::test]
async fn renaming_splits_and_updates_display_name() {
  let s = store();
  let a = insert(&s, NewRawContact::named(Some("John"), Some("Doe"))).await;
  let b = insert(&s, NewRawContact::named(Some("John"), Some("Doe"))).await;
  let merged = aggregate_of(&s, a).await;
  assert_eq!(aggregate_of(&s, b).await, merged);

  let update = RawContactUpdate {
    name: Some(StructuredName::new(Some("Jane"), Some("Roe"))),
    ..RawContactUpdate::default()
  };
  let updated = s.update_raw_contact(b, update).await.unwrap();
  assert_eq!(updated.version, 2);
  assert_ne!(updated.aggregate_id, Some(merged));
  let renamed = aggregate(&s, aggregate_of(&s, b).await).await;
  assert_eq!(renamed.summary.display_name.as_deref(), Some("Jane Roe"));
}

// ─── Exceptions ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn keep_out_wins_over_every_exact_signal() {
  let s = store();
  let person = || {
    NewRawContact::named(Some("Grace"), Some("Hopper"))
      .with_point(email("grace@navy.mil"))
      .with_point(phone("202-555-0199"))
  };
  let a = insert(&s, person()).await;
  let b = insert(&s, person()).await;
  assert_eq!(aggregate_of(&s, a).await, aggregate_of(&s, b).await);

  s.set_exception(ExceptionType::KeepOut, a, b).await.unwrap();
  assert_ne!(aggregate_of(&s, a).await, aggregate_of(&s, b).await);

  // A third identical record may join one of them, never both.
  let c = insert(&s, person()).await;
  let agg_c = aggregate_of(&s, c).await;
  assert!(agg_c == aggregate_of(&s, a).await || agg_c == aggregate_of(&s, b).await);
  assert_ne!(aggregate_of(&s, a).await, aggregate_of(&s, b).await);

  s.reaggregate_all().await.unwrap();
  assert_ne!(aggregate_of(&s, a).await, aggregate_of(&s, b).await);
}

#[tokio::test]
async fn keep_in_joins_unrelated_contacts_until_cleared() {
  let s = store();
  let a = insert(&s, NewRawContact::new().with_display_name("Alice")).await;
  let b = insert(&s, NewRawContact::new().with_display_name("Bob")).await;
  assert_ne!(aggregate_of(&s, a).await, aggregate_of(&s, b).await);

  s.set_exception(ExceptionType::KeepIn, a, b).await.unwrap();
  assert_eq!(aggregate_of(&s, a).await, aggregate_of(&s, b).await);
  assert_eq!(s.directives(b).await.unwrap().len(), 1);

  s.set_exception(ExceptionType::Automatic, b, a).await.unwrap();
  assert_ne!(aggregate_of(&s, a).await, aggregate_of(&s, b).await);
  assert!(s.directives(a).await.unwrap().is_empty());
}

#[tokio::test]
async fn separation_takes_precedence_over_keep_in_chains() {
  let s = store();
  let a = insert(&s, NewRawContact::new().with_point(email("shared@example.com"))).await;
  let b = insert(&s, NewRawContact::new().with_display_name("Bystander")).await;
  let c = insert(&s, NewRawContact::new().with_point(email("shared@example.com"))).await;
  assert_eq!(aggregate_of(&s, a).await, aggregate_of(&s, c).await);

  s.set_exception(ExceptionType::KeepOut, b, c).await.unwrap();
  s.set_exception(ExceptionType::KeepIn, a, b).await.unwrap();

  assert_eq!(aggregate_of(&s, a).await, aggregate_of(&s, b).await);
  assert_ne!(aggregate_of(&s, b).await, aggregate_of(&s, c).await);
}

#[tokio::test]
async fn invalid_exception_writes_are_rejected() {
  let s = store();
  let a = insert(&s, NewRawContact::new().with_display_name("Alice")).await;

  let err = s.set_exception(ExceptionType::KeepIn, a, a).await.unwrap_err();
  assert!(matches!(err, Error::SelfException(_)));

  let err = s
    .set_exception(ExceptionType::KeepIn, a, RawContactId(999))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::RawContactNotFound(RawContactId(999))));
  assert!(s.directives(a).await.unwrap().is_empty());
}

// ─── Deletion ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn soft_delete_detaches_and_empties() {
  let s = store();
  let a = insert(&s, NewRawContact::named(Some("John"), Some("Doe")).with_source_id("a")).await;
  let b = insert(&s, NewRawContact::named(Some("John"), Some("Doe")).with_source_id("b")).await;
  let merged = aggregate_of(&s, a).await;

  s.delete_raw_contact(b).await.unwrap();
  let deleted = s.get_raw_contact(b).await.unwrap().unwrap();
  assert!(deleted.deleted);
  assert_eq!(deleted.aggregate_id, None);
  assert_eq!(aggregate(&s, merged).await.summary.lookup_key, "0ia");

  // A new record with the same name no longer sees the deleted one.
  let c = insert(&s, NewRawContact::named(Some("John"), Some("Doe"))).await;
  assert_eq!(aggregate(&s, merged).await.member_ids, vec![a, c]);

  s.delete_raw_contact(a).await.unwrap();
  s.delete_raw_contact(c).await.unwrap();
  assert!(s.get_aggregate(merged).await.unwrap().is_none());
  let err = s.resolve_lookup_key("0ia").await.unwrap_err();
  assert!(matches!(err, Error::StaleLookupKey(_)));
}

#[tokio::test]
async fn purge_removes_row_and_directives() {
  let s = store();
  let a = insert(&s, NewRawContact::new().with_display_name("Alice")).await;
  let b = insert(&s, NewRawContact::new().with_display_name("Bob")).await;
  s.set_exception(ExceptionType::KeepIn, a, b).await.unwrap();
  let merged = aggregate_of(&s, a).await;

  s.purge_raw_contact(a).await.unwrap();
  assert!(s.get_raw_contact(a).await.unwrap().is_none());
  assert!(s.directives(b).await.unwrap().is_empty());
  assert_eq!(aggregate_of(&s, b).await, merged);
  assert_eq!(aggregate(&s, merged).await.member_ids, vec![b]);

  let err = s.purge_raw_contact(a).await.unwrap_err();
  assert!(err.is_not_found());
}

// ─── Lookup keys ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn lookup_key_errors_are_not_found() {
  let s = store();
  insert(&s, NewRawContact::named(Some("Ada"), Some("Lovelace")).with_source_id("1")).await;

  let err = s.resolve_lookup_key("0x1").await.unwrap_err();
  assert!(matches!(err, Error::InvalidLookupKey(_)));
  assert!(err.is_not_found());

  let err = s.resolve_lookup_key("0i999").await.unwrap_err();
  assert!(matches!(err, Error::StaleLookupKey(_)));
  assert!(err.is_not_found());

  // Same source id, wrong account.
  let err = s.resolve_lookup_key("17i1").await.unwrap_err();
  assert!(matches!(err, Error::StaleLookupKey(_)));
}

#[tokio::test]
async fn lookup_key_tie_goes_to_lowest_aggregate() {
  let s = store();
  let a = insert(&s, NewRawContact::named(Some("Ada"), Some("Lovelace")).with_source_id("1")).await;
  let b = insert(&s, NewRawContact::named(Some("Grace"), Some("Hopper")).with_source_id("2")).await;
  let (ga, gb) = (aggregate_of(&s, a).await, aggregate_of(&s, b).await);
  assert!(ga < gb);

  // One hit each; listing the higher aggregate first must not matter.
  assert_eq!(s.resolve_lookup_key("0i2.0i1").await.unwrap(), ga);
  assert_eq!(s.resolve_lookup_key("0i1.0i2").await.unwrap(), ga);
}

#[tokio::test]
async fn name_segments_resolve_by_display_name() {
  let s = store();
  let a = insert(&s, NewRawContact::named(Some("Ada"), Some("Lovelace"))).await;
  let id = aggregate_of(&s, a).await;
  assert_eq!(s.resolve_lookup_key("nadalovelace").await.unwrap(), id);
  assert_eq!(s.resolve_lookup_key("0nadalovelace.0i42").await.unwrap(), id);
}

// ─── Suggestions ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn similar_names_are_suggested_not_merged() {
  let s = store();
  let a = insert(&s, NewRawContact::named(Some("Marcus"), Some("Aurelius"))).await;
  let b = insert(&s, NewRawContact::named(Some("Markus"), Some("Aurelius"))).await;
  insert(&s, NewRawContact::named(Some("Zed"), Some("Zulu"))).await;
  let agg_a = aggregate_of(&s, a).await;
  let agg_b = aggregate_of(&s, b).await;
  assert_ne!(agg_a, agg_b);

  let suggestions = s.suggestions(agg_a).await.unwrap();
  assert_eq!(suggestions.len(), 1);
  assert_eq!(suggestions[0].aggregate_id, agg_b);
  assert_eq!(suggestions[0].display_name.as_deref(), Some("Markus Aurelius"));
  assert!(suggestions[0].similarity > 0.8 && suggestions[0].similarity < 1.0);

  s.set_exception(ExceptionType::KeepOut, a, b).await.unwrap();
  assert!(s.suggestions(agg_a).await.unwrap().is_empty());

  let err = s.suggestions(AggregateId(999)).await.unwrap_err();
  assert!(matches!(err, Error::AggregateNotFound(_)));
}

// ─── Consistency ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn repeated_resolution_is_a_noop() {
  let s = store();
  let a = insert(&s, NewRawContact::named(Some("John"), Some("Doe")).with_point(email("j@d.org"))).await;
  insert(&s, NewRawContact::new().with_point(email("j@d.org"))).await;
  insert(&s, NewRawContact::new().with_display_name("Someone Else")).await;
  let before = aggregate(&s, aggregate_of(&s, a).await).await;

  let report = s.reaggregate_all().await.unwrap();
  assert!(report.is_noop(), "{report:?}");
  assert_eq!(report.examined, 3);

  let report = s.transact(|agg, tx| agg.on_raw_contact_changed(tx, a)).unwrap();
  assert!(report.is_noop(), "{report:?}");

  let unchanged = s.update_raw_contact(a, RawContactUpdate::default()).await.unwrap();
  assert_eq!(unchanged.version, 1);
  assert_eq!(aggregate(&s, aggregate_of(&s, a).await).await, before);
}

#[tokio::test]
async fn sweep_repairs_unresolved_contacts() {
  let s = store();
  // Rows written behind the engine's back: no aggregates, no keys.
  s.transact(|_, tx| {
    for _ in 0..2 {
      let input = NewRawContact::named(Some("Ada"), Some("Lovelace"));
      let raw = tx.insert_raw_contact(&input, chrono::Utc::now())?;
      assert_eq!(raw.aggregate_id, None);
    }
    Ok(())
  })
  .unwrap();

  let report = s.reaggregate_all().await.unwrap();
  assert_eq!(report.examined, 2);
  assert_eq!(report.aggregates_created, 1);
  assert_eq!(report.moved, 2);
  let a = aggregate_of(&s, RawContactId(1)).await;
  assert_eq!(aggregate_of(&s, RawContactId(2)).await, a);

  assert!(s.reaggregate_all().await.unwrap().is_noop());
}

#[tokio::test]
async fn failed_unit_of_work_leaves_no_trace() {
  let s = store();
  let a = insert(&s, NewRawContact::named(Some("John"), Some("Doe"))).await;
  let before = aggregate_of(&s, a).await;

  let result: kith_core::Result<()> = s.transact(|agg, tx| {
    agg.insert_raw_contact(tx, &NewRawContact::named(Some("John"), Some("Doe")))?;
    agg.set_exception(tx, ExceptionType::KeepOut, a, RawContactId(2))?;
    Err(Error::Storage("disk full".into()))
  });
  assert!(matches!(result, Err(Error::Storage(_))));

  assert!(s.get_raw_contact(RawContactId(2)).await.unwrap().is_none());
  assert!(s.directives(a).await.unwrap().is_empty());
  assert_eq!(aggregate(&s, before).await.member_ids, vec![a]);
}
