//! End-to-end tests of the persistence pipeline against the in-memory backend.

use std::sync::LazyLock;

use bson::{Bson, doc};
use odmlayer::memory::InMemoryStore;
use odmlayer::prelude::*;

struct Note;

impl Model for Note {
    fn collection_name() -> &'static str {
        "notes"
    }
}

struct Profile;

impl Model for Profile {
    fn collection_name() -> &'static str {
        "profiles"
    }

    fn contexts() -> &'static AccessContexts {
        static CONTEXTS: LazyLock<AccessContexts> = LazyLock::new(|| {
            AccessContexts::new()
                .declare_writable(None, ["bio", "avatar"])
                .declare_writable(Some("owner"), ["bio", "avatar", "email"])
                .declare_readable(Some("public"), ["bio"])
        });
        &CONTEXTS
    }
}

struct Signup;

impl Model for Signup {
    fn collection_name() -> &'static str {
        "signups"
    }

    fn validate(record: &Record<Self>) -> Vec<String> {
        let mut failing = Vec::new();
        if record.get("email").is_none() {
            failing.push("email".to_string());
        }
        failing
    }
}

struct StampHook;

impl SaveHook<Audited> for StampHook {
    fn before_save<'a>(&'a self, record: &'a mut Record<Audited>) -> HookFuture<'a> {
        Box::pin(async move {
            record.set("stamped", true)?;
            Ok(())
        })
    }

    fn after_save<'a>(&'a self, record: &'a mut Record<Audited>) -> HookFuture<'a> {
        Box::pin(async move {
            // Reload has run by now, so the stamp must have round-tripped.
            assert_eq!(record.get("stamped"), Some(&Bson::Boolean(true)));
            Ok(())
        })
    }
}

struct Audited;

impl Model for Audited {
    fn collection_name() -> &'static str {
        "audited"
    }

    fn save_hooks() -> &'static [&'static dyn SaveHook<Self>] {
        static HOOKS: [&dyn SaveHook<Audited>; 1] = [&StampHook];
        &HOOKS
    }
}

struct Enrichable;

fn enrich(record: &mut Record<Enrichable>) -> HookFuture<'_> {
    Box::pin(async move {
        record.set("enriched", true)?;
        Ok(())
    })
}

fn fail(_record: &mut Record<Enrichable>) -> HookFuture<'_> {
    Box::pin(async move { Err(OdmError::Backend("enrichment source down".into())) })
}

impl Model for Enrichable {
    fn collection_name() -> &'static str {
        "enrichable"
    }

    fn capabilities() -> Option<&'static CapabilityRegistry<Self>> {
        static REGISTRY: LazyLock<CapabilityRegistry<Enrichable>> = LazyLock::new(|| {
            CapabilityRegistry::new()
                .register("enrich", enrich)
                .register("fail", fail)
        });
        Some(&REGISTRY)
    }
}

fn store() -> ModelStore<InMemoryStore> {
    ModelStore::new(InMemoryStore::new())
}

#[tokio::test]
async fn create_assigns_identity_and_timestamps() {
    let store = store();
    let notes = store.repository::<Note>();

    let note = notes
        .create(&doc! { "title": "first" }, &SaveOptions::new())
        .await
        .unwrap();

    assert!(!note.is_new());
    assert!(matches!(note.id(), Some(Bson::ObjectId(_))));
    assert!(matches!(note.get("created_at"), Some(Bson::DateTime(_))));
    assert!(matches!(note.get("updated_at"), Some(Bson::DateTime(_))));
    assert_eq!(note.persisted_state(), Some(note.state()));
}

#[tokio::test]
async fn save_writes_only_the_diff() {
    let store = store();
    let notes = store.repository::<Note>();

    let mut note = notes
        .create(&doc! { "title": "first", "body": "text" }, &SaveOptions::new())
        .await
        .unwrap();

    // Another writer touches a field this record never edits.
    notes
        .direct_update_with(&mut note.clone(), &doc! { "$set": { "views": 9 } })
        .await
        .unwrap();

    note.set("title", "second").unwrap();
    notes.save(&mut note, &SaveOptions::new()).await.unwrap();

    // The out-of-band write survives because only dirty paths were patched.
    assert_eq!(note.get("views"), Some(&Bson::Int32(9)));
    assert_eq!(note.get("title"), Some(&Bson::String("second".into())));
}

#[tokio::test]
async fn unedited_save_still_bumps_updated_at() {
    let store = store();
    let notes = store.repository::<Note>();

    let mut note = notes
        .create(&doc! { "title": "t" }, &SaveOptions::new())
        .await
        .unwrap();
    let first = note.get("updated_at").cloned();

    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    notes.save(&mut note, &SaveOptions::new()).await.unwrap();

    assert_ne!(note.get("updated_at").cloned(), first);
}

#[tokio::test]
async fn out_of_context_edits_roll_back_on_save() {
    let store = store();
    let profiles = store.repository::<Profile>();

    let mut profile = profiles
        .create(
            &doc! { "bio": "hi", "email": "a@b.c" },
            &SaveOptions::new().with_context(ALL_CONTEXT),
        )
        .await
        .unwrap();

    profile.set("bio", "hello").unwrap();
    profile.set("email", "evil@b.c").unwrap();
    profiles
        .save(&mut profile, &SaveOptions::new())
        .await
        .unwrap();

    assert_eq!(profile.get("bio"), Some(&Bson::String("hello".into())));
    assert_eq!(profile.get("email"), Some(&Bson::String("a@b.c".into())));
}

#[tokio::test]
async fn owner_context_widens_the_writable_set() {
    let store = store();
    let profiles = store.repository::<Profile>();

    let mut profile = profiles
        .create(
            &doc! { "bio": "hi", "email": "a@b.c" },
            &SaveOptions::new().with_context(ALL_CONTEXT),
        )
        .await
        .unwrap();

    profile.set("email", "new@b.c").unwrap();
    profiles
        .save(&mut profile, &SaveOptions::new().with_context("owner"))
        .await
        .unwrap();

    assert_eq!(profile.get("email"), Some(&Bson::String("new@b.c".into())));
}

#[tokio::test]
async fn readable_projection_hides_undeclared_fields() {
    let store = store();
    let profiles = store.repository::<Profile>();

    let profile = profiles
        .create(
            &doc! { "bio": "hi", "email": "a@b.c" },
            &SaveOptions::new().with_context(ALL_CONTEXT),
        )
        .await
        .unwrap();

    let public = profile.readable_document(Some("public")).unwrap();
    assert!(public.get("bio").is_some());
    assert!(public.get("_id").is_some());
    assert!(public.get("email").is_none());
}

#[tokio::test]
async fn validation_failure_aborts_before_storage() {
    let store = store();
    let signups = store.repository::<Signup>();

    let result = signups
        .create(&doc! { "name": "no-email" }, &SaveOptions::new())
        .await;

    match result {
        Err(err @ OdmError::Validation(_, _)) => {
            assert!(err.to_string().starts_with("signups.ValidationError"));
        }
        other => panic!("expected validation error, got {other:?}"),
    }
    assert!(
        signups
            .get(doc! { "name": "no-email" })
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn skip_validation_lets_invalid_records_through() {
    let store = store();
    let signups = store.repository::<Signup>();

    signups
        .create(
            &doc! { "name": "no-email" },
            &SaveOptions::new().skipping_validation(),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn save_hooks_wrap_the_save() {
    let store = store();
    let audited = store.repository::<Audited>();

    let record = audited
        .create(&doc! { "event": "login" }, &SaveOptions::new())
        .await
        .unwrap();

    assert_eq!(record.get("stamped"), Some(&Bson::Boolean(true)));
}

#[tokio::test]
async fn get_rejects_ambiguous_matches() {
    let store = store();
    let notes = store.repository::<Note>();

    notes
        .create(&doc! { "kind": "x" }, &SaveOptions::new())
        .await
        .unwrap();
    notes
        .create(&doc! { "kind": "x" }, &SaveOptions::new())
        .await
        .unwrap();

    let result = notes.get(doc! { "kind": "x" }).await;
    match result {
        Err(err @ OdmError::MultipleResults(_, _)) => {
            assert!(err.to_string().starts_with("notes.ResultError"));
        }
        other => panic!("expected result error, got {other:?}"),
    }
}

#[tokio::test]
async fn get_by_id_accepts_hex_strings() {
    let store = store();
    let notes = store.repository::<Note>();

    let note = notes
        .create(&doc! { "title": "t" }, &SaveOptions::new())
        .await
        .unwrap();
    let Some(Bson::ObjectId(oid)) = note.id() else {
        panic!("expected an object id");
    };

    let fetched = notes
        .get_by_id(&Bson::String(oid.to_hex()))
        .await
        .unwrap();
    assert!(fetched.is_some());

    assert!(matches!(
        notes.get_by_id(&Bson::String("nope".into())).await,
        Err(OdmError::Identifier(_))
    ));
}

#[tokio::test]
async fn reload_of_an_unsaved_record_is_a_no_op() {
    let store = store();
    let notes = store.repository::<Note>();

    let mut note = Record::with_data(&doc! { "title": "draft" });
    notes.reload(&mut note).await.unwrap();

    assert!(note.is_new());
    assert_eq!(note.get("title"), Some(&Bson::String("draft".into())));
}

#[tokio::test]
async fn destroying_an_unsaved_record_is_a_no_op() {
    let store = store();
    let notes = store.repository::<Note>();

    let mut note = Record::<Note>::with_data(&doc! { "title": "draft" });
    notes.destroy(&mut note).await.unwrap();

    assert!(!note.is_destroyed());
    notes.save(&mut note, &SaveOptions::new()).await.unwrap();
    assert!(!note.is_new());
}

#[tokio::test]
async fn destroy_keeps_working_state_but_blocks_saves() {
    let store = store();
    let notes = store.repository::<Note>();

    let mut note = notes
        .create(&doc! { "title": "doomed" }, &SaveOptions::new())
        .await
        .unwrap();
    notes.destroy(&mut note).await.unwrap();

    assert!(note.is_destroyed());
    assert!(note.persisted_state().is_none());
    assert_eq!(note.get("title"), Some(&Bson::String("doomed".into())));
    assert!(notes.all().await.unwrap().to_array().await.unwrap().is_empty());

    let result = notes.save(&mut note, &SaveOptions::new()).await;
    match result {
        Err(err @ OdmError::Persistence(_, _)) => {
            assert_eq!(err.to_string(), "notes.PersistenceError: no records updated");
        }
        other => panic!("expected persistence error, got {other:?}"),
    }
}

#[tokio::test]
async fn saving_a_vanished_record_fails_like_a_destroyed_one() {
    let store = store();
    let notes = store.repository::<Note>();

    let mut note = notes
        .create(&doc! { "title": "t" }, &SaveOptions::new())
        .await
        .unwrap();

    // Deleted out from under us, flag never set.
    let mut shadow = note.clone();
    notes.destroy(&mut shadow).await.unwrap();

    note.set("title", "u").unwrap();
    assert!(matches!(
        notes.save(&mut note, &SaveOptions::new()).await,
        Err(OdmError::Persistence(_, _))
    ));
}

#[tokio::test]
async fn update_with_merges_and_skips_nulls() {
    let store = store();
    let notes = store.repository::<Note>();

    let mut note = notes
        .create(
            &doc! { "profile": { "a": 1, "b": 2 } },
            &SaveOptions::new(),
        )
        .await
        .unwrap();

    notes
        .update_with(
            &mut note,
            &doc! { "profile": { "b": 9, "c": 3 }, "skipme": Bson::Null },
            &SaveOptions::new(),
        )
        .await
        .unwrap();

    assert_eq!(note.get("profile.a"), Some(&Bson::Int32(1)));
    assert_eq!(note.get("profile.b"), Some(&Bson::Int32(9)));
    assert_eq!(note.get("profile.c"), Some(&Bson::Int32(3)));
    assert_eq!(note.get("skipme"), None);
}

#[tokio::test]
async fn direct_update_bypasses_the_pipeline() {
    let store = store();
    let notes = store.repository::<Note>();

    let mut note = notes
        .create(&doc! { "title": "t" }, &SaveOptions::new())
        .await
        .unwrap();
    let stamped = note.get("updated_at").cloned();

    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    notes
        .direct_update_with(&mut note, &doc! { "views": 1, "$unset": { "title": "" } })
        .await
        .unwrap();

    assert_eq!(note.get("views"), Some(&Bson::Int32(1)));
    assert_eq!(note.get("title"), None);
    // No timestamping on the direct path.
    assert_eq!(note.get("updated_at").cloned(), stamped);
    assert!(note.dirty_fields().is_empty());
}

#[tokio::test]
async fn get_or_initialize_seeds_from_plain_filter_fields() {
    let store = store();
    let notes = store.repository::<Note>();

    let record = notes
        .get_or_initialize(doc! { "title": "fresh", "views": { "$gt": 10 } })
        .await
        .unwrap();

    assert!(record.is_new());
    assert_eq!(record.get("title"), Some(&Bson::String("fresh".into())));
    assert_eq!(record.get("views"), None);
}

#[tokio::test]
async fn get_or_create_persists_the_fallback() {
    let store = store();
    let notes = store.repository::<Note>();

    let first = notes
        .get_or_create(doc! { "title": "only" }, &SaveOptions::new())
        .await
        .unwrap();
    assert!(!first.is_new());

    let second = notes
        .get_or_create(doc! { "title": "only" }, &SaveOptions::new())
        .await
        .unwrap();
    assert_eq!(first.id(), second.id());
}

#[tokio::test]
async fn cursors_sort_limit_and_iterate() {
    let store = store();
    let notes = store.repository::<Note>();

    for n in [2, 3, 1] {
        notes
            .create(&doc! { "n": n }, &SaveOptions::new())
            .await
            .unwrap();
    }

    let records = notes
        .all()
        .await
        .unwrap()
        .sort(doc! { "n": 1 })
        .limit(2)
        .to_array()
        .await
        .unwrap();

    let ns: Vec<_> = records
        .iter()
        .map(|r| r.get("n").cloned().unwrap())
        .collect();
    assert_eq!(ns, vec![Bson::Int32(1), Bson::Int32(2)]);
}

#[tokio::test]
async fn count_reports_matches_and_explain_degrades() {
    let store = store();
    let notes = store.repository::<Note>();

    for n in 1..=3 {
        notes
            .create(&doc! { "n": n }, &SaveOptions::new())
            .await
            .unwrap();
    }

    let mut cursor = notes.all().await.unwrap().limit(1);
    assert_eq!(cursor.count().await.unwrap(), Some(3));
    // The in-memory backend has no query planner to report.
    assert_eq!(cursor.explain().await.unwrap(), None);

    assert_eq!(cursor.to_array().await.unwrap().len(), 1);
}

#[tokio::test]
async fn preload_runs_capabilities_on_hydration() {
    let store = store();
    let repo = store.repository::<Enrichable>();

    repo.create(&doc! { "name": "a" }, &SaveOptions::new())
        .await
        .unwrap();

    let records = repo
        .all()
        .await
        .unwrap()
        .preload(["enrich"])
        .to_array()
        .await
        .unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].get("enriched"), Some(&Bson::Boolean(true)));
}

#[tokio::test]
async fn preload_failures_and_unknown_names_surface() {
    let store = store();
    let repo = store.repository::<Enrichable>();

    repo.create(&doc! { "name": "a" }, &SaveOptions::new())
        .await
        .unwrap();

    let failing = repo
        .all()
        .await
        .unwrap()
        .preload(["fail"])
        .to_array()
        .await;
    assert!(matches!(failing, Err(OdmError::Backend(_))));

    let unknown = repo
        .all()
        .await
        .unwrap()
        .preload(["nope"])
        .to_array()
        .await;
    assert!(matches!(unknown, Err(OdmError::Argument(_))));
}

#[tokio::test]
async fn preload_on_a_capability_free_model_is_an_argument_error() {
    let store = store();
    let notes = store.repository::<Note>();

    notes
        .create(&doc! { "title": "t" }, &SaveOptions::new())
        .await
        .unwrap();

    let result = notes
        .all()
        .await
        .unwrap()
        .preload(["anything"])
        .to_array()
        .await;
    assert!(matches!(result, Err(OdmError::Argument(_))));
}
