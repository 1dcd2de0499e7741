//! Mutation coordinator integration tests
//!
//! Drives verify/reject/create/update/delete through a session backed by the
//! in-memory records API and checks what the store holds afterwards:
//! - aggregate status after each kontiki decision
//! - local validation before any network call
//! - invalidation and refetch on success, untouched cache on failure

mod common;

use biochar_sdk::{CacheKey, RecordKind, RecordStatus, SdkError, UnitStatus, VerificationEvent};
use common::{production_record, session, sourcing_record, MockBackend};

const PRODUCTION: RecordKind = RecordKind::Production;

fn detail_key(id: &str) -> CacheKey {
    CacheKey::record(PRODUCTION, id)
}

// =============================================================================
// Kontiki Verification
// =============================================================================

#[tokio::test]
async fn test_verify_each_kontiki_moves_aggregate() {
    let backend =
        MockBackend::with_records(vec![production_record("rec-1", &["k-1", "k-2", "k-3"])]);
    let session = session(&backend);

    let record = session.record(PRODUCTION, "rec-1").await.unwrap();
    assert_eq!(record.status(), RecordStatus::Submitted);

    session.verify(PRODUCTION, "rec-1", "k-1").await.unwrap();
    let cached = session.store().get(&detail_key("rec-1")).unwrap();
    assert!(!cached.stale);
    let record = cached.value.as_record().unwrap();
    assert_eq!(record.status(), RecordStatus::PartiallyVerified);
    assert_eq!(record.sub_unit("k-1").unwrap().status(), UnitStatus::Verified);

    session.verify(PRODUCTION, "rec-1", "k-2").await.unwrap();
    session.verify(PRODUCTION, "rec-1", "k-3").await.unwrap();

    let record = session.record(PRODUCTION, "rec-1").await.unwrap();
    assert_eq!(record.status(), RecordStatus::Verified);
    assert!(record
        .sub_units()
        .iter()
        .all(|u| u.review.verified_by_id.as_deref() == Some("reviewer-1")));

    // One initial load plus one refetch per verify
    assert_eq!(backend.gets(), 4);
    assert_eq!(backend.commands(), 3);
}

#[tokio::test]
async fn test_reject_one_of_two_is_in_progress() {
    let backend = MockBackend::with_records(vec![production_record("rec-1", &["k-1", "k-2"])]);
    let session = session(&backend);

    session
        .reject(PRODUCTION, "rec-1", "k-1", "poor photo quality")
        .await
        .unwrap();

    let record = session.record(PRODUCTION, "rec-1").await.unwrap();
    assert_eq!(record.status(), RecordStatus::InProgress);

    let rejected = record.sub_unit("k-1").unwrap();
    assert_eq!(rejected.status(), UnitStatus::Rejected);
    assert_eq!(rejected.review.rejection_note.as_deref(), Some("poor photo quality"));
    assert!(rejected.review.verified_at.is_none());
    assert_eq!(record.sub_unit("k-2").unwrap().status(), UnitStatus::Submitted);
}

#[tokio::test]
async fn test_empty_note_rejected_before_network() {
    let backend = MockBackend::with_records(vec![production_record("rec-1", &["k-1", "k-2"])]);
    let session = session(&backend);

    session.record(PRODUCTION, "rec-1").await.unwrap();
    let before = session.store().get(&detail_key("rec-1")).unwrap();

    for note in ["", "   \n\t"] {
        let err = session.reject(PRODUCTION, "rec-1", "k-1", note).await.unwrap_err();
        assert!(matches!(err, SdkError::Validation(_)), "got {:?}", err);
    }

    let after = session.store().get(&detail_key("rec-1")).unwrap();
    assert_eq!(after.fetched_at, before.fetched_at);
    assert!(!after.stale);
    assert_eq!(backend.gets(), 1);
    assert_eq!(backend.commands(), 0);
}

#[tokio::test]
async fn test_refetch_failure_leaves_keys_stale() {
    let backend = MockBackend::with_records(vec![production_record("rec-1", &["k-1", "k-2"])]);
    let session = session(&backend);
    let page_key = session.collection_key(PRODUCTION, 1);

    session.collection(PRODUCTION, 1).await.unwrap();
    session.record(PRODUCTION, "rec-1").await.unwrap();

    backend.fail_next_get(SdkError::Network("connection reset".into()));
    let err = session.verify(PRODUCTION, "rec-1", "k-1").await.unwrap_err();
    assert!(err.is_network());

    // Committed on the server, but the store has not caught up
    let stored = backend.stored(PRODUCTION, "rec-1").unwrap();
    assert_eq!(stored.sub_unit("k-1").unwrap().status(), UnitStatus::Verified);

    let page = session.store().get(&page_key).unwrap();
    assert!(page.stale);
    let detail = session.store().get(&detail_key("rec-1")).unwrap();
    assert!(detail.stale);
    assert_eq!(detail.value.as_record().unwrap().status(), RecordStatus::Submitted);

    // Next successful fetch converges
    let page = session.collection(PRODUCTION, 1).await.unwrap();
    let record = page.find("rec-1").unwrap();
    assert_eq!(record.status(), RecordStatus::PartiallyVerified);
    assert!(!session.store().get(&page_key).unwrap().stale);
}

#[tokio::test]
async fn test_overlapping_verifies_resolve_after_store_reflects_them() {
    let backend = MockBackend::with_records(vec![production_record("rec-1", &["k-1", "k-2"])]);
    let session = session(&backend);
    session.record(PRODUCTION, "rec-1").await.unwrap();

    let gate = backend.gate_gets();
    let verify = |kontiki_id: &'static str| {
        let session = session.clone();
        tokio::spawn(async move {
            session.verify(PRODUCTION, "rec-1", kontiki_id).await?;
            // What a caller re-reading the store sees the moment it resolves
            Ok::<_, SdkError>(session.store().get(&detail_key("rec-1")).unwrap())
        })
    };
    let first = verify("k-1");
    let second = verify("k-2");

    while backend.commands() < 2 {
        tokio::task::yield_now().await;
    }
    // Release the held refetches one at a time
    for _ in 0..10 {
        if first.is_finished() && second.is_finished() {
            break;
        }
        gate.add_permits(1);
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    for seen in [first.await.unwrap().unwrap(), second.await.unwrap().unwrap()] {
        assert!(!seen.stale);
        let record = seen.value.as_record().unwrap();
        assert_eq!(record.sub_unit("k-1").unwrap().status(), UnitStatus::Verified);
        assert_eq!(record.sub_unit("k-2").unwrap().status(), UnitStatus::Verified);
        assert_eq!(record.status(), RecordStatus::Verified);
    }
}

#[tokio::test]
async fn test_second_verify_is_refused_locally() {
    let backend = MockBackend::with_records(vec![production_record("rec-1", &["k-1", "k-2"])]);
    let session = session(&backend);

    session.verify(PRODUCTION, "rec-1", "k-1").await.unwrap();
    let err = session.verify(PRODUCTION, "rec-1", "k-1").await.unwrap_err();

    assert!(matches!(err, SdkError::Conflict(_)), "got {:?}", err);
    assert_eq!(backend.commands(), 1);

    let record = session.record(PRODUCTION, "rec-1").await.unwrap();
    assert_eq!(record.sub_unit("k-1").unwrap().status(), UnitStatus::Verified);
}

#[tokio::test]
async fn test_rejected_kontiki_can_be_verified() {
    let backend = MockBackend::with_records(vec![production_record("rec-1", &["k-1"])]);
    let session = session(&backend);

    session.reject(PRODUCTION, "rec-1", "k-1", "blurry").await.unwrap();
    session.verify(PRODUCTION, "rec-1", "k-1").await.unwrap();

    let record = session.record(PRODUCTION, "rec-1").await.unwrap();
    let unit = record.sub_unit("k-1").unwrap();
    assert_eq!(unit.status(), UnitStatus::Verified);
    assert!(unit.review.rejection_note.is_none());
    assert_eq!(record.status(), RecordStatus::Verified);
}

#[tokio::test]
async fn test_backend_conflict_marks_keys_stale_without_refetch() {
    let backend = MockBackend::with_records(vec![production_record("rec-1", &["k-1", "k-2"])]);
    let session = session(&backend);
    let page_key = session.collection_key(PRODUCTION, 1);

    session.collection(PRODUCTION, 1).await.unwrap();
    session.record(PRODUCTION, "rec-1").await.unwrap();

    // Another reviewer gets there first; the cached copy still says SUBMITTED
    backend.review_out_of_band(PRODUCTION, "rec-1", Some("k-1"), VerificationEvent::Verify);

    let err = session.verify(PRODUCTION, "rec-1", "k-1").await.unwrap_err();
    assert!(matches!(err, SdkError::Conflict(_)), "got {:?}", err);
    assert_eq!(backend.gets(), 1);
    assert_eq!(backend.lists(), 1);

    assert!(session.store().get(&page_key).unwrap().stale);
    assert!(session.store().get(&detail_key("rec-1")).unwrap().stale);

    let record = session.record(PRODUCTION, "rec-1").await.unwrap();
    let unit = record.sub_unit("k-1").unwrap();
    assert_eq!(unit.status(), UnitStatus::Verified);
    assert_eq!(unit.review.verified_by_id.as_deref(), Some("reviewer-2"));
}

#[tokio::test]
async fn test_failed_command_leaves_cache_untouched() {
    let backend = MockBackend::with_records(vec![production_record("rec-1", &["k-1"])]);
    let session = session(&backend);

    session.record(PRODUCTION, "rec-1").await.unwrap();
    let before = session.store().get(&detail_key("rec-1")).unwrap();

    backend.fail_next_command(SdkError::Server {
        status: 503,
        message: "maintenance".into(),
    });
    let err = session.verify(PRODUCTION, "rec-1", "k-1").await.unwrap_err();
    assert!(matches!(err, SdkError::Server { status: 503, .. }));

    let after = session.store().get(&detail_key("rec-1")).unwrap();
    assert!(!after.stale);
    assert_eq!(after.fetched_at, before.fetched_at);
    assert_eq!(after.value.as_record().unwrap().status(), RecordStatus::Submitted);
}

#[tokio::test]
async fn test_unknown_kontiki_is_not_found() {
    let backend = MockBackend::with_records(vec![production_record("rec-1", &["k-1"])]);
    let session = session(&backend);

    let err = session.verify(PRODUCTION, "rec-1", "k-9").await.unwrap_err();
    assert!(matches!(err, SdkError::NotFound(_)));

    let err = session.verify(PRODUCTION, "missing", "k-1").await.unwrap_err();
    assert!(matches!(err, SdkError::NotFound(_)));
    assert_eq!(backend.commands(), 0);
}

#[tokio::test]
async fn test_review_call_must_match_kind() {
    let backend = MockBackend::with_records(vec![
        production_record("rec-1", &["k-1"]),
        sourcing_record("src-1"),
    ]);
    let session = session(&backend);

    let err = session.verify(RecordKind::Sourcing, "src-1", "k-1").await.unwrap_err();
    assert!(matches!(err, SdkError::Validation(_)));

    let err = session.verify_record(PRODUCTION, "rec-1").await.unwrap_err();
    assert!(matches!(err, SdkError::Validation(_)));

    assert_eq!(backend.gets(), 0);
    assert_eq!(backend.commands(), 0);
}

// =============================================================================
// Whole-Record Verification
// =============================================================================

#[tokio::test]
async fn test_verify_and_reject_whole_records() {
    let backend =
        MockBackend::with_records(vec![sourcing_record("src-1"), sourcing_record("src-2")]);
    let session = session(&backend);
    let kind = RecordKind::Sourcing;

    session.verify_record(kind, "src-1").await.unwrap();
    let record = session.record(kind, "src-1").await.unwrap();
    assert_eq!(record.status(), RecordStatus::Verified);

    // Terminal
    let err = session.reject_record(kind, "src-1", "wrong site").await.unwrap_err();
    assert!(matches!(err, SdkError::Conflict(_)));

    session.reject_record(kind, "src-2", "  missing weighbridge slip ").await.unwrap();
    let record = session.record(kind, "src-2").await.unwrap();
    assert_eq!(record.status(), RecordStatus::Rejected);
    assert_eq!(
        record.review().unwrap().rejection_note.as_deref(),
        Some("missing weighbridge slip")
    );

    // Rejecting twice is refused
    let err = session.reject_record(kind, "src-2", "again").await.unwrap_err();
    assert!(matches!(err, SdkError::Conflict(_)));
    assert_eq!(backend.commands(), 2);
}

// =============================================================================
// Record Edits
// =============================================================================

#[tokio::test]
async fn test_create_refetches_cached_pages() {
    let backend = MockBackend::with_records(vec![production_record("rec-1", &["k-1"])]);
    let session = session(&backend);

    let page = session.collection(PRODUCTION, 1).await.unwrap();
    assert_eq!(page.data.len(), 1);

    let payload = serde_json::to_value(production_record("rec-2", &["k-1", "k-2"])).unwrap();
    let created = session.create(PRODUCTION, &payload).await.unwrap();
    assert_eq!(created.id, "rec-2");

    let cached = session.store().get(&session.collection_key(PRODUCTION, 1)).unwrap();
    assert!(!cached.stale);
    let page = cached.value.into_page().unwrap();
    assert_eq!(page.meta.total, 2);
    assert!(page.find("rec-2").is_some());
    assert_eq!(backend.lists(), 2);
}

#[tokio::test]
async fn test_update_returns_refetched_record() {
    let backend = MockBackend::with_records(vec![production_record("rec-1", &["k-1"])]);
    let session = session(&backend);

    session.collection(PRODUCTION, 1).await.unwrap();
    session.record(PRODUCTION, "rec-1").await.unwrap();

    let updated = session
        .update(PRODUCTION, "rec-1", &serde_json::json!({ "siteId": "site-9" }))
        .await
        .unwrap();
    assert_eq!(updated.site_id, "site-9");

    let detail = session.store().get(&detail_key("rec-1")).unwrap();
    assert!(!detail.stale);
    assert_eq!(detail.value.as_record().unwrap().site_id, "site-9");

    // Pages are stale until read again
    assert!(session.store().get(&session.collection_key(PRODUCTION, 1)).unwrap().stale);
}

#[tokio::test]
async fn test_delete_drops_record_from_pages() {
    let backend = MockBackend::with_records(vec![
        production_record("rec-1", &["k-1"]),
        production_record("rec-2", &["k-1"]),
    ]);
    let session = session(&backend);

    session.collection(PRODUCTION, 1).await.unwrap();
    session.record(PRODUCTION, "rec-2").await.unwrap();

    session.delete(PRODUCTION, "rec-2").await.unwrap();

    let page = session
        .store()
        .get(&session.collection_key(PRODUCTION, 1))
        .unwrap()
        .value
        .into_page()
        .unwrap();
    assert!(page.find("rec-2").is_none());
    assert_eq!(page.meta.total, 1);

    assert!(session.store().get(&detail_key("rec-2")).unwrap().stale);
    let err = session.record(PRODUCTION, "rec-2").await.unwrap_err();
    assert!(matches!(err, SdkError::NotFound(_)));
}
