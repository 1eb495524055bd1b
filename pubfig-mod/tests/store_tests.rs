//! Store-level tests: claim atomicity, the reaper, vote idempotence,
//! cascade deletion and the administrative paths.

use pubfig_common::db::init_database;
use pubfig_common::db::models::{
    EvidenceKind, EvidencePolarity, NewEvidence, NewPerson, NewRevision, PersonStatus,
    ProposalMap, RevisionStatus,
};
use pubfig_common::Error;
use pubfig_mod::db::{audit, authors, evidence, persons, revisions, votes};
use pubfig_mod::ModerationEngine;
use serde_json::json;
use sqlx::SqlitePool;
use tempfile::TempDir;
use uuid::Uuid;

async fn setup() -> (TempDir, ModerationEngine) {
    let dir = TempDir::new().unwrap();
    let pool = init_database(&dir.path().join("pubfig.db")).await.unwrap();
    (dir, ModerationEngine::new(pool))
}

fn proposal(value: serde_json::Value) -> ProposalMap {
    value.as_object().unwrap().clone()
}

async fn seed_person(engine: &ModerationEngine) -> pubfig_common::db::models::Person {
    persons::create(
        engine.pool(),
        &NewPerson {
            full_name: "Jane Quill".to_string(),
            role: None,
            biography: None,
            photo_ref: None,
            status: PersonStatus::Approved,
        },
    )
    .await
    .unwrap()
}

async fn submit(
    engine: &ModerationEngine,
    person_guid: Uuid,
    author: &str,
    evidence_items: Vec<NewEvidence>,
) -> pubfig_common::db::models::Revision {
    engine
        .create_revision(&NewRevision {
            person_guid,
            author_handle: author.to_string(),
            proposed: proposal(json!({ "reputation": 1 })),
            justification: None,
            client_fingerprint: None,
            evidence: evidence_items,
        })
        .await
        .unwrap()
}

fn link(url: &str, polarity: EvidencePolarity) -> NewEvidence {
    NewEvidence {
        url: url.to_string(),
        title: Some("source".to_string()),
        kind: EvidenceKind::Link,
        polarity,
    }
}

async fn backdate_revision(pool: &SqlitePool, guid: Uuid, seconds: i64) {
    sqlx::query("UPDATE revisions SET created_at = created_at - ?, updated_at = updated_at - ? WHERE guid = ?")
        .bind(seconds)
        .bind(seconds)
        .bind(guid.to_string())
        .execute(pool)
        .await
        .unwrap();
}

// ---------------------------------------------------------------------------
// Claiming and the reaper
// ---------------------------------------------------------------------------

#[tokio::test]
async fn claimed_revisions_are_invisible_to_a_second_claim() {
    let (_dir, engine) = setup().await;
    let person = seed_person(&engine).await;
    for i in 0..3 {
        submit(&engine, person.guid, &format!("author-{}", i), vec![]).await;
    }

    let first = revisions::claim_for_processing(engine.pool(), 10).await.unwrap();
    assert_eq!(first.len(), 3);
    assert!(first.iter().all(|r| r.status == RevisionStatus::Processing));

    let second = revisions::claim_for_processing(engine.pool(), 10).await.unwrap();
    assert!(second.is_empty(), "no revision may be claimed twice");
}

#[tokio::test]
async fn claim_order_is_priority_then_oldest() {
    let (_dir, engine) = setup().await;
    let person = seed_person(&engine).await;

    let oldest = submit(&engine, person.guid, "author-1", vec![]).await;
    let middle = submit(&engine, person.guid, "author-2", vec![]).await;
    let voted = submit(&engine, person.guid, "author-3", vec![]).await;

    // Give the rows distinct ages, oldest first
    backdate_revision(engine.pool(), oldest.guid, 30).await;
    backdate_revision(engine.pool(), middle.guid, 20).await;
    backdate_revision(engine.pool(), voted.guid, 10).await;

    votes::vote_for_deep_check(engine.pool(), voted.guid, "voter-1").await.unwrap();

    let claimed = revisions::claim_for_processing(engine.pool(), 2).await.unwrap();
    assert_eq!(claimed.len(), 2);
    assert_eq!(claimed[0].guid, voted.guid, "deep-check priority wins");
    assert_eq!(claimed[1].guid, oldest.guid, "ties broken by oldest creation time");
}

#[tokio::test]
async fn release_returns_claim_to_pending() {
    let (_dir, engine) = setup().await;
    let person = seed_person(&engine).await;
    let revision = submit(&engine, person.guid, "author-1", vec![]).await;

    let claimed = revisions::claim_for_processing(engine.pool(), 1).await.unwrap();
    assert_eq!(claimed.len(), 1);

    revisions::release_to_pending(engine.pool(), revision.guid).await.unwrap();
    let released = revisions::get(engine.pool(), revision.guid).await.unwrap().unwrap();
    assert_eq!(released.status, RevisionStatus::Pending);
}

#[tokio::test]
async fn reaper_frees_stale_claims_only() {
    let (_dir, engine) = setup().await;
    let person = seed_person(&engine).await;
    let stale = submit(&engine, person.guid, "author-1", vec![]).await;
    let fresh = submit(&engine, person.guid, "author-2", vec![]).await;

    let claimed = revisions::claim_for_processing(engine.pool(), 10).await.unwrap();
    assert_eq!(claimed.len(), 2);

    // Age one claim past the lease
    backdate_revision(engine.pool(), stale.guid, 600).await;

    let reaped = revisions::reap_stale_processing(engine.pool(), 300).await.unwrap();
    assert_eq!(reaped, 1);

    let stale = revisions::get(engine.pool(), stale.guid).await.unwrap().unwrap();
    assert_eq!(stale.status, RevisionStatus::Pending);
    let fresh = revisions::get(engine.pool(), fresh.guid).await.unwrap().unwrap();
    assert_eq!(fresh.status, RevisionStatus::Processing);
}

// ---------------------------------------------------------------------------
// Deep-check voting
// ---------------------------------------------------------------------------

#[tokio::test]
async fn deep_check_votes_are_idempotent_per_voter() {
    let (_dir, engine) = setup().await;
    let person = seed_person(&engine).await;
    let revision = submit(&engine, person.guid, "author-1", vec![]).await;

    assert!(engine.vote_for_deep_check(revision.guid, "voter-1").await.unwrap());
    assert!(!engine.vote_for_deep_check(revision.guid, "voter-1").await.unwrap());
    assert!(engine.vote_for_deep_check(revision.guid, "voter-2").await.unwrap());

    let updated = revisions::get(engine.pool(), revision.guid).await.unwrap().unwrap();
    assert_eq!(updated.priority, 2);
    assert_eq!(votes::count_for_revision(engine.pool(), revision.guid).await.unwrap(), 2);
}

#[tokio::test]
async fn voting_on_missing_revision_is_not_found() {
    let (_dir, engine) = setup().await;
    let result = engine.vote_for_deep_check(Uuid::new_v4(), "voter-1").await;
    assert!(matches!(result, Err(Error::NotFound(_))));
}

// ---------------------------------------------------------------------------
// Reads: history and the moderation queue
// ---------------------------------------------------------------------------

#[tokio::test]
async fn history_is_newest_first_and_survives_person_deletion() {
    let (_dir, engine) = setup().await;
    let person = seed_person(&engine).await;

    let older = submit(&engine, person.guid, "author-1", vec![]).await;
    let newer = submit(&engine, person.guid, "author-2", vec![]).await;
    backdate_revision(engine.pool(), older.guid, 60).await;

    let history = revisions::history_for_person(engine.pool(), person.guid).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].guid, newer.guid);
    assert_eq!(history[1].guid, older.guid);

    // Remove the person row out from under the revisions; the history must
    // stay readable rather than fail on the dangling reference.
    sqlx::query("DELETE FROM persons WHERE guid = ?")
        .bind(person.guid.to_string())
        .execute(engine.pool())
        .await
        .unwrap();

    let history = revisions::history_for_person(engine.pool(), person.guid).await.unwrap();
    assert_eq!(history.len(), 2);
}

#[tokio::test]
async fn pending_queue_paginates_newest_first() {
    let (_dir, engine) = setup().await;
    let person = seed_person(&engine).await;

    let r1 = submit(&engine, person.guid, "author-1", vec![]).await;
    let r2 = submit(&engine, person.guid, "author-2", vec![]).await;
    let r3 = submit(&engine, person.guid, "author-3", vec![]).await;
    backdate_revision(engine.pool(), r1.guid, 30).await;
    backdate_revision(engine.pool(), r2.guid, 20).await;
    backdate_revision(engine.pool(), r3.guid, 10).await;

    let page1 = revisions::pending(engine.pool(), 2, 0).await.unwrap();
    assert_eq!(page1.len(), 2);
    assert_eq!(page1[0].guid, r3.guid);
    assert_eq!(page1[1].guid, r2.guid);

    let page2 = revisions::pending(engine.pool(), 2, 2).await.unwrap();
    assert_eq!(page2.len(), 1);
    assert_eq!(page2[0].guid, r1.guid);

    // Terminal revisions drop out of the queue
    engine.reject(r3.guid, "moderator-1", None).await.unwrap();
    let remaining = revisions::pending(engine.pool(), 10, 0).await.unwrap();
    assert_eq!(remaining.len(), 2);
}

// ---------------------------------------------------------------------------
// Evidence
// ---------------------------------------------------------------------------

#[tokio::test]
async fn revision_creation_writes_all_evidence_rows() {
    let (_dir, engine) = setup().await;
    let person = seed_person(&engine).await;
    let revision = submit(
        &engine,
        person.guid,
        "author-1",
        vec![
            link("https://example.org/a", EvidencePolarity::Supports),
            link("https://example.org/b", EvidencePolarity::Refutes),
        ],
    )
    .await;

    let items = evidence::for_revision(engine.pool(), revision.guid).await.unwrap();
    assert_eq!(items.len(), 2);
    assert!(items.iter().all(|e| e.revision_guid == revision.guid));
}

#[tokio::test]
async fn evidence_tallies_are_independent_counters() {
    let (_dir, engine) = setup().await;
    let person = seed_person(&engine).await;
    let revision = submit(
        &engine,
        person.guid,
        "author-1",
        vec![link("https://example.org/a", EvidencePolarity::Supports)],
    )
    .await;
    let item = &evidence::for_revision(engine.pool(), revision.guid).await.unwrap()[0];

    evidence::vote(engine.pool(), item.guid, true).await.unwrap();
    evidence::vote(engine.pool(), item.guid, true).await.unwrap();
    let voted = evidence::vote(engine.pool(), item.guid, false).await.unwrap();

    assert_eq!(voted.likes, 2);
    assert_eq!(voted.dislikes, 1);
}

#[tokio::test]
async fn admin_evidence_delete_is_audited() {
    let (_dir, engine) = setup().await;
    let person = seed_person(&engine).await;
    let revision = submit(
        &engine,
        person.guid,
        "author-1",
        vec![link("https://example.org/a", EvidencePolarity::Supports)],
    )
    .await;
    let item = evidence::for_revision(engine.pool(), revision.guid).await.unwrap().remove(0);

    evidence::delete(engine.pool(), item.guid, "admin-1").await.unwrap();

    assert!(evidence::get(engine.pool(), item.guid).await.unwrap().is_none());
    let entries = audit::for_action(engine.pool(), "DELETE_EVIDENCE", 10).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].details["evidence"], item.guid.to_string());
}

// ---------------------------------------------------------------------------
// Administrative paths
// ---------------------------------------------------------------------------

#[tokio::test]
async fn person_cascade_delete_removes_dependents() {
    let (_dir, engine) = setup().await;
    let person = seed_person(&engine).await;
    let revision = submit(
        &engine,
        person.guid,
        "author-1",
        vec![link("https://example.org/a", EvidencePolarity::Supports)],
    )
    .await;
    engine.vote_for_deep_check(revision.guid, "voter-1").await.unwrap();

    persons::delete_cascade(engine.pool(), person.guid, "admin-1").await.unwrap();

    assert!(persons::get(engine.pool(), person.guid).await.unwrap().is_none());
    assert!(revisions::get(engine.pool(), revision.guid).await.unwrap().is_none());
    assert!(evidence::for_revision(engine.pool(), revision.guid).await.unwrap().is_empty());
    assert_eq!(votes::count_for_revision(engine.pool(), revision.guid).await.unwrap(), 0);

    let entries = audit::for_action(engine.pool(), "DELETE_PERSON", 10).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].details["revisions_removed"], 1);
}

#[tokio::test]
async fn admin_person_update_is_merged_and_audited() {
    let (_dir, engine) = setup().await;
    let person = seed_person(&engine).await;

    let updated = persons::admin_update(
        engine.pool(),
        person.guid,
        &proposal(json!({ "role": "Governor", "influence": 7.5 })),
        "admin-1",
    )
    .await
    .unwrap();
    assert_eq!(updated.role.as_deref(), Some("Governor"));
    assert_eq!(updated.influence, 7.5);
    assert_eq!(updated.full_name, person.full_name);

    let entries = audit::for_action(engine.pool(), "ADMIN_UPDATE_PERSON", 10).await.unwrap();
    assert_eq!(entries.len(), 1);

    let bad = persons::admin_update(
        engine.pool(),
        person.guid,
        &proposal(json!({ "shoe_size": 44 })),
        "admin-1",
    )
    .await;
    assert!(matches!(bad, Err(Error::InvalidInput(_))));
}

#[tokio::test]
async fn admin_ban_and_unban_are_audited() {
    let (_dir, engine) = setup().await;

    let banned = authors::set_ban(engine.pool(), "author-1", true, "admin-1").await.unwrap();
    assert!(banned.is_shadow_banned);

    let unbanned = authors::set_ban(engine.pool(), "author-1", false, "admin-1").await.unwrap();
    assert!(!unbanned.is_shadow_banned);

    assert_eq!(audit::for_action(engine.pool(), "BAN_AUTHOR", 10).await.unwrap().len(), 1);
    assert_eq!(audit::for_action(engine.pool(), "UNBAN_AUTHOR", 10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn admin_reputation_adjustment_accumulates() {
    let (_dir, engine) = setup().await;

    authors::adjust_reputation(engine.pool(), "author-1", 2.5, "admin-1").await.unwrap();
    let author = authors::adjust_reputation(engine.pool(), "author-1", -1.0, "admin-1").await.unwrap();
    assert_eq!(author.reputation, 1.5);

    let entries = audit::for_action(engine.pool(), "ADJUST_AUTHOR_REPUTATION", 10).await.unwrap();
    assert_eq!(entries.len(), 2);
}

// ---------------------------------------------------------------------------
// Audit log shape
// ---------------------------------------------------------------------------

#[tokio::test]
async fn audit_log_is_ordered_and_readable() {
    let (_dir, engine) = setup().await;
    let person = seed_person(&engine).await;
    let revision = submit(&engine, person.guid, "author-1", vec![]).await;
    engine.approve(revision.guid, "moderator-1", Some(88.0)).await.unwrap();

    let entries = audit::recent(engine.pool(), 10).await.unwrap();
    // Newest first: approval, then creation
    assert_eq!(entries[0].action, "APPROVE_REVISION");
    assert_eq!(entries[1].action, "CREATE_REVISION");
    assert!(entries[0].created_at >= entries[1].created_at);
}
