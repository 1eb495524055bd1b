//! Revision store
//!
//! Holds the proposed deltas and their lifecycle status. Creation writes the
//! revision and all of its evidence rows in one transaction; a revision
//! without its evidence (or the reverse) is never observable. The claim
//! machinery for batch scoring lives here too: `claim_for_processing` flips
//! candidates `pending -> processing` atomically so no two batch runs can
//! select the same revision.

use crate::db::evidence;
use chrono::Utc;
use pubfig_common::db::models::{NewRevision, ProposalMap, Revision, RevisionStatus};
use pubfig_common::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use tracing::debug;
use uuid::Uuid;

const REVISION_COLUMNS: &str = "guid, person_guid, author_handle, proposed, justification, \
     status, ai_score, reject_reason, priority, client_fingerprint, created_at, updated_at";

/// Insert a revision and its evidence rows inside the caller's transaction.
///
/// `status` is `Pending` for authors in good standing, or `Rejected` when
/// the caller already determined the author is shadow-banned (rejected on
/// arrival, no transition, no penalty increment).
pub async fn insert_tx(
    tx: &mut Transaction<'_, Sqlite>,
    new: &NewRevision,
    status: RevisionStatus,
) -> Result<Revision> {
    let guid = Uuid::new_v4();
    let now = Utc::now().timestamp();
    let proposed_json = serde_json::Value::Object(new.proposed.clone()).to_string();

    sqlx::query(
        "INSERT INTO revisions (guid, person_guid, author_handle, proposed, justification, \
             status, priority, client_fingerprint, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, 0, ?, ?, ?)",
    )
    .bind(guid.to_string())
    .bind(new.person_guid.to_string())
    .bind(&new.author_handle)
    .bind(&proposed_json)
    .bind(&new.justification)
    .bind(status.as_str())
    .bind(&new.client_fingerprint)
    .bind(now)
    .bind(now)
    .execute(&mut **tx)
    .await?;

    for item in &new.evidence {
        evidence::insert_tx(tx, guid, item).await?;
    }

    get(&mut **tx, guid)
        .await?
        .ok_or_else(|| Error::Internal(format!("Revision vanished after insert: {}", guid)))
}

/// Fetch a revision by id
pub async fn get<'e, E>(executor: E, guid: Uuid) -> Result<Option<Revision>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let sql = format!("SELECT {} FROM revisions WHERE guid = ?", REVISION_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(guid.to_string())
        .fetch_optional(executor)
        .await?;

    row.map(|r| revision_from_row(&r)).transpose()
}

/// Full revision history for a person, newest first.
///
/// Deliberately does not join on persons/authors: the history stays readable
/// even after the referenced rows are deleted by policy.
pub async fn history_for_person(pool: &SqlitePool, person_guid: Uuid) -> Result<Vec<Revision>> {
    let sql = format!(
        "SELECT {} FROM revisions WHERE person_guid = ? ORDER BY created_at DESC, guid DESC",
        REVISION_COLUMNS
    );
    let rows = sqlx::query(&sql)
        .bind(person_guid.to_string())
        .fetch_all(pool)
        .await?;

    rows.iter().map(revision_from_row).collect()
}

/// Pending revisions for the moderation queue, newest first
pub async fn pending(pool: &SqlitePool, limit: u32, offset: u32) -> Result<Vec<Revision>> {
    let sql = format!(
        "SELECT {} FROM revisions WHERE status = 'pending' \
         ORDER BY created_at DESC, guid DESC LIMIT ? OFFSET ?",
        REVISION_COLUMNS
    );
    let rows = sqlx::query(&sql)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;

    rows.iter().map(revision_from_row).collect()
}

/// Atomically claim up to `limit` pending revisions for scoring.
///
/// Selection order: highest deep-check priority first, oldest creation time
/// breaking ties. The conditional per-row update (`AND status = 'pending'`)
/// is the concurrency guard; a row claimed by a racing run is skipped.
pub async fn claim_for_processing(pool: &SqlitePool, limit: u32) -> Result<Vec<Revision>> {
    let mut tx = pool.begin().await?;
    let now = Utc::now().timestamp();

    let candidates: Vec<String> = sqlx::query_scalar(
        "SELECT guid FROM revisions WHERE status = 'pending' \
         ORDER BY priority DESC, created_at ASC LIMIT ?",
    )
    .bind(limit)
    .fetch_all(&mut *tx)
    .await?;

    let mut claimed = Vec::with_capacity(candidates.len());
    for guid in &candidates {
        let flipped = sqlx::query(
            "UPDATE revisions SET status = 'processing', updated_at = ? \
             WHERE guid = ? AND status = 'pending'",
        )
        .bind(now)
        .bind(guid)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if flipped == 1 {
            claimed.push(guid.clone());
        }
    }

    let mut revisions = Vec::with_capacity(claimed.len());
    for guid in &claimed {
        let parsed = Uuid::parse_str(guid)
            .map_err(|e| Error::Internal(format!("Corrupt revision guid: {}", e)))?;
        if let Some(revision) = get(&mut *tx, parsed).await? {
            revisions.push(revision);
        }
    }

    tx.commit().await?;

    debug!("Claimed {} revision(s) for processing", revisions.len());
    Ok(revisions)
}

/// Release a scoring claim: `processing -> pending`.
///
/// Conditional, so a revision resolved by a racing moderator is left alone.
pub async fn release_to_pending(pool: &SqlitePool, guid: Uuid) -> Result<()> {
    sqlx::query(
        "UPDATE revisions SET status = 'pending', updated_at = ? \
         WHERE guid = ? AND status = 'processing'",
    )
    .bind(Utc::now().timestamp())
    .bind(guid.to_string())
    .execute(pool)
    .await?;

    Ok(())
}

/// Return any claim stuck in `processing` past the lease to `pending`.
///
/// Covers workers that crashed between claim and resolution. Returns the
/// number of reclaimed revisions.
pub async fn reap_stale_processing(pool: &SqlitePool, lease_seconds: i64) -> Result<u64> {
    let cutoff = Utc::now().timestamp() - lease_seconds;

    let reaped = sqlx::query(
        "UPDATE revisions SET status = 'pending', updated_at = ? \
         WHERE status = 'processing' AND updated_at < ?",
    )
    .bind(Utc::now().timestamp())
    .bind(cutoff)
    .execute(pool)
    .await?
    .rows_affected();

    Ok(reaped)
}

fn revision_from_row(row: &SqliteRow) -> Result<Revision> {
    let guid_raw: String = row.try_get("guid")?;
    let person_raw: String = row.try_get("person_guid")?;
    let status_raw: String = row.try_get("status")?;
    let proposed_raw: String = row.try_get("proposed")?;

    let proposed: ProposalMap = match serde_json::from_str(&proposed_raw) {
        Ok(serde_json::Value::Object(map)) => map,
        Ok(_) => {
            return Err(Error::Internal(format!(
                "Proposal for revision {} is not a JSON object",
                guid_raw
            )))
        }
        Err(e) => return Err(Error::Internal(format!("Corrupt proposal JSON: {}", e))),
    };

    Ok(Revision {
        guid: Uuid::parse_str(&guid_raw)
            .map_err(|e| Error::Internal(format!("Corrupt revision guid: {}", e)))?,
        person_guid: Uuid::parse_str(&person_raw)
            .map_err(|e| Error::Internal(format!("Corrupt person guid: {}", e)))?,
        author_handle: row.try_get("author_handle")?,
        proposed,
        justification: row.try_get("justification")?,
        status: status_raw.parse::<RevisionStatus>()?,
        ai_score: row.try_get("ai_score")?,
        reject_reason: row.try_get("reject_reason")?,
        priority: row.try_get("priority")?,
        client_fingerprint: row.try_get("client_fingerprint")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
