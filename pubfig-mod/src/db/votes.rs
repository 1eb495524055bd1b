//! Deep-check priority votes
//!
//! Community members can push a revision up the batch-scoring queue. One
//! vote per (revision, voter) pair; the unique index makes repeat votes a
//! no-op so nobody can multiply their own influence.

use chrono::Utc;
use pubfig_common::{Error, Result};
use sqlx::SqlitePool;
use uuid::Uuid;

/// Record a deep-check vote. Returns true when the vote counted (first vote
/// by this voter on this revision), false when it was a repeat.
pub async fn vote_for_deep_check(
    pool: &SqlitePool,
    revision_guid: Uuid,
    voter_handle: &str,
) -> Result<bool> {
    let mut tx = pool.begin().await?;

    let known: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM revisions WHERE guid = ?")
        .bind(revision_guid.to_string())
        .fetch_one(&mut *tx)
        .await?;
    if known == 0 {
        return Err(Error::NotFound(format!("Revision {}", revision_guid)));
    }

    let inserted = sqlx::query(
        "INSERT OR IGNORE INTO revision_votes (revision_guid, voter_handle, created_at) \
         VALUES (?, ?, ?)",
    )
    .bind(revision_guid.to_string())
    .bind(voter_handle)
    .bind(Utc::now().timestamp())
    .execute(&mut *tx)
    .await?
    .rows_affected();

    let counted = inserted == 1;
    if counted {
        sqlx::query("UPDATE revisions SET priority = priority + 1 WHERE guid = ?")
            .bind(revision_guid.to_string())
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;

    Ok(counted)
}

/// Number of distinct deep-check voters for a revision
pub async fn count_for_revision(pool: &SqlitePool, revision_guid: Uuid) -> Result<i64> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM revision_votes WHERE revision_guid = ?")
            .bind(revision_guid.to_string())
            .fetch_one(pool)
            .await?;
    Ok(count)
}
