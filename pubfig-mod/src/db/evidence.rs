//! Evidence store
//!
//! Evidence items belong to exactly one revision and are written in the same
//! transaction as it. Community vote tallies are display-only counters; they
//! never feed the AI score or the approval threshold.

use crate::db::audit;
use chrono::Utc;
use pubfig_common::db::models::{Evidence, EvidenceKind, EvidencePolarity, NewEvidence};
use pubfig_common::{Error, Result};
use serde_json::json;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use uuid::Uuid;

/// Insert one evidence row for a revision, inside the caller's transaction
pub async fn insert_tx(
    tx: &mut Transaction<'_, Sqlite>,
    revision_guid: Uuid,
    new: &NewEvidence,
) -> Result<Evidence> {
    if new.url.trim().is_empty() {
        return Err(Error::InvalidInput("Evidence URL must not be empty".to_string()));
    }

    let guid = Uuid::new_v4();
    let now = Utc::now().timestamp();

    sqlx::query(
        "INSERT INTO evidence (guid, revision_guid, url, title, kind, polarity, likes, dislikes, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, 0, 0, ?)",
    )
    .bind(guid.to_string())
    .bind(revision_guid.to_string())
    .bind(&new.url)
    .bind(&new.title)
    .bind(new.kind.as_str())
    .bind(new.polarity.as_str())
    .bind(now)
    .execute(&mut **tx)
    .await?;

    get(&mut **tx, guid)
        .await?
        .ok_or_else(|| Error::Internal(format!("Evidence vanished after insert: {}", guid)))
}

/// Fetch one evidence item
pub async fn get<'e, E>(executor: E, guid: Uuid) -> Result<Option<Evidence>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query(
        "SELECT guid, revision_guid, url, title, kind, polarity, likes, dislikes, created_at \
         FROM evidence WHERE guid = ?",
    )
    .bind(guid.to_string())
    .fetch_optional(executor)
    .await?;

    row.map(|r| evidence_from_row(&r)).transpose()
}

/// All evidence attached to a revision, oldest first
pub async fn for_revision(pool: &SqlitePool, revision_guid: Uuid) -> Result<Vec<Evidence>> {
    let rows = sqlx::query(
        "SELECT guid, revision_guid, url, title, kind, polarity, likes, dislikes, created_at \
         FROM evidence WHERE revision_guid = ? ORDER BY created_at ASC, guid ASC",
    )
    .bind(revision_guid.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter().map(evidence_from_row).collect()
}

/// Record a community like/dislike on an evidence item
pub async fn vote(pool: &SqlitePool, guid: Uuid, like: bool) -> Result<Evidence> {
    let column = if like { "likes" } else { "dislikes" };
    let sql = format!("UPDATE evidence SET {} = {} + 1 WHERE guid = ?", column, column);

    let updated = sqlx::query(&sql)
        .bind(guid.to_string())
        .execute(pool)
        .await?
        .rows_affected();

    if updated == 0 {
        return Err(Error::NotFound(format!("Evidence {}", guid)));
    }

    get(pool, guid)
        .await?
        .ok_or_else(|| Error::Internal(format!("Evidence vanished mid-vote: {}", guid)))
}

/// Administrative deletion of a single evidence item, with audit entry
pub async fn delete(pool: &SqlitePool, guid: Uuid, actor: &str) -> Result<()> {
    let mut tx = pool.begin().await?;

    let item = get(&mut *tx, guid)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Evidence {}", guid)))?;

    sqlx::query("DELETE FROM evidence WHERE guid = ?")
        .bind(guid.to_string())
        .execute(&mut *tx)
        .await?;

    audit::append(
        &mut *tx,
        "DELETE_EVIDENCE",
        actor,
        &json!({
            "evidence": guid.to_string(),
            "revision": item.revision_guid.to_string(),
            "url": item.url,
        }),
    )
    .await?;

    tx.commit().await?;

    Ok(())
}

fn evidence_from_row(row: &SqliteRow) -> Result<Evidence> {
    let guid_raw: String = row.try_get("guid")?;
    let revision_raw: String = row.try_get("revision_guid")?;
    let kind_raw: String = row.try_get("kind")?;
    let polarity_raw: String = row.try_get("polarity")?;

    Ok(Evidence {
        guid: Uuid::parse_str(&guid_raw)
            .map_err(|e| Error::Internal(format!("Corrupt evidence guid: {}", e)))?,
        revision_guid: Uuid::parse_str(&revision_raw)
            .map_err(|e| Error::Internal(format!("Corrupt revision guid: {}", e)))?,
        url: row.try_get("url")?,
        title: row.try_get("title")?,
        kind: kind_raw.parse::<EvidenceKind>()?,
        polarity: polarity_raw.parse::<EvidencePolarity>()?,
        likes: row.try_get("likes")?,
        dislikes: row.try_get("dislikes")?,
        created_at: row.try_get("created_at")?,
    })
}
