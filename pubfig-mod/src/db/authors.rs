//! Author reputation records
//!
//! Consulted at revision-creation time (shadow-ban check) and mutated by the
//! rejection path. The violation counter update always happens inside the
//! rejection transaction so concurrent rejections of the same author's
//! revisions cannot lose updates.

use crate::db::audit;
use chrono::Utc;
use pubfig_common::db::models::AuthorRecord;
use pubfig_common::{Error, Result};
use serde_json::json;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};

/// Fetch an author record by opaque handle
pub async fn get<'e, E>(executor: E, handle: &str) -> Result<Option<AuthorRecord>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query(
        "SELECT handle, violation_count, is_shadow_banned, reputation, created_at, updated_at \
         FROM authors WHERE handle = ?",
    )
    .bind(handle)
    .fetch_optional(executor)
    .await?;

    row.map(|r| author_from_row(&r)).transpose()
}

/// Fetch or create the record for a handle, inside the caller's transaction
pub async fn get_or_create_tx(
    tx: &mut Transaction<'_, Sqlite>,
    handle: &str,
) -> Result<AuthorRecord> {
    let now = Utc::now().timestamp();

    sqlx::query(
        "INSERT OR IGNORE INTO authors (handle, violation_count, is_shadow_banned, reputation, created_at, updated_at) \
         VALUES (?, 0, 0, 0, ?, ?)",
    )
    .bind(handle)
    .bind(now)
    .bind(now)
    .execute(&mut **tx)
    .await?;

    get(&mut **tx, handle)
        .await?
        .ok_or_else(|| Error::Internal(format!("Author record vanished: {}", handle)))
}

/// Increment the violation counter and apply the shadow-ban ratchet.
///
/// The ratchet is one-way: `is_shadow_banned` never flips back to false
/// here, regardless of how the threshold compares afterwards. Returns the
/// updated record.
pub async fn record_violation_tx(
    tx: &mut Transaction<'_, Sqlite>,
    handle: &str,
    ban_threshold: i64,
) -> Result<AuthorRecord> {
    get_or_create_tx(tx, handle).await?;

    sqlx::query(
        "UPDATE authors SET \
             violation_count = violation_count + 1, \
             is_shadow_banned = CASE WHEN violation_count + 1 >= ? THEN 1 ELSE is_shadow_banned END, \
             updated_at = ? \
         WHERE handle = ?",
    )
    .bind(ban_threshold)
    .bind(Utc::now().timestamp())
    .bind(handle)
    .execute(&mut **tx)
    .await?;

    get(&mut **tx, handle)
        .await?
        .ok_or_else(|| Error::Internal(format!("Author record vanished: {}", handle)))
}

/// Administrative ban or unban, with audit entry
pub async fn set_ban(
    pool: &SqlitePool,
    handle: &str,
    banned: bool,
    actor: &str,
) -> Result<AuthorRecord> {
    let mut tx = pool.begin().await?;

    let author = get_or_create_tx(&mut tx, handle).await?;

    sqlx::query("UPDATE authors SET is_shadow_banned = ?, updated_at = ? WHERE handle = ?")
        .bind(banned)
        .bind(Utc::now().timestamp())
        .bind(handle)
        .execute(&mut *tx)
        .await?;

    let action = if banned { "BAN_AUTHOR" } else { "UNBAN_AUTHOR" };
    audit::append(
        &mut *tx,
        action,
        actor,
        &json!({
            "author": handle,
            "was_banned": author.is_shadow_banned,
        }),
    )
    .await?;

    let updated = get(&mut *tx, handle)
        .await?
        .ok_or_else(|| Error::Internal(format!("Author record vanished: {}", handle)))?;
    tx.commit().await?;

    Ok(updated)
}

/// Administrative reputation adjustment, with audit entry
pub async fn adjust_reputation(
    pool: &SqlitePool,
    handle: &str,
    delta: f64,
    actor: &str,
) -> Result<AuthorRecord> {
    let mut tx = pool.begin().await?;

    get_or_create_tx(&mut tx, handle).await?;

    sqlx::query("UPDATE authors SET reputation = reputation + ?, updated_at = ? WHERE handle = ?")
        .bind(delta)
        .bind(Utc::now().timestamp())
        .bind(handle)
        .execute(&mut *tx)
        .await?;

    audit::append(
        &mut *tx,
        "ADJUST_AUTHOR_REPUTATION",
        actor,
        &json!({ "author": handle, "delta": delta }),
    )
    .await?;

    let updated = get(&mut *tx, handle)
        .await?
        .ok_or_else(|| Error::Internal(format!("Author record vanished: {}", handle)))?;
    tx.commit().await?;

    Ok(updated)
}

fn author_from_row(row: &SqliteRow) -> Result<AuthorRecord> {
    Ok(AuthorRecord {
        handle: row.try_get("handle")?,
        violation_count: row.try_get("violation_count")?,
        is_shadow_banned: row.try_get("is_shadow_banned")?,
        reputation: row.try_get("reputation")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
