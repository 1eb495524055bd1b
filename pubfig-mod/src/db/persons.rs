//! Person snapshot store
//!
//! The canonical state of each tracked figure. Snapshots change through two
//! paths only: application of an approved revision's proposal, or a direct
//! administrative override. Both go through the same partial merge.

use crate::db::audit;
use chrono::Utc;
use pubfig_common::db::models::{validate_proposal, NewPerson, Person, PersonStatus, ProposalMap};
use pubfig_common::{Error, Result};
use serde_json::{json, Value};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use uuid::Uuid;

/// Create a new person snapshot (admin action)
pub async fn create(pool: &SqlitePool, new: &NewPerson) -> Result<Person> {
    let guid = Uuid::new_v4();
    let now = Utc::now().timestamp();

    sqlx::query(
        "INSERT INTO persons (guid, full_name, role, biography, photo_ref, reputation, influence, status, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, 0, 0, ?, ?, ?)",
    )
    .bind(guid.to_string())
    .bind(&new.full_name)
    .bind(&new.role)
    .bind(&new.biography)
    .bind(&new.photo_ref)
    .bind(new.status.as_str())
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    get(pool, guid)
        .await?
        .ok_or_else(|| Error::Internal(format!("Person vanished after insert: {}", guid)))
}

/// Fetch a person by id
pub async fn get<'e, E>(executor: E, guid: Uuid) -> Result<Option<Person>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query(
        "SELECT guid, full_name, role, biography, photo_ref, reputation, influence, status, created_at, updated_at \
         FROM persons WHERE guid = ?",
    )
    .bind(guid.to_string())
    .fetch_optional(executor)
    .await?;

    row.map(|r| person_from_row(&r)).transpose()
}

/// Whether a person row exists
pub async fn exists<'e, E>(executor: E, guid: Uuid) -> Result<bool>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM persons WHERE guid = ?")
        .bind(guid.to_string())
        .fetch_one(executor)
        .await?;
    Ok(count > 0)
}

/// Merge a proposal onto a person snapshot inside the caller's transaction.
///
/// Only keys present in the map are written; absent fields stay untouched.
/// A JSON `null` clears the (nullable) field. The proposal must have been
/// validated before the transaction opened.
pub async fn apply_proposal_tx(
    tx: &mut Transaction<'_, Sqlite>,
    person_guid: Uuid,
    proposal: &ProposalMap,
) -> Result<()> {
    let now = Utc::now().timestamp();

    for (key, value) in proposal {
        // Keys come from the validated whitelist, so interpolating the
        // column name is safe here.
        let sql = format!("UPDATE persons SET {} = ?, updated_at = ? WHERE guid = ?", key);
        let query = sqlx::query(&sql);

        let query = match value {
            Value::Null => query.bind(None::<String>),
            Value::String(s) => query.bind(s.clone()),
            Value::Number(n) => query.bind(n.as_f64()),
            Value::Bool(b) => query.bind(*b),
            other => {
                return Err(Error::InvalidInput(format!(
                    "Non-primitive value for field {}: {}",
                    key, other
                )))
            }
        };

        query
            .bind(now)
            .bind(person_guid.to_string())
            .execute(&mut **tx)
            .await?;
    }

    Ok(())
}

/// Direct administrative override of a snapshot, audited
pub async fn admin_update(
    pool: &SqlitePool,
    guid: Uuid,
    proposal: &ProposalMap,
    actor: &str,
) -> Result<Person> {
    validate_proposal(proposal)?;

    let mut tx = pool.begin().await?;

    if !exists(&mut *tx, guid).await? {
        return Err(Error::NotFound(format!("Person {}", guid)));
    }

    apply_proposal_tx(&mut tx, guid, proposal).await?;

    audit::append(
        &mut *tx,
        "ADMIN_UPDATE_PERSON",
        actor,
        &json!({
            "person": guid.to_string(),
            "changes": Value::Object(audit::primitive_subset(proposal)),
        }),
    )
    .await?;

    let updated = get(&mut *tx, guid)
        .await?
        .ok_or_else(|| Error::Internal(format!("Person vanished mid-update: {}", guid)))?;
    tx.commit().await?;

    Ok(updated)
}

/// Explicit cascade delete: removes the person and all dependent revisions,
/// evidence and deep-check votes, with one audit entry.
pub async fn delete_cascade(pool: &SqlitePool, guid: Uuid, actor: &str) -> Result<()> {
    let mut tx = pool.begin().await?;

    if !exists(&mut *tx, guid).await? {
        return Err(Error::NotFound(format!("Person {}", guid)));
    }

    // Evidence and votes hang off revisions via ON DELETE CASCADE
    let revisions = sqlx::query("DELETE FROM revisions WHERE person_guid = ?")
        .bind(guid.to_string())
        .execute(&mut *tx)
        .await?
        .rows_affected();

    sqlx::query("DELETE FROM persons WHERE guid = ?")
        .bind(guid.to_string())
        .execute(&mut *tx)
        .await?;

    audit::append(
        &mut *tx,
        "DELETE_PERSON",
        actor,
        &json!({
            "person": guid.to_string(),
            "revisions_removed": revisions,
        }),
    )
    .await?;

    tx.commit().await?;

    Ok(())
}

fn person_from_row(row: &SqliteRow) -> Result<Person> {
    let guid_raw: String = row.try_get("guid")?;
    let status_raw: String = row.try_get("status")?;

    Ok(Person {
        guid: Uuid::parse_str(&guid_raw)
            .map_err(|e| Error::Internal(format!("Corrupt person guid: {}", e)))?,
        full_name: row.try_get("full_name")?,
        role: row.try_get("role")?,
        biography: row.try_get("biography")?,
        photo_ref: row.try_get("photo_ref")?,
        reputation: row.try_get("reputation")?,
        influence: row.try_get("influence")?,
        status: status_raw.parse::<PersonStatus>()?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
