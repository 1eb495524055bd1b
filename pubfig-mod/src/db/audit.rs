//! Append-only audit log writer
//!
//! Every state-changing moderation action writes exactly one entry, inside
//! the same transaction as the state transition. No update or delete API
//! exists here; the log is a faithful, replayable record independent of
//! later schema changes to Person/Revision.

use chrono::Utc;
use pubfig_common::db::models::{AuditEntry, ProposalMap};
use pubfig_common::{Error, Result};
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool};

/// Append one audit entry.
///
/// `details` is sanitized at this boundary: only JSON primitives and nested
/// structures of primitives survive. Live entity references never reach the
/// log because the payload is already a detached `serde_json::Value`.
pub async fn append<'e, E>(executor: E, action: &str, actor: &str, details: &Value) -> Result<()>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let sanitized = sanitize(details);

    sqlx::query("INSERT INTO audit_log (action, actor, details, created_at) VALUES (?, ?, ?, ?)")
        .bind(action)
        .bind(actor)
        .bind(sanitized.to_string())
        .bind(Utc::now().timestamp())
        .execute(executor)
        .await?;

    Ok(())
}

/// Most recent entries, newest first
pub async fn recent(pool: &SqlitePool, limit: u32) -> Result<Vec<AuditEntry>> {
    let rows = sqlx::query(
        "SELECT id, action, actor, details, created_at FROM audit_log ORDER BY id DESC LIMIT ?",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.iter().map(entry_from_row).collect()
}

/// Entries for one action name, newest first
pub async fn for_action(pool: &SqlitePool, action: &str, limit: u32) -> Result<Vec<AuditEntry>> {
    let rows = sqlx::query(
        "SELECT id, action, actor, details, created_at FROM audit_log \
         WHERE action = ? ORDER BY id DESC LIMIT ?",
    )
    .bind(action)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.iter().map(entry_from_row).collect()
}

/// Keep only the primitive-valued entries of a proposal map.
///
/// Used for the APPROVE_REVISION payload: nested objects and arrays are
/// dropped outright rather than serialized.
pub fn primitive_subset(proposal: &ProposalMap) -> ProposalMap {
    proposal
        .iter()
        .filter(|(_, value)| is_primitive(value))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

fn is_primitive(value: &Value) -> bool {
    matches!(
        value,
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_)
    )
}

/// Restrict a details payload to JSON-safe primitives and nested structures
/// of primitives. Anything else has no representation here and is removed.
fn sanitize(value: &Value) -> Value {
    match value {
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => value.clone(),
        Value::Array(items) => Value::Array(items.iter().map(sanitize).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), sanitize(v)))
                .collect(),
        ),
    }
}

fn entry_from_row(row: &SqliteRow) -> Result<AuditEntry> {
    let details_raw: String = row.try_get("details")?;
    let details: Value = serde_json::from_str(&details_raw)
        .map_err(|e| Error::Internal(format!("Corrupt audit details: {}", e)))?;

    Ok(AuditEntry {
        id: row.try_get("id")?,
        action: row.try_get("action")?,
        actor: row.try_get("actor")?,
        details,
        created_at: row.try_get("created_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn primitive_subset_drops_structures() {
        let proposal = json!({
            "full_name": "Grace Hopper",
            "reputation": 50,
            "flag": true,
            "cleared": null,
            "nested": { "a": 1 },
            "list": [1, 2, 3]
        });
        let subset = primitive_subset(proposal.as_object().unwrap());

        assert_eq!(subset.len(), 4);
        assert!(subset.contains_key("full_name"));
        assert!(subset.contains_key("reputation"));
        assert!(subset.contains_key("flag"));
        assert!(subset.contains_key("cleared"));
        assert!(!subset.contains_key("nested"));
        assert!(!subset.contains_key("list"));
    }

    #[test]
    fn sanitize_preserves_nested_primitives() {
        let details = json!({
            "revision": "r-1",
            "changes": { "reputation": 50 },
            "tags": ["a", "b"]
        });
        assert_eq!(sanitize(&details), details);
    }
}
