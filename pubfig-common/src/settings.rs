//! Policy settings stored in the database (key-value store)
//!
//! Moderation policy is database-first: the thresholds live in the settings
//! table so operators can adjust them without a redeploy. Defaults are
//! written on first run and read back through the typed getters below.

use crate::error::{Error, Result};
use sqlx::{Pool, Sqlite};
use std::str::FromStr;

/// Auto-approval threshold on the 0-100 AI score scale
pub const DEFAULT_AUTO_APPROVE_THRESHOLD: f64 = 85.0;

/// Rejections before an author is shadow-banned
pub const DEFAULT_VIOLATION_BAN_THRESHOLD: i64 = 3;

/// Seconds a revision may sit in `processing` before its claim is
/// considered stale and eligible for re-claim
pub const DEFAULT_PROCESSING_LEASE_SECONDS: i64 = 300;

/// Write policy defaults for any key not already present
pub async fn init_default_settings(db: &Pool<Sqlite>) -> Result<()> {
    let defaults: &[(&str, String)] = &[
        (
            "auto_approve_threshold",
            DEFAULT_AUTO_APPROVE_THRESHOLD.to_string(),
        ),
        (
            "violation_ban_threshold",
            DEFAULT_VIOLATION_BAN_THRESHOLD.to_string(),
        ),
        (
            "processing_lease_seconds",
            DEFAULT_PROCESSING_LEASE_SECONDS.to_string(),
        ),
    ];

    for (key, value) in defaults {
        sqlx::query("INSERT OR IGNORE INTO settings (key, value) VALUES (?, ?)")
            .bind(key)
            .bind(value)
            .execute(db)
            .await?;
    }

    Ok(())
}

/// Score at or above which a revision is auto-approved
pub async fn auto_approve_threshold(db: &Pool<Sqlite>) -> Result<f64> {
    match get_setting::<f64>(db, "auto_approve_threshold").await? {
        Some(threshold) => Ok(threshold.clamp(0.0, 100.0)),
        None => Ok(DEFAULT_AUTO_APPROVE_THRESHOLD),
    }
}

/// Violation count at which the shadow-ban ratchet engages
pub async fn violation_ban_threshold(db: &Pool<Sqlite>) -> Result<i64> {
    match get_setting::<i64>(db, "violation_ban_threshold").await? {
        Some(threshold) => Ok(threshold.max(1)),
        None => Ok(DEFAULT_VIOLATION_BAN_THRESHOLD),
    }
}

/// Stale-claim lease in seconds
pub async fn processing_lease_seconds(db: &Pool<Sqlite>) -> Result<i64> {
    match get_setting::<i64>(db, "processing_lease_seconds").await? {
        Some(lease) => Ok(lease.max(1)),
        None => Ok(DEFAULT_PROCESSING_LEASE_SECONDS),
    }
}

/// Generic setting getter
///
/// Returns None if key doesn't exist in database.
/// Parses value from string using FromStr trait.
pub async fn get_setting<T: FromStr>(db: &Pool<Sqlite>, key: &str) -> Result<Option<T>> {
    let value: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(db)
        .await?;

    match value {
        Some(s) => match s.parse::<T>() {
            Ok(parsed) => Ok(Some(parsed)),
            Err(_) => Err(Error::Config(format!(
                "Failed to parse setting '{}' value: {}",
                key, s
            ))),
        },
        None => Ok(None),
    }
}

/// Generic setting setter
///
/// Inserts or updates setting in database.
pub async fn set_setting<T: ToString>(db: &Pool<Sqlite>, key: &str, value: T) -> Result<()> {
    let value_str = value.to_string();

    sqlx::query(
        r#"
        INSERT INTO settings (key, value)
        VALUES (?, ?)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value
        "#,
    )
    .bind(key)
    .bind(value_str)
    .execute(db)
    .await?;

    Ok(())
}
