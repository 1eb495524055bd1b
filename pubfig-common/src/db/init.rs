//! Database initialization
//!
//! Creates the database on first run, applies the required PRAGMAs and builds
//! the schema idempotently. Safe to call on every startup.

use crate::settings;
use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Pragmas are per-connection, so they go through the connect options:
    // foreign keys enforce evidence/vote ownership, WAL allows concurrent
    // readers with one writer (the engine relies on writer serialization,
    // not a global lock).
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_millis(5000));

    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // Schema creation (idempotent - safe to call multiple times)
    create_schema_version_table(&pool).await?;
    create_persons_table(&pool).await?;
    create_authors_table(&pool).await?;
    create_revisions_table(&pool).await?;
    create_evidence_table(&pool).await?;
    create_revision_votes_table(&pool).await?;
    create_audit_log_table(&pool).await?;
    create_settings_table(&pool).await?;

    // Policy defaults (database-first configuration)
    settings::init_default_settings(&pool).await?;

    Ok(pool)
}

async fn create_schema_version_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("INSERT OR IGNORE INTO schema_version (version) VALUES (1)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_persons_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS persons (
            guid        TEXT PRIMARY KEY,
            full_name   TEXT NOT NULL,
            role        TEXT,
            biography   TEXT,
            photo_ref   TEXT,
            reputation  REAL NOT NULL DEFAULT 0,
            influence   REAL NOT NULL DEFAULT 0,
            status      TEXT NOT NULL DEFAULT 'pending',
            created_at  INTEGER NOT NULL,
            updated_at  INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_authors_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS authors (
            handle           TEXT PRIMARY KEY,
            violation_count  INTEGER NOT NULL DEFAULT 0,
            is_shadow_banned INTEGER NOT NULL DEFAULT 0,
            reputation       REAL NOT NULL DEFAULT 0,
            created_at       INTEGER NOT NULL,
            updated_at       INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_revisions_table(pool: &SqlitePool) -> Result<()> {
    // person_guid and author_handle are deliberately plain columns, not
    // foreign keys: revision rows must remain readable even if the referenced
    // Person or Author row is later deleted by policy.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS revisions (
            guid               TEXT PRIMARY KEY,
            person_guid        TEXT NOT NULL,
            author_handle      TEXT NOT NULL,
            proposed           TEXT NOT NULL,
            justification      TEXT,
            status             TEXT NOT NULL DEFAULT 'pending',
            ai_score           REAL,
            reject_reason      TEXT,
            priority           INTEGER NOT NULL DEFAULT 0,
            client_fingerprint TEXT,
            created_at         INTEGER NOT NULL,
            updated_at         INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_revisions_person ON revisions(person_guid, created_at)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_revisions_queue ON revisions(status, priority, created_at)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_evidence_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS evidence (
            guid          TEXT PRIMARY KEY,
            revision_guid TEXT NOT NULL REFERENCES revisions(guid) ON DELETE CASCADE,
            url           TEXT NOT NULL,
            title         TEXT,
            kind          TEXT NOT NULL,
            polarity      TEXT NOT NULL,
            likes         INTEGER NOT NULL DEFAULT 0,
            dislikes      INTEGER NOT NULL DEFAULT 0,
            created_at    INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_evidence_revision ON evidence(revision_guid)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_revision_votes_table(pool: &SqlitePool) -> Result<()> {
    // UNIQUE(revision_guid, voter_handle) makes deep-check voting idempotent
    // per voter; without it a voter could multiply their own influence.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS revision_votes (
            revision_guid TEXT NOT NULL REFERENCES revisions(guid) ON DELETE CASCADE,
            voter_handle  TEXT NOT NULL,
            created_at    INTEGER NOT NULL,
            UNIQUE(revision_guid, voter_handle)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_audit_log_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS audit_log (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            action     TEXT NOT NULL,
            actor      TEXT NOT NULL,
            details    TEXT NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
