//! Common error types for the pubfig moderation engine

use thiserror::Error;

/// Common result type for pubfig operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy shared by the stores and the moderation engine.
///
/// `Database` wraps transaction/commit failures and is propagated unmodified;
/// no partial state is ever observable when it surfaces. `Scoring` is the one
/// retryable kind: the batch loop releases the item's claim and reports it
/// per-item instead of failing the whole batch.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Referenced Person/Revision/Evidence/Author does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Operation attempted on a revision not in an eligible state.
    /// Indicates a caller-side race, not a system fault.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Malformed input (unknown proposal key, wrong value type)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The injected scoring collaborator failed; retryable per item
    #[error("Scoring failed: {0}")]
    Scoring(String),

    /// Internal invariant violation
    #[error("Internal error: {0}")]
    Internal(String),
}
