//! # Pubfig Common Library
//!
//! Shared code for the pubfig moderation services including:
//! - Error taxonomy and `Result` alias
//! - Database initialization and schema creation
//! - Data models (Person, Revision, Evidence, Author, AuditEntry)
//! - Policy settings (database-first key/value store)
//! - Configuration loading and root folder resolution

pub mod config;
pub mod db;
pub mod error;
pub mod settings;

pub use error::{Error, Result};
