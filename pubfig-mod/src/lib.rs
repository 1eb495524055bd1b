//! Moderation engine for pubfig
//!
//! The transactional state machine behind contributor revisions: creates
//! them, scores and auto-approves them, applies approved changes to the
//! canonical snapshot, penalizes abusive submitters, and writes the
//! append-only audit trail. Consumed by the presentation layer through the
//! [`engine::ModerationEngine`] API; this crate owns no HTTP surface.

pub mod db;
pub mod engine;

pub use engine::{BatchOutcome, BatchReport, ModerationEngine, Scorer};
