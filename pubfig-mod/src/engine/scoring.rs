//! Scoring collaborator seam and batch reporting
//!
//! The AI scorer is an injected black box returning a confidence value in
//! [0, 100]. The engine never interprets its internals; a failure is
//! retryable and releases the item's claim.

use pubfig_common::db::models::Revision;
use pubfig_common::Result;
use serde::Serialize;
use uuid::Uuid;

/// Injected scoring collaborator.
///
/// Implementations return a score in [0, 100]; errors are treated as
/// transient by the batch loop (claim released, item retried next run).
pub trait Scorer {
    fn score(&self, revision: &Revision) -> impl std::future::Future<Output = Result<f64>> + Send;
}

/// Scorer that assigns the same score to every revision. Useful for
/// operator dry-runs and tests; a real model client plugs in the same seam.
#[derive(Debug, Clone, Copy)]
pub struct FixedScorer {
    pub score: f64,
}

impl Scorer for FixedScorer {
    async fn score(&self, _revision: &Revision) -> Result<f64> {
        Ok(self.score.clamp(0.0, 100.0))
    }
}

/// Outcome of one revision inside a batch run
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum BatchOutcome {
    /// Score met the threshold; revision approved and snapshot updated
    AutoApproved { revision: Uuid, score: f64 },
    /// Score persisted, revision returned to the manual review queue
    HeldForReview { revision: Uuid, score: f64 },
    /// Scorer failed; claim released so the item retries next batch
    ScoreFailed { revision: Uuid, message: String },
    /// Another transaction resolved the revision while we held the score
    Superseded { revision: Uuid, message: String },
}

/// Per-item report for one batch run. Failures are reported here, never
/// thrown to the `process_batch` caller.
#[derive(Debug, Default, Serialize)]
pub struct BatchReport {
    pub outcomes: Vec<BatchOutcome>,
}

impl BatchReport {
    pub fn claimed(&self) -> usize {
        self.outcomes.len()
    }

    pub fn approved(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, BatchOutcome::AutoApproved { .. }))
            .count()
    }

    pub fn held(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, BatchOutcome::HeldForReview { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| {
                matches!(
                    o,
                    BatchOutcome::ScoreFailed { .. } | BatchOutcome::Superseded { .. }
                )
            })
            .count()
    }
}
