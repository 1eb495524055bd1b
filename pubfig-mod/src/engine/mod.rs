//! The moderation state machine
//!
//! Revision lifecycle: `pending -> {approved, rejected, processing ->
//! {approved, rejected, pending}}`; `approved` and `rejected` are terminal.
//! Every transition commits its dependent Person/Author/Audit writes in one
//! database transaction, so partial application (snapshot mutated but
//! revision still pending, or the reverse) is impossible. Races are settled
//! by conditional status updates: whichever transaction flips the status
//! first wins, the loser observes the new state and gets `InvalidState`.

mod scoring;

pub use scoring::{BatchOutcome, BatchReport, FixedScorer, Scorer};

use crate::db::{audit, authors, persons, revisions, votes};
use chrono::Utc;
use pubfig_common::db::models::{
    validate_proposal, NewRevision, Revision, RevisionStatus,
};
use pubfig_common::{settings, Error, Result};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tracing::{info, warn};
use uuid::Uuid;

/// Actor recorded for automated transitions (auto-approval, batch scoring)
pub const SYSTEM_ACTOR: &str = "system";

/// Transactional moderation engine over a shared connection pool
#[derive(Clone)]
pub struct ModerationEngine {
    pool: SqlitePool,
}

impl ModerationEngine {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Submit a new revision with its evidence.
    ///
    /// Checks author standing first: a shadow-banned author's revision is
    /// created directly in `rejected` state, with no violation-count
    /// increment (the ban is not compounded by the creation-time
    /// auto-reject). Fails `NotFound` when the target person does not exist.
    pub async fn create_revision(&self, new: &NewRevision) -> Result<Revision> {
        validate_proposal(&new.proposed)?;

        let mut tx = self.pool.begin().await?;

        if !persons::exists(&mut *tx, new.person_guid).await? {
            return Err(Error::NotFound(format!("Person {}", new.person_guid)));
        }

        let author = authors::get_or_create_tx(&mut tx, &new.author_handle).await?;
        let status = if author.is_shadow_banned {
            RevisionStatus::Rejected
        } else {
            RevisionStatus::Pending
        };

        let revision = revisions::insert_tx(&mut tx, new, status).await?;

        audit::append(
            &mut *tx,
            "CREATE_REVISION",
            &new.author_handle,
            &json!({
                "revision": revision.guid.to_string(),
                "person": new.person_guid.to_string(),
                "evidence_count": new.evidence.len(),
                "auto_rejected": author.is_shadow_banned,
            }),
        )
        .await?;

        tx.commit().await?;

        info!(
            revision = %revision.guid,
            person = %new.person_guid,
            status = %revision.status,
            "Created revision"
        );
        Ok(revision)
    }

    /// Fetch a revision by id
    pub async fn get_revision(&self, revision_guid: Uuid) -> Result<Option<Revision>> {
        revisions::get(&self.pool, revision_guid).await
    }

    /// Revision history for a person, newest first
    pub async fn history_for_person(&self, person_guid: Uuid) -> Result<Vec<Revision>> {
        revisions::history_for_person(&self.pool, person_guid).await
    }

    /// Moderation queue page, newest first
    pub async fn pending(&self, limit: u32, offset: u32) -> Result<Vec<Revision>> {
        revisions::pending(&self.pool, limit, offset).await
    }

    /// Approve a pending or processing revision and apply its proposal to
    /// the person snapshot.
    ///
    /// One transaction covers the status flip, the partial merge and the
    /// audit entry; all three commit together or none do. Approving a
    /// terminal revision is a hard `InvalidState` error (it signals a
    /// moderation race or double-submission), never a silent no-op.
    pub async fn approve(
        &self,
        revision_guid: Uuid,
        approver: &str,
        ai_score: Option<f64>,
    ) -> Result<Revision> {
        let mut tx = self.pool.begin().await?;

        let revision = revisions::get(&mut *tx, revision_guid)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Revision {}", revision_guid)))?;

        let flipped = sqlx::query(
            "UPDATE revisions SET status = 'approved', ai_score = COALESCE(?, ai_score), updated_at = ? \
             WHERE guid = ? AND status IN ('pending', 'processing')",
        )
        .bind(ai_score)
        .bind(Utc::now().timestamp())
        .bind(revision_guid.to_string())
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if flipped == 0 {
            return Err(Error::InvalidState(format!(
                "Revision {} is {} and cannot be approved",
                revision_guid, revision.status
            )));
        }

        if !persons::exists(&mut *tx, revision.person_guid).await? {
            return Err(Error::NotFound(format!("Person {}", revision.person_guid)));
        }
        persons::apply_proposal_tx(&mut tx, revision.person_guid, &revision.proposed).await?;

        audit::append(
            &mut *tx,
            "APPROVE_REVISION",
            approver,
            &json!({
                "revision": revision_guid.to_string(),
                "person": revision.person_guid.to_string(),
                "ai_score": ai_score,
                "changes": Value::Object(audit::primitive_subset(&revision.proposed)),
            }),
        )
        .await?;

        let updated = revisions::get(&mut *tx, revision_guid)
            .await?
            .ok_or_else(|| Error::Internal(format!("Revision vanished mid-approve: {}", revision_guid)))?;
        tx.commit().await?;

        info!(revision = %revision_guid, person = %revision.person_guid, "Approved revision");
        Ok(updated)
    }

    /// Reject a pending or processing revision and penalize its author.
    ///
    /// The violation counter increments by exactly one inside the same
    /// transaction; the shadow-ban flag is a one-way ratchet engaged when
    /// the counter reaches the policy threshold.
    pub async fn reject(
        &self,
        revision_guid: Uuid,
        approver: &str,
        reason: Option<&str>,
    ) -> Result<Revision> {
        let ban_threshold = settings::violation_ban_threshold(&self.pool).await?;

        let mut tx = self.pool.begin().await?;

        let revision = revisions::get(&mut *tx, revision_guid)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Revision {}", revision_guid)))?;

        let flipped = sqlx::query(
            "UPDATE revisions SET status = 'rejected', reject_reason = ?, updated_at = ? \
             WHERE guid = ? AND status IN ('pending', 'processing')",
        )
        .bind(reason)
        .bind(Utc::now().timestamp())
        .bind(revision_guid.to_string())
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if flipped == 0 {
            return Err(Error::InvalidState(format!(
                "Revision {} is {} and cannot be rejected",
                revision_guid, revision.status
            )));
        }

        let was_banned = authors::get(&mut *tx, &revision.author_handle)
            .await?
            .map(|a| a.is_shadow_banned)
            .unwrap_or(false);
        let author =
            authors::record_violation_tx(&mut tx, &revision.author_handle, ban_threshold).await?;
        let ban_triggered = author.is_shadow_banned && !was_banned;

        audit::append(
            &mut *tx,
            "REJECT_REVISION",
            approver,
            &json!({
                "revision": revision_guid.to_string(),
                "person": revision.person_guid.to_string(),
                "reason": reason,
                "violation_count": author.violation_count,
                "ban_triggered": ban_triggered,
            }),
        )
        .await?;

        let updated = revisions::get(&mut *tx, revision_guid)
            .await?
            .ok_or_else(|| Error::Internal(format!("Revision vanished mid-reject: {}", revision_guid)))?;
        tx.commit().await?;

        if ban_triggered {
            warn!(
                author = %revision.author_handle,
                violations = author.violation_count,
                "Author shadow-banned"
            );
        }
        info!(revision = %revision_guid, "Rejected revision");
        Ok(updated)
    }

    /// Persist an AI score and auto-approve when it clears the threshold.
    ///
    /// Below the threshold (or with auto-approval disabled) the score is
    /// stored and the revision goes back to the manual queue, releasing a
    /// `processing` claim if one was held.
    pub async fn process_with_score(
        &self,
        revision_guid: Uuid,
        score: f64,
        auto_approve_enabled: bool,
    ) -> Result<Revision> {
        let threshold = settings::auto_approve_threshold(&self.pool).await?;

        if auto_approve_enabled && score >= threshold {
            return self.approve(revision_guid, SYSTEM_ACTOR, Some(score)).await;
        }

        let mut tx = self.pool.begin().await?;

        let revision = revisions::get(&mut *tx, revision_guid)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Revision {}", revision_guid)))?;

        let flipped = sqlx::query(
            "UPDATE revisions SET ai_score = ?, status = 'pending', updated_at = ? \
             WHERE guid = ? AND status IN ('pending', 'processing')",
        )
        .bind(score)
        .bind(Utc::now().timestamp())
        .bind(revision_guid.to_string())
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if flipped == 0 {
            return Err(Error::InvalidState(format!(
                "Revision {} is {} and cannot be scored",
                revision_guid, revision.status
            )));
        }

        let updated = revisions::get(&mut *tx, revision_guid)
            .await?
            .ok_or_else(|| Error::Internal(format!("Revision vanished mid-score: {}", revision_guid)))?;
        tx.commit().await?;

        info!(revision = %revision_guid, score, "Scored revision, held for manual review");
        Ok(updated)
    }

    /// One batch scoring pass: claim up to `limit` pending revisions
    /// (highest deep-check priority first, oldest first on ties), score each
    /// with the injected collaborator, resolve each through
    /// [`process_with_score`](Self::process_with_score).
    ///
    /// Each item is its own transaction; one slow or failing item never
    /// blocks or aborts its siblings. A scorer failure releases the item's
    /// claim back to `pending` so the next batch retries it.
    pub async fn process_batch<S: Scorer>(&self, scorer: &S, limit: u32) -> Result<BatchReport> {
        let claimed = revisions::claim_for_processing(&self.pool, limit).await?;
        let mut report = BatchReport::default();

        for revision in claimed {
            let outcome = match scorer.score(&revision).await {
                Ok(score) => match self.process_with_score(revision.guid, score, true).await {
                    Ok(updated) if updated.status == RevisionStatus::Approved => {
                        BatchOutcome::AutoApproved {
                            revision: revision.guid,
                            score,
                        }
                    }
                    Ok(_) => BatchOutcome::HeldForReview {
                        revision: revision.guid,
                        score,
                    },
                    Err(e) => {
                        // A manual moderator resolved it while we were
                        // scoring; the claim is already gone.
                        warn!(revision = %revision.guid, error = %e, "Batch item superseded");
                        BatchOutcome::Superseded {
                            revision: revision.guid,
                            message: e.to_string(),
                        }
                    }
                },
                Err(e) => {
                    warn!(revision = %revision.guid, error = %e, "Scoring failed, releasing claim");
                    revisions::release_to_pending(&self.pool, revision.guid).await?;
                    BatchOutcome::ScoreFailed {
                        revision: revision.guid,
                        message: e.to_string(),
                    }
                }
            };
            report.outcomes.push(outcome);
        }

        info!(
            claimed = report.claimed(),
            approved = report.approved(),
            held = report.held(),
            failed = report.failed(),
            "Batch scoring pass complete"
        );
        Ok(report)
    }

    /// Deep-check priority vote; idempotent per (revision, voter)
    pub async fn vote_for_deep_check(
        &self,
        revision_guid: Uuid,
        voter_handle: &str,
    ) -> Result<bool> {
        votes::vote_for_deep_check(&self.pool, revision_guid, voter_handle).await
    }

    /// Release claims stuck in `processing` past the configured lease
    pub async fn reap_stale_claims(&self) -> Result<u64> {
        let lease = settings::processing_lease_seconds(&self.pool).await?;
        let reaped = revisions::reap_stale_processing(&self.pool, lease).await?;
        if reaped > 0 {
            warn!(reaped, "Returned stale processing claims to pending");
        }
        Ok(reaped)
    }
}
