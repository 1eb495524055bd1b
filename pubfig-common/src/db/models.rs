//! Shared data models and status enums
//!
//! All enums are closed tagged variants, string-encoded in SQL. The set of
//! evidence kinds and polarities is small and fixed; readers handle it
//! exhaustively rather than through an open hierarchy.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Sparse key-presence map of proposed snapshot changes.
///
/// A key that is absent means "leave this field untouched"; a key that is
/// present with a JSON `null` means "explicitly clear this field". Collapsing
/// the two would silently corrupt snapshots on merge, so proposals are never
/// represented as a full Person record with nullable fields.
pub type ProposalMap = serde_json::Map<String, serde_json::Value>;

/// Revision lifecycle status.
///
/// Transitions are monotonic and one-directional:
/// `Pending -> {Approved, Rejected, Processing -> {Approved, Rejected, Pending}}`.
/// `Approved` and `Rejected` are terminal; `Processing -> Pending` is the
/// claim-release path only (scoring failure or stale-lease reap).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevisionStatus {
    Pending,
    Processing,
    Approved,
    Rejected,
}

impl RevisionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RevisionStatus::Pending => "pending",
            RevisionStatus::Processing => "processing",
            RevisionStatus::Approved => "approved",
            RevisionStatus::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RevisionStatus::Approved | RevisionStatus::Rejected)
    }
}

impl fmt::Display for RevisionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RevisionStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(RevisionStatus::Pending),
            "processing" => Ok(RevisionStatus::Processing),
            "approved" => Ok(RevisionStatus::Approved),
            "rejected" => Ok(RevisionStatus::Rejected),
            other => Err(Error::Internal(format!("Unknown revision status: {}", other))),
        }
    }
}

/// Entity-level lifecycle status of a Person, independent of revision status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersonStatus {
    Pending,
    Approved,
    Rejected,
}

impl PersonStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PersonStatus::Pending => "pending",
            PersonStatus::Approved => "approved",
            PersonStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for PersonStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PersonStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(PersonStatus::Pending),
            "approved" => Ok(PersonStatus::Approved),
            "rejected" => Ok(PersonStatus::Rejected),
            other => Err(Error::Internal(format!("Unknown person status: {}", other))),
        }
    }
}

/// Kind of an evidence item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceKind {
    Link,
    Image,
    Document,
    Video,
    VoteRecord,
}

impl EvidenceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvidenceKind::Link => "link",
            EvidenceKind::Image => "image",
            EvidenceKind::Document => "document",
            EvidenceKind::Video => "video",
            EvidenceKind::VoteRecord => "vote_record",
        }
    }
}

impl FromStr for EvidenceKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "link" => Ok(EvidenceKind::Link),
            "image" => Ok(EvidenceKind::Image),
            "document" => Ok(EvidenceKind::Document),
            "video" => Ok(EvidenceKind::Video),
            "vote_record" => Ok(EvidenceKind::VoteRecord),
            other => Err(Error::Internal(format!("Unknown evidence kind: {}", other))),
        }
    }
}

/// Whether an evidence item supports or refutes the revision's claim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidencePolarity {
    Supports,
    Refutes,
}

impl EvidencePolarity {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvidencePolarity::Supports => "supports",
            EvidencePolarity::Refutes => "refutes",
        }
    }
}

impl FromStr for EvidencePolarity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "supports" => Ok(EvidencePolarity::Supports),
            "refutes" => Ok(EvidencePolarity::Refutes),
            other => Err(Error::Internal(format!("Unknown evidence polarity: {}", other))),
        }
    }
}

/// Canonical, publicly-visible snapshot of a tracked figure.
///
/// Mutated only through approved-revision application or direct admin
/// override; deleted only via explicit cascade delete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Person {
    pub guid: Uuid,
    pub full_name: String,
    pub role: Option<String>,
    pub biography: Option<String>,
    pub photo_ref: Option<String>,
    pub reputation: f64,
    pub influence: f64,
    pub status: PersonStatus,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Fields for creating a new Person (admin action)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPerson {
    pub full_name: String,
    pub role: Option<String>,
    pub biography: Option<String>,
    pub photo_ref: Option<String>,
    pub status: PersonStatus,
}

/// A proposed delta against a Person, with lifecycle status.
///
/// The `client_fingerprint` is captured only for abuse correlation and is
/// never used to identify individuals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Revision {
    pub guid: Uuid,
    pub person_guid: Uuid,
    pub author_handle: String,
    pub proposed: ProposalMap,
    pub justification: Option<String>,
    pub status: RevisionStatus,
    pub ai_score: Option<f64>,
    pub reject_reason: Option<String>,
    pub priority: i64,
    pub client_fingerprint: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Fields for submitting a new Revision
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRevision {
    pub person_guid: Uuid,
    pub author_handle: String,
    pub proposed: ProposalMap,
    pub justification: Option<String>,
    pub client_fingerprint: Option<String>,
    pub evidence: Vec<NewEvidence>,
}

/// An evidence item attached to exactly one Revision
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evidence {
    pub guid: Uuid,
    pub revision_guid: Uuid,
    pub url: String,
    pub title: Option<String>,
    pub kind: EvidenceKind,
    pub polarity: EvidencePolarity,
    pub likes: i64,
    pub dislikes: i64,
    pub created_at: i64,
}

/// Fields for attaching evidence to a new Revision
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEvidence {
    pub url: String,
    pub title: Option<String>,
    pub kind: EvidenceKind,
    pub polarity: EvidencePolarity,
}

/// Per-author reputation record, keyed by an opaque handle.
///
/// `is_shadow_banned` is a one-way ratchet as far as the rejection path is
/// concerned; only an explicit admin unban clears it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorRecord {
    pub handle: String,
    pub violation_count: i64,
    pub is_shadow_banned: bool,
    pub reputation: f64,
    pub created_at: i64,
    pub updated_at: i64,
}

/// One append-only audit log row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: i64,
    pub action: String,
    pub actor: String,
    pub details: serde_json::Value,
    pub created_at: i64,
}

/// Snapshot fields a proposal may touch
pub const PROPOSAL_FIELDS: &[&str] = &[
    "full_name",
    "role",
    "biography",
    "photo_ref",
    "reputation",
    "influence",
    "status",
];

/// Validate a proposal map before any write.
///
/// Unknown keys and wrongly-typed values are rejected here so the merge path
/// only ever sees known snapshot fields. An empty map is valid (approving it
/// leaves the snapshot unchanged).
pub fn validate_proposal(proposal: &ProposalMap) -> Result<()> {
    use serde_json::Value;

    for (key, value) in proposal {
        match key.as_str() {
            "full_name" => {
                if !value.is_string() {
                    return Err(Error::InvalidInput(
                        "full_name must be a non-null string".to_string(),
                    ));
                }
            }
            "role" | "biography" | "photo_ref" => {
                if !value.is_string() && !value.is_null() {
                    return Err(Error::InvalidInput(format!(
                        "{} must be a string or null",
                        key
                    )));
                }
            }
            "reputation" | "influence" => {
                if !value.is_number() {
                    return Err(Error::InvalidInput(format!("{} must be a number", key)));
                }
            }
            "status" => match value {
                Value::String(s) => {
                    s.parse::<PersonStatus>()
                        .map_err(|_| Error::InvalidInput(format!("Unknown status value: {}", s)))?;
                }
                _ => {
                    return Err(Error::InvalidInput("status must be a string".to_string()));
                }
            },
            other => {
                return Err(Error::InvalidInput(format!(
                    "Unknown proposal field: {}",
                    other
                )));
            }
        }
    }

    Ok(())
}
