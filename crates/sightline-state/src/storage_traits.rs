//! Storage trait definitions for Sightline
//!
//! These traits define the two storage abstractions the audit pipeline
//! depends on:
//! - `RecordStore`: audit record persistence with partial-field checkpoints
//! - `ArtifactStore`: binary artifact (screenshot) storage keyed by digest
//!
//! All traits are async and backend-agnostic. In-memory fakes are provided
//! for testing via the `fakes` module.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::StorageError;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Unique identifier for an audit record
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordId(pub String);

impl RecordId {
    /// Generate a new random RecordId
    pub fn new() -> Self {
        RecordId(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        RecordId(s.to_string())
    }
}

/// Reference to a stored artifact: the SHA-256 digest of its bytes.
///
/// The inner field is private to guarantee the string is always valid
/// lowercase hex produced by `from_bytes` or validated via `TryFrom<String>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactRef(String);

impl ArtifactRef {
    /// Compute the reference for the given bytes.
    pub fn from_bytes(data: &[u8]) -> Self {
        use sha2::Digest;
        let mut hasher = Sha256::new();
        hasher.update(data);
        ArtifactRef(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form (first 12 hex chars).
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl TryFrom<String> for ArtifactRef {
    type Error = StorageError;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        if s.len() != 64 || !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(StorageError::InvalidDigest { digest: s });
        }
        Ok(ArtifactRef(s.to_ascii_lowercase()))
    }
}

impl std::fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// AuditRecord
// ---------------------------------------------------------------------------

/// Lifecycle status of an audit record.
///
/// `Pending → Processing → Completed | Failed`; the last two are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl AuditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditStatus::Pending => "pending",
            AuditStatus::Processing => "processing",
            AuditStatus::Completed => "completed",
            AuditStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AuditStatus::Completed | AuditStatus::Failed)
    }

    /// Whether a record in this status may be saved with status `next`.
    ///
    /// Re-saving `Processing` is allowed so retries can checkpoint without
    /// re-transitioning.
    pub fn can_transition_to(&self, next: AuditStatus) -> bool {
        matches!(
            (self, next),
            (AuditStatus::Pending, AuditStatus::Processing)
                | (AuditStatus::Processing, AuditStatus::Processing)
                | (AuditStatus::Processing, AuditStatus::Completed)
                | (AuditStatus::Processing, AuditStatus::Failed)
        )
    }
}

impl std::fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

impl std::str::FromStr for AuditStatus {
    type Err = StorageError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(AuditStatus::Pending),
            "processing" => Ok(AuditStatus::Processing),
            "completed" => Ok(AuditStatus::Completed),
            "failed" => Ok(AuditStatus::Failed),
            other => Err(StorageError::Backend(format!("unknown audit status: {other}"))),
        }
    }
}

/// Score and raw report produced by the audit stage. Always persisted as a pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditOutcome {
    /// Performance category score scaled to 0-100
    pub performance_score: u8,
    /// Raw structured report as produced by the audit tool
    pub report: serde_json::Value,
}

/// One requested audit and everything the pipeline has produced for it so far
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: RecordId,
    pub url: String,
    pub status: AuditStatus,
    pub performance_score: Option<u8>,
    pub audit_report: Option<serde_json::Value>,
    /// Structured summary JSON, a degraded-summary placeholder, or the
    /// terminal error message of a failed audit
    pub summary: Option<String>,
    pub screenshot_ref: Option<ArtifactRef>,
    pub created_at: DateTime<Utc>,
}

impl AuditRecord {
    /// Create a new record in `Pending` state
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            id: RecordId::new(),
            url: url.into(),
            status: AuditStatus::Pending,
            performance_score: None,
            audit_report: None,
            summary: None,
            screenshot_ref: None,
            created_at: Utc::now(),
        }
    }

    /// Apply a partial update, enforcing the record invariants.
    ///
    /// Every backend routes writes through this method so the invariants
    /// hold regardless of where the record lives.
    pub fn apply(&mut self, patch: RecordPatch) -> StorageResult<()> {
        if self.status.is_terminal() {
            return Err(StorageError::RecordTerminal {
                id: self.id.to_string(),
                status: self.status.to_string(),
            });
        }

        if let Some(next) = patch.status {
            if !self.status.can_transition_to(next) {
                return Err(StorageError::InvalidTransition {
                    id: self.id.to_string(),
                    from: self.status.to_string(),
                    to: next.to_string(),
                });
            }
        }

        if let Some(outcome) = &patch.audit {
            if outcome.performance_score > 100 {
                return Err(StorageError::ScoreOutOfRange {
                    id: self.id.to_string(),
                    score: outcome.performance_score,
                });
            }
        }

        if let Some(next) = patch.status {
            self.status = next;
        }
        if let Some(screenshot) = patch.screenshot_ref {
            self.screenshot_ref = Some(screenshot);
        }
        if let Some(outcome) = patch.audit {
            self.performance_score = Some(outcome.performance_score);
            self.audit_report = Some(outcome.report);
        }
        if let Some(summary) = patch.summary {
            self.summary = Some(summary);
        }
        Ok(())
    }
}

/// Partial-field update used for pipeline checkpoints.
///
/// Only the fields that are `Some` are written.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordPatch {
    pub status: Option<AuditStatus>,
    pub screenshot_ref: Option<ArtifactRef>,
    pub audit: Option<AuditOutcome>,
    pub summary: Option<String>,
}

impl RecordPatch {
    /// `Pending → Processing`
    pub fn processing() -> Self {
        Self {
            status: Some(AuditStatus::Processing),
            ..Self::default()
        }
    }

    /// Screenshot checkpoint
    pub fn screenshot(screenshot_ref: ArtifactRef) -> Self {
        Self {
            screenshot_ref: Some(screenshot_ref),
            ..Self::default()
        }
    }

    /// Audit checkpoint: score and report together
    pub fn audit(performance_score: u8, report: serde_json::Value) -> Self {
        Self {
            audit: Some(AuditOutcome {
                performance_score,
                report,
            }),
            ..Self::default()
        }
    }

    /// Final write of a successful run
    pub fn completed(summary: impl Into<String>) -> Self {
        Self {
            status: Some(AuditStatus::Completed),
            summary: Some(summary.into()),
            ..Self::default()
        }
    }

    /// Final write of a failed run; the message lands in the summary field
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: Some(AuditStatus::Failed),
            summary: Some(message.into()),
            ..Self::default()
        }
    }
}

// ---------------------------------------------------------------------------
// RecordStore: audit record persistence
// ---------------------------------------------------------------------------

/// Audit record store.
///
/// Guarantees:
/// - `create` returns a fresh record in `Pending` state.
/// - `save` writes only the fields present in the patch.
/// - Status only moves forward; terminal records are immutable.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Create a new `Pending` record for `url`.
    async fn create(&self, url: &str) -> StorageResult<AuditRecord>;

    /// Retrieve a record by ID. Returns `StorageError::RecordNotFound` if absent.
    async fn get(&self, id: &RecordId) -> StorageResult<AuditRecord>;

    /// Apply a partial update and return the record as persisted.
    async fn save(&self, id: &RecordId, patch: RecordPatch) -> StorageResult<AuditRecord>;

    /// List records, newest first, at most `limit` of them.
    async fn list(&self, limit: usize) -> StorageResult<Vec<AuditRecord>>;
}

// ---------------------------------------------------------------------------
// ArtifactStore: binary artifact storage
// ---------------------------------------------------------------------------

/// Binary artifact store.
///
/// Guarantees:
/// - `store(record_id, data)` returns the SHA-256 reference of `data`.
/// - `load(reference)` returns the exact bytes previously stored.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Durably store bytes produced for `record_id` and return their reference.
    async fn store(&self, record_id: &RecordId, data: &[u8]) -> StorageResult<ArtifactRef>;

    /// Retrieve bytes by reference. Returns `StorageError::ArtifactNotFound` if absent.
    async fn load(&self, artifact: &ArtifactRef) -> StorageResult<Vec<u8>>;
}
