//! SurrealDB row types
//!
//! Rows store plain strings and numbers; conversion to the storage-trait
//! types happens at the boundary in [`crate::surreal_store`]. The audit
//! report is stored as JSON text because SurrealDB drops `null` object
//! fields from stored documents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::storage_traits::{ArtifactRef, AuditRecord, RecordId, StorageResult};
use crate::StorageError;

/// Module for serializing chrono DateTime to SurrealDB datetime format
mod surreal_datetime {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};
    use surrealdb::sql::Datetime as SurrealDatetime;

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let sd = SurrealDatetime::from(*date);
        serde::Serialize::serialize(&sd, serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let sd = SurrealDatetime::deserialize(deserializer)?;
        Ok(DateTime::from(sd))
    }
}

/// Row in the `audit_records` table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecordRow {
    /// Record ID (UUID string), unique
    pub record_id: String,
    pub url: String,
    /// "pending" | "processing" | "completed" | "failed"
    pub status: String,
    pub performance_score: Option<i64>,
    /// Raw audit report, serialized JSON
    pub audit_report: Option<String>,
    pub summary: Option<String>,
    /// Screenshot artifact digest (hex)
    pub screenshot_ref: Option<String>,
    #[serde(with = "surreal_datetime")]
    pub created_at: DateTime<Utc>,
}

impl TryFrom<&AuditRecord> for AuditRecordRow {
    type Error = StorageError;

    fn try_from(record: &AuditRecord) -> StorageResult<Self> {
        let audit_report = record
            .audit_report
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        Ok(AuditRecordRow {
            record_id: record.id.0.clone(),
            url: record.url.clone(),
            status: record.status.as_str().to_string(),
            performance_score: record.performance_score.map(i64::from),
            audit_report,
            summary: record.summary.clone(),
            screenshot_ref: record.screenshot_ref.as_ref().map(|r| r.as_str().to_string()),
            created_at: record.created_at,
        })
    }
}

impl AuditRecordRow {
    /// Convert a DB row back into an [`AuditRecord`].
    pub fn into_record(self) -> StorageResult<AuditRecord> {
        let performance_score = self
            .performance_score
            .map(|score| {
                u8::try_from(score).map_err(|_| {
                    StorageError::Backend(format!(
                        "stored performance score {score} for {} is not a valid score",
                        self.record_id
                    ))
                })
            })
            .transpose()?;
        let audit_report = self
            .audit_report
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;

        Ok(AuditRecord {
            id: RecordId(self.record_id),
            url: self.url,
            status: self.status.parse()?,
            performance_score,
            audit_report,
            summary: self.summary,
            screenshot_ref: self.screenshot_ref.map(ArtifactRef::try_from).transpose()?,
            created_at: self.created_at,
        })
    }
}
