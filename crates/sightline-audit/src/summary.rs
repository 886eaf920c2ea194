//! Structured summary parsing and fallbacks.

use serde::{Deserialize, Serialize};

use crate::error::StageError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryIssue {
    pub title: String,
    pub explanation: String,
    pub impact: String,
    pub suggestion: String,
    pub severity: Severity,
}

/// Overall assessment plus issues ordered by severity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditSummary {
    pub overall_assessment: String,
    #[serde(default)]
    pub issues: Vec<SummaryIssue>,
}

impl AuditSummary {
    /// Placeholder used when no API credential is configured.
    pub fn not_configured() -> Self {
        Self {
            overall_assessment: "AI summary not configured: no Gemini API key was provided."
                .to_string(),
            issues: Vec::new(),
        }
    }

    /// Placeholder used when the summarization call failed.
    pub fn unavailable(reason: impl std::fmt::Display) -> Self {
        Self {
            overall_assessment: format!("AI summary unavailable due to error: {reason}"),
            issues: Vec::new(),
        }
    }

    /// Form persisted in the record's summary field.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Remove one leading ```` ```json ```` / ```` ``` ```` fence and one
/// trailing ```` ``` ```` fence.
pub fn strip_code_fence(text: &str) -> &str {
    let mut body = text.trim();
    if let Some(rest) = body.strip_prefix("```json") {
        body = rest;
    } else if let Some(rest) = body.strip_prefix("```") {
        body = rest;
    }
    if let Some(rest) = body.strip_suffix("```") {
        body = rest;
    }
    body.trim()
}

/// Parse a summarization response into an [`AuditSummary`].
pub fn parse_summary(text: &str) -> Result<AuditSummary, StageError> {
    let body = strip_code_fence(text);
    serde_json::from_str(body).map_err(|e| StageError::SummarizationFailed {
        reason: format!("response is not a valid summary object: {e}"),
    })
}
