//! Lighthouse report model and findings extraction.
//!
//! Everything here is pure: no I/O, deterministic output for a given report.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::StageError;

/// Audits scoring at or above this are considered passing.
pub const NEEDS_IMPROVEMENT_THRESHOLD: f64 = 0.9;

/// Upper bound on findings handed to the summarizer.
pub const MAX_FINDINGS: usize = 15;

/// The subset of a Lighthouse JSON report the pipeline reads.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LighthouseReport {
    #[serde(default)]
    pub categories: HashMap<String, CategoryResult>,
    #[serde(default)]
    pub audits: BTreeMap<String, AuditResult>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryResult {
    #[serde(default)]
    pub score: Option<f64>,
}

/// One entry of the report's `audits` map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditResult {
    #[serde(default)]
    pub title: Option<String>,
    /// `None` for informative or not-applicable audits.
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default, rename = "displayValue")]
    pub display_value: Option<String>,
}

impl LighthouseReport {
    /// Parse the typed view out of a raw report.
    pub fn from_value(raw: &serde_json::Value) -> Result<Self, StageError> {
        serde_json::from_value(raw.clone()).map_err(|e| StageError::AuditMalformedOutput {
            reason: format!("report does not match the Lighthouse schema: {e}"),
        })
    }

    /// `categories.performance.score` scaled to 0-100.
    ///
    /// A missing or null score means the run never measured performance,
    /// which is treated as malformed output rather than a score of zero.
    pub fn performance_score(&self) -> Result<u8, StageError> {
        let score = self
            .categories
            .get("performance")
            .and_then(|c| c.score)
            .ok_or_else(|| StageError::AuditMalformedOutput {
                reason: "categories.performance.score is missing".to_string(),
            })?;
        Ok(scale_score(score))
    }
}

/// Scale a fractional score in [0, 1] to an integer percentage.
pub fn scale_score(score: f64) -> u8 {
    if !score.is_finite() {
        return 0;
    }
    (score * 100.0).round().clamp(0.0, 100.0) as u8
}

/// An audit that scored below the passing threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct Finding {
    pub audit_id: String,
    pub title: String,
    pub display_value: String,
    pub score: f64,
}

impl Finding {
    /// Prompt line: `- <title> (Value: <displayValue>)`.
    pub fn render(&self) -> String {
        format!("- {} (Value: {})", self.title, self.display_value)
    }
}

/// Select failing audits, worst first, at most [`MAX_FINDINGS`].
///
/// Equal scores are ordered by audit id so the output is stable.
pub fn extract_findings(report: &LighthouseReport) -> Vec<Finding> {
    let mut findings: Vec<Finding> = report
        .audits
        .iter()
        .filter_map(|(id, audit)| {
            let score = audit.score?;
            if score >= NEEDS_IMPROVEMENT_THRESHOLD {
                return None;
            }
            Some(Finding {
                audit_id: id.clone(),
                title: audit.title.clone().unwrap_or_else(|| id.clone()),
                display_value: audit.display_value.clone().unwrap_or_default(),
                score,
            })
        })
        .collect();

    findings.sort_by(|a, b| {
        a.score
            .total_cmp(&b.score)
            .then_with(|| a.audit_id.cmp(&b.audit_id))
    });
    findings.truncate(MAX_FINDINGS);
    findings
}
