//! Audit pipeline orchestration.
//!
//! One [`AuditPipeline::run`] call drives a single record from `Pending`
//! to a terminal status:
//!
//! 1. persist `Processing`
//! 2. capture a screenshot and persist its artifact ref
//! 3. run the audit and persist score and report together
//! 4. extract findings and build the summary prompt
//! 5. summarize, absorbing any failure into a fallback summary
//! 6. persist `Completed` with the summary
//!
//! Steps 2-6 form one attempt. Failed attempts are retried per the
//! [`RetryPolicy`]; on exhaustion the record is persisted as `Failed`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use sightline_state::{ArtifactStore, AuditStatus, RecordId, RecordPatch, RecordStore};
use tracing::{error, info, instrument, warn};

use crate::config::SightlineConfig;
use crate::error::{PipelineError, PipelineResult, StageError};
use crate::findings::extract_findings;
use crate::prompt::build_prompt;
use crate::retry::RetryPolicy;
use crate::stage::StageSet;
use crate::summary::{parse_summary, AuditSummary};
use crate::workspace::TransientArtifacts;

/// Orchestrator settings.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub retry: RetryPolicy,
    /// Bound on the summarization call, on top of the client's own timeout.
    pub summary_timeout: Duration,
    /// Parent of the per-attempt workspaces.
    pub work_dir: PathBuf,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self::from_config(&SightlineConfig::default())
    }
}

impl PipelineOptions {
    pub fn from_config(config: &SightlineConfig) -> Self {
        Self {
            retry: config.retry,
            summary_timeout: config.summarizer.timeout,
            work_dir: config.work_dir.clone(),
        }
    }
}

/// How a pipeline run ended.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub record_id: RecordId,
    /// Terminal status that was persisted.
    pub status: AuditStatus,
    /// Attempts made, including the successful one.
    pub attempts: u32,
    /// Message of the last error when the record failed.
    pub error: Option<String>,
    /// Whether a fallback summary was persisted instead of a generated one.
    pub summary_degraded: bool,
}

impl PipelineOutcome {
    pub fn completed(&self) -> bool {
        self.status == AuditStatus::Completed
    }
}

/// Sequences the capture, audit and summary stages for one record.
pub struct AuditPipeline {
    records: Arc<dyn RecordStore>,
    artifacts: Arc<dyn ArtifactStore>,
    stages: StageSet,
    options: PipelineOptions,
}

impl AuditPipeline {
    pub fn new(
        records: Arc<dyn RecordStore>,
        artifacts: Arc<dyn ArtifactStore>,
        stages: StageSet,
        options: PipelineOptions,
    ) -> Self {
        Self {
            records,
            artifacts,
            stages,
            options,
        }
    }

    /// Run the pipeline for `id` to a terminal status.
    ///
    /// Returns `Ok` with the outcome whenever a terminal status was persisted,
    /// including `Failed`. Returns `Err` only when the record could not be
    /// driven at all: it does not exist, it is already terminal, or the
    /// terminal status itself could not be written.
    #[instrument(skip(self, id), fields(record_id = %id))]
    pub async fn run(&self, id: &RecordId) -> PipelineResult<PipelineOutcome> {
        let record = self.records.get(id).await?;

        match record.status {
            AuditStatus::Pending => {
                self.records.save(id, RecordPatch::processing()).await?;
                info!(url = %record.url, "audit started");
            }
            AuditStatus::Processing => {
                info!(url = %record.url, "resuming audit left in processing");
            }
            status => {
                return Err(PipelineError::AlreadyTerminal {
                    id: id.to_string(),
                    status: status.to_string(),
                });
            }
        }

        let policy = self.options.retry;
        let mut attempt = 1;
        loop {
            match self.run_attempt(id, &record.url, attempt).await {
                Ok(summary_degraded) => {
                    info!(attempt, summary_degraded, "audit completed");
                    return Ok(PipelineOutcome {
                        record_id: id.clone(),
                        status: AuditStatus::Completed,
                        attempts: attempt,
                        error: None,
                        summary_degraded,
                    });
                }
                Err(e) if policy.should_retry(attempt, &e) => {
                    warn!(
                        attempt,
                        max_attempts = policy.max_attempts,
                        delay_secs = policy.delay.as_secs(),
                        error = %e,
                        "audit attempt failed, retrying"
                    );
                    tokio::time::sleep(policy.delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!(attempt, error = %e, "audit failed");
                    let message = e.to_string();
                    self.records
                        .save(id, RecordPatch::failed(format!("Error: {message}")))
                        .await?;
                    return Ok(PipelineOutcome {
                        record_id: id.clone(),
                        status: AuditStatus::Failed,
                        attempts: attempt,
                        error: Some(message),
                        summary_degraded: false,
                    });
                }
            }
        }
    }

    /// One pass over steps 2-6. Returns whether the summary was degraded.
    async fn run_attempt(&self, id: &RecordId, url: &str, attempt: u32) -> PipelineResult<bool> {
        let workspace = TransientArtifacts::create(&self.options.work_dir, id, attempt)?;

        let capture = self.stages.capture.capture(url, workspace.path()).await?;
        let screenshot = self.artifacts.store(id, &capture.image).await?;
        self.records
            .save(id, RecordPatch::screenshot(screenshot.clone()))
            .await?;
        info!(screenshot = %screenshot.short(), engine = %capture.engine, "screenshot stored");

        let audit = self
            .stages
            .auditor
            .audit(url, &capture.engine, workspace.path())
            .await?;
        self.records
            .save(
                id,
                RecordPatch::audit(audit.performance_score, audit.raw.clone()),
            )
            .await?;
        info!(performance_score = audit.performance_score, "audit stored");

        let findings = extract_findings(&audit.report);
        let prompt = build_prompt(url, &findings);
        let (summary, degraded) = self.summarize(&prompt).await;

        self.records
            .save(id, RecordPatch::completed(summary.to_json()?))
            .await?;
        Ok(degraded)
    }

    /// Summarize with a timeout. Never fails: errors become a fallback.
    async fn summarize(&self, prompt: &str) -> (AuditSummary, bool) {
        let limit = self.options.summary_timeout;
        let result = match tokio::time::timeout(limit, self.stages.summarizer.summarize(prompt))
            .await
        {
            Ok(response) => response.and_then(|text| parse_summary(&text)),
            Err(_) => Err(StageError::SummarizationFailed {
                reason: format!("timed out after {limit:?}"),
            }),
        };

        match result {
            Ok(summary) => (summary, false),
            Err(StageError::SummarizerNotConfigured) => {
                warn!("summarizer not configured, storing placeholder summary");
                (AuditSummary::not_configured(), true)
            }
            Err(e) => {
                warn!(error = %e, "summarization failed, storing fallback summary");
                let reason = match e {
                    StageError::SummarizationFailed { reason } => reason,
                    other => other.to_string(),
                };
                (AuditSummary::unavailable(reason), true)
            }
        }
    }
}
