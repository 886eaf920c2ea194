//! Error types for the audit pipeline.

use std::path::PathBuf;

use sightline_state::StorageError;

use crate::stage::StageKind;

/// What the orchestrator does with a stage failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorDisposition {
    /// Abort the attempt and let the retry policy decide.
    Retry,
    /// Degrade in place and keep going.
    Absorb,
}

/// Uniform failure type returned by every stage invoker.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error("screenshot capture failed: {reason}")]
    CaptureFailed { reason: String },

    #[error("Lighthouse audit timed out after {limit_secs} seconds")]
    AuditTimeout { limit_secs: u64 },

    #[error("Lighthouse command failed with exit code {exit_code}{}", format_output(.stdout, .stderr))]
    AuditToolFailure {
        exit_code: i32,
        stdout: String,
        stderr: String,
    },

    #[error("Lighthouse report unusable: {reason}")]
    AuditMalformedOutput { reason: String },

    #[error("summarization failed: {reason}")]
    SummarizationFailed { reason: String },

    #[error("summarization is not configured (no API key)")]
    SummarizerNotConfigured,
}

fn format_output(stdout: &str, stderr: &str) -> String {
    let mut out = String::new();
    if !stderr.trim().is_empty() {
        out.push_str("\nStderr: ");
        out.push_str(stderr.trim());
    }
    if !stdout.trim().is_empty() {
        out.push_str("\nStdout: ");
        out.push_str(stdout.trim());
    }
    out
}

impl StageError {
    /// Stage that produced this error.
    pub fn stage(&self) -> StageKind {
        match self {
            StageError::CaptureFailed { .. } => StageKind::Capture,
            StageError::AuditTimeout { .. }
            | StageError::AuditToolFailure { .. }
            | StageError::AuditMalformedOutput { .. } => StageKind::Audit,
            StageError::SummarizationFailed { .. } | StageError::SummarizerNotConfigured => {
                StageKind::Summarize
            }
        }
    }

    /// Capture and audit failures abort the attempt; summary failures never do.
    pub fn disposition(&self) -> ErrorDisposition {
        match self.stage() {
            StageKind::Capture | StageKind::Audit => ErrorDisposition::Retry,
            StageKind::Summarize => ErrorDisposition::Absorb,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, StageError::AuditTimeout { .. })
    }
}

/// Errors surfaced by the orchestrator, the queue and the submission service.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Stage(#[from] StageError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("audit record {id} is already {status}; create a new record to re-audit")]
    AlreadyTerminal { id: String, status: String },

    #[error("could not prepare workspace {}: {source}", .path.display())]
    Workspace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("summary serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid audit URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("audit queue is closed")]
    QueueClosed,
}

impl PipelineError {
    /// The underlying stage error, if any.
    pub fn stage_error(&self) -> Option<&StageError> {
        match self {
            PipelineError::Stage(e) => Some(e),
            _ => None,
        }
    }

    /// Whether another attempt could succeed.
    ///
    /// Capture and audit failures and transient storage errors qualify;
    /// record invariant violations and configuration problems do not.
    pub fn is_retryable(&self) -> bool {
        match self {
            PipelineError::Stage(e) => e.disposition() == ErrorDisposition::Retry,
            PipelineError::Storage(e) => e.is_transient(),
            PipelineError::Workspace { .. } => true,
            PipelineError::AlreadyTerminal { .. }
            | PipelineError::Serialization(_)
            | PipelineError::InvalidUrl { .. }
            | PipelineError::QueueClosed => false,
        }
    }
}

/// Result type for pipeline operations.
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
