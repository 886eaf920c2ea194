//! Sightline Audit - the web page audit pipeline
//!
//! Given a URL held in an audit record, the pipeline:
//! - captures an above-the-fold screenshot with headless Chromium
//! - runs a Lighthouse performance audit against the same browser
//! - asks Gemini for a structured summary of the failing audits
//!
//! Progress is checkpointed into a [`sightline_state::RecordStore`] after
//! every stage, and failed attempts are retried under a [`RetryPolicy`].

pub mod capture;
pub mod config;
pub mod error;
pub mod findings;
pub mod lighthouse;
pub mod pipeline;
pub mod process;
pub mod prompt;
pub mod queue;
pub mod retry;
pub mod stage;
pub mod summarizer;
pub mod summary;
pub mod telemetry;
pub mod workspace;

// Re-export key types
pub use capture::ChromeCapture;
pub use config::{AuditToolConfig, CaptureConfig, SightlineConfig, SummarizerConfig};
pub use error::{ErrorDisposition, PipelineError, PipelineResult, StageError};
pub use findings::{extract_findings, Finding, LighthouseReport};
pub use lighthouse::LighthouseTool;
pub use pipeline::{AuditPipeline, PipelineOptions, PipelineOutcome};
pub use prompt::build_prompt;
pub use queue::{validate_url, AuditQueue, AuditService};
pub use retry::RetryPolicy;
pub use stage::{
    AuditReport, AuditTool, Capture, EngineRef, ScreenshotCapture, StageKind, StageSet, Summarizer,
};
pub use summarizer::GeminiSummarizer;
pub use summary::{parse_summary, AuditSummary, Severity, SummaryIssue};
pub use workspace::TransientArtifacts;
