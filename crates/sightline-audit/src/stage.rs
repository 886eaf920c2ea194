//! Stage definitions: the three external capabilities the pipeline drives.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::capture::ChromeCapture;
use crate::config::SightlineConfig;
use crate::error::StageError;
use crate::findings::LighthouseReport;
use crate::lighthouse::LighthouseTool;
use crate::summarizer::GeminiSummarizer;

/// The pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// Headless browser screenshot of the viewport
    Capture,

    /// Lighthouse performance audit
    Audit,

    /// AI summary of the audit findings
    Summarize,
}

impl StageKind {
    /// Get the stage name as a string.
    pub fn name(&self) -> &'static str {
        match self {
            StageKind::Capture => "capture",
            StageKind::Audit => "audit",
            StageKind::Summarize => "summarize",
        }
    }
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Browser executable used for the capture; handed to the audit tool so
/// both stages run the same engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineRef(pub PathBuf);

impl EngineRef {
    pub fn path(&self) -> &Path {
        &self.0
    }
}

impl std::fmt::Display for EngineRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// Output of the capture stage.
#[derive(Debug, Clone)]
pub struct Capture {
    /// PNG bytes of the visible viewport
    pub image: Vec<u8>,
    /// Browser that rendered the page
    pub engine: EngineRef,
}

/// Output of the audit stage.
#[derive(Debug, Clone)]
pub struct AuditReport {
    /// The report exactly as the tool wrote it
    pub raw: serde_json::Value,
    /// Typed view used for findings extraction
    pub report: LighthouseReport,
    /// Performance category score scaled to 0-100
    pub performance_score: u8,
}

/// Screenshot capture capability.
#[async_trait]
pub trait ScreenshotCapture: Send + Sync {
    /// Capture the above-the-fold viewport of `url`.
    ///
    /// Transient files are written under `workspace`, which the caller owns.
    async fn capture(&self, url: &str, workspace: &Path) -> Result<Capture, StageError>;
}

/// Performance audit capability.
#[async_trait]
pub trait AuditTool: Send + Sync {
    /// Audit `url` using the browser from the capture stage.
    async fn audit(
        &self,
        url: &str,
        engine: &EngineRef,
        workspace: &Path,
    ) -> Result<AuditReport, StageError>;
}

/// Text summarization capability.
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Send `prompt` and return the raw response text.
    async fn summarize(&self, prompt: &str) -> Result<String, StageError>;
}

/// The three stage invokers the pipeline is constructed with.
#[derive(Clone)]
pub struct StageSet {
    pub capture: Arc<dyn ScreenshotCapture>,
    pub auditor: Arc<dyn AuditTool>,
    pub summarizer: Arc<dyn Summarizer>,
}

impl StageSet {
    pub fn new(
        capture: Arc<dyn ScreenshotCapture>,
        auditor: Arc<dyn AuditTool>,
        summarizer: Arc<dyn Summarizer>,
    ) -> Self {
        Self {
            capture,
            auditor,
            summarizer,
        }
    }

    /// Production stages: headless Chromium, the Lighthouse CLI and Gemini.
    pub fn from_config(config: &SightlineConfig) -> Result<Self, StageError> {
        Ok(Self {
            capture: Arc::new(ChromeCapture::new(config.capture.clone())?),
            auditor: Arc::new(LighthouseTool::new(config.audit.clone())),
            summarizer: Arc::new(GeminiSummarizer::new(config.summarizer.clone())?),
        })
    }
}
