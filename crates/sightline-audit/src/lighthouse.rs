//! Lighthouse CLI invoker.

use std::path::Path;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::config::AuditToolConfig;
use crate::error::StageError;
use crate::findings::LighthouseReport;
use crate::process::{run_with_timeout, ProcessError};
use crate::stage::{AuditReport, AuditTool, EngineRef};

const REPORT_FILE: &str = "report.json";

/// Runs the Lighthouse CLI as a subprocess and reads back its JSON report.
pub struct LighthouseTool {
    config: AuditToolConfig,
}

impl LighthouseTool {
    pub fn new(config: AuditToolConfig) -> Self {
        Self { config }
    }

    fn command_line(&self, url: &str, report_path: &Path) -> Vec<String> {
        let mut command = self.config.command.clone();
        command.extend([
            url.to_string(),
            "--output=json".to_string(),
            format!("--output-path={}", report_path.display()),
            "--quiet".to_string(),
            format!("--chrome-flags={}", self.config.chrome_flags),
        ]);
        command
    }
}

#[async_trait]
impl AuditTool for LighthouseTool {
    async fn audit(
        &self,
        url: &str,
        engine: &EngineRef,
        workspace: &Path,
    ) -> Result<AuditReport, StageError> {
        let report_path = workspace.join(REPORT_FILE);
        let command = self.command_line(url, &report_path);
        let engine_path = engine.path().to_string_lossy().into_owned();

        debug!(url, engine = %engine, "running lighthouse");
        let output = run_with_timeout(
            &command,
            &[("CHROME_PATH", engine_path.as_str())],
            self.config.timeout,
        )
        .await
        .map_err(|e| match e {
            ProcessError::TimedOut { limit, .. } => StageError::AuditTimeout {
                limit_secs: limit.as_secs(),
            },
            other => StageError::AuditToolFailure {
                exit_code: -1,
                stdout: String::new(),
                stderr: other.to_string(),
            },
        })?;

        if !output.success {
            return Err(StageError::AuditToolFailure {
                exit_code: output.exit_code,
                stdout: output.stdout,
                stderr: output.stderr,
            });
        }

        let text = tokio::fs::read_to_string(&report_path)
            .await
            .map_err(|e| StageError::AuditMalformedOutput {
                reason: format!("report file {} unreadable: {e}", report_path.display()),
            })?;
        let raw: serde_json::Value =
            serde_json::from_str(&text).map_err(|e| StageError::AuditMalformedOutput {
                reason: format!("report is not valid JSON: {e}"),
            })?;
        let report = LighthouseReport::from_value(&raw)?;
        let performance_score = report.performance_score()?;

        info!(
            url,
            performance_score,
            duration_ms = output.duration_ms,
            "lighthouse audit finished"
        );
        Ok(AuditReport {
            raw,
            report,
            performance_score,
        })
    }
}
