//! Headless Chromium screenshot capture.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::config::CaptureConfig;
use crate::error::StageError;
use crate::process::{run_with_timeout, ProcessError};
use crate::stage::{Capture, EngineRef, ScreenshotCapture};

/// Browser executables looked up on `PATH`, in order.
const BROWSER_CANDIDATES: &[&str] = &["chromium", "chromium-browser", "google-chrome", "chrome"];

const SCREENSHOT_FILE: &str = "screenshot.png";

/// Launches one isolated headless browser per capture.
pub struct ChromeCapture {
    config: CaptureConfig,
    client: reqwest::Client,
}

impl ChromeCapture {
    pub fn new(config: CaptureConfig) -> Result<Self, StageError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("sightline/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| StageError::CaptureFailed {
                reason: format!("failed to create HTTP client: {e}"),
            })?;
        Ok(Self { config, client })
    }

    /// Configured command, or the first known browser found on `PATH`.
    fn browser_command(&self) -> Result<Vec<String>, StageError> {
        if !self.config.command.is_empty() {
            return Ok(self.config.command.clone());
        }
        discover_browser()
            .map(|path| vec![path.to_string_lossy().into_owned()])
            .ok_or_else(|| StageError::CaptureFailed {
                reason: format!(
                    "no headless browser found on PATH (tried {})",
                    BROWSER_CANDIDATES.join(", ")
                ),
            })
    }

    fn browser_args(&self, url: &str, workspace: &Path, screenshot: &Path) -> Vec<String> {
        vec![
            "--headless=new".to_string(),
            "--no-sandbox".to_string(),
            "--disable-gpu".to_string(),
            "--hide-scrollbars".to_string(),
            "--no-first-run".to_string(),
            "--no-default-browser-check".to_string(),
            format!("--user-data-dir={}", workspace.join("chrome-profile").display()),
            format!(
                "--window-size={},{}",
                self.config.viewport_width, self.config.viewport_height
            ),
            format!("--screenshot={}", screenshot.display()),
            url.to_string(),
        ]
    }
}

fn discover_browser() -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    let dirs: Vec<PathBuf> = std::env::split_paths(&path).collect();
    BROWSER_CANDIDATES.iter().find_map(|name| {
        dirs.iter()
            .map(|dir| dir.join(name))
            .find(|candidate| candidate.is_file())
    })
}

/// Load the page once over HTTP before launching the browser.
///
/// Headless Chromium screenshots its own error page and still exits 0 when
/// navigation fails, so DNS, connection and TLS failures are caught here.
/// The response status is not checked; an error status still renders a page.
async fn ensure_reachable(client: &reqwest::Client, url: &str) -> Result<(), StageError> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| StageError::CaptureFailed {
            reason: format!("page could not be loaded: {}", error_chain(&e)),
        })?;
    debug!(url, status = %response.status(), "page reachable");
    Ok(())
}

/// Render an error with its sources, `outer: inner: root`.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(&format!(": {cause}"));
        source = cause.source();
    }
    message
}

#[async_trait]
impl ScreenshotCapture for ChromeCapture {
    async fn capture(&self, url: &str, workspace: &Path) -> Result<Capture, StageError> {
        let limit = self.config.load_timeout;
        let timed_out = || StageError::CaptureFailed {
            reason: format!("page load timed out after {}s", limit.as_secs()),
        };
        let deadline = Instant::now() + limit;

        tokio::time::timeout_at(deadline, ensure_reachable(&self.client, url))
            .await
            .map_err(|_| timed_out())??;

        let mut command = self.browser_command()?;
        let engine = EngineRef(PathBuf::from(&command[0]));
        let image_path = workspace.join(SCREENSHOT_FILE);
        command.extend(self.browser_args(url, workspace, &image_path));

        debug!(engine = %engine, url, "launching headless browser");
        let remaining = deadline.saturating_duration_since(Instant::now());
        let output = run_with_timeout(&command, &[], remaining)
            .await
            .map_err(|e| match e {
                ProcessError::TimedOut { .. } => timed_out(),
                other => StageError::CaptureFailed {
                    reason: other.to_string(),
                },
            })?;

        if !output.success {
            return Err(StageError::CaptureFailed {
                reason: format!(
                    "browser exited with code {}: {}",
                    output.exit_code,
                    output.stderr.trim()
                ),
            });
        }

        let image = tokio::fs::read(&image_path)
            .await
            .map_err(|e| StageError::CaptureFailed {
                reason: format!("screenshot was not written: {e}"),
            })?;
        if image.is_empty() {
            return Err(StageError::CaptureFailed {
                reason: "screenshot is empty".to_string(),
            });
        }

        info!(
            url,
            bytes = image.len(),
            duration_ms = output.duration_ms,
            "screenshot captured"
        );
        Ok(Capture { image, engine })
    }
}
