//! Pipeline configuration.
//!
//! `Default` gives fixed values suitable for tests; `from_env` overlays the
//! `SIGHTLINE_*` and `GEMINI_*` environment variables on top of them.

use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

use crate::retry::RetryPolicy;

/// Screenshot stage settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureConfig {
    /// Browser command line prefix. Empty means discover a Chromium on `PATH`.
    pub command: Vec<String>,
    pub viewport_width: u32,
    pub viewport_height: u32,
    /// Upper bound on navigation plus capture.
    pub load_timeout: Duration,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            viewport_width: 1280,
            viewport_height: 800,
            load_timeout: Duration::from_secs(60),
        }
    }
}

/// Audit stage settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditToolConfig {
    /// Lighthouse command line prefix; the URL and flags are appended.
    pub command: Vec<String>,
    /// Hard wall-clock limit on the subprocess.
    pub timeout: Duration,
    /// Passed to the tool as `--chrome-flags=<value>`.
    pub chrome_flags: String,
}

impl Default for AuditToolConfig {
    fn default() -> Self {
        Self {
            command: vec!["lighthouse".to_string()],
            timeout: Duration::from_secs(120),
            chrome_flags: "--headless --no-sandbox --disable-gpu".to_string(),
        }
    }
}

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Summarization service settings.
#[derive(Clone, PartialEq, Eq)]
pub struct SummarizerConfig {
    /// API credential; `None` degrades every summary to the "not configured" fallback.
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_GEMINI_MODEL.to_string(),
            base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            timeout: Duration::from_secs(60),
        }
    }
}

impl std::fmt::Debug for SummarizerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SummarizerConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Complete configuration for the stages and the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SightlineConfig {
    pub capture: CaptureConfig,
    pub audit: AuditToolConfig,
    pub summarizer: SummarizerConfig,
    pub retry: RetryPolicy,
    /// Parent directory for per-attempt transient workspaces.
    pub work_dir: PathBuf,
}

impl Default for SightlineConfig {
    fn default() -> Self {
        Self {
            capture: CaptureConfig::default(),
            audit: AuditToolConfig::default(),
            summarizer: SummarizerConfig::default(),
            retry: RetryPolicy::default(),
            work_dir: std::env::temp_dir().join("sightline"),
        }
    }
}

impl SightlineConfig {
    /// Build a config from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(chrome) = env_string("SIGHTLINE_CHROME_PATH") {
            config.capture.command = vec![chrome];
        }
        if let Some(secs) = env_secs("SIGHTLINE_CAPTURE_TIMEOUT_SECS") {
            config.capture.load_timeout = secs;
        }
        if let Some(bin) = env_string("SIGHTLINE_LIGHTHOUSE_BIN") {
            config.audit.command = vec![bin];
        }
        if let Some(secs) = env_secs("SIGHTLINE_AUDIT_TIMEOUT_SECS") {
            config.audit.timeout = secs;
        }

        config.summarizer.api_key = env_string("GEMINI_API_KEY");
        if let Some(model) = env_string("GEMINI_MODEL") {
            config.summarizer.model = model;
        }
        if let Some(base_url) = env_string("GEMINI_BASE_URL") {
            config.summarizer.base_url = base_url;
        }
        if let Some(secs) = env_secs("SIGHTLINE_SUMMARY_TIMEOUT_SECS") {
            config.summarizer.timeout = secs;
        }

        if let Some(attempts) = env_parse::<u32>("SIGHTLINE_MAX_ATTEMPTS") {
            config.retry.max_attempts = attempts.max(1);
        }
        if let Some(delay) = env_secs("SIGHTLINE_RETRY_DELAY_SECS") {
            config.retry.delay = delay;
        }
        if let Some(dir) = env_string("SIGHTLINE_WORK_DIR") {
            config.work_dir = PathBuf::from(dir);
        }

        config
    }

    /// Set the Gemini API key.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.summarizer.api_key = Some(key.into());
        self
    }

    /// Set the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the transient workspace root.
    pub fn with_work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = dir.into();
        self
    }

    /// Set the browser command.
    pub fn with_chrome_command(mut self, command: Vec<String>) -> Self {
        self.capture.command = command;
        self
    }

    /// Set the Lighthouse command.
    pub fn with_lighthouse_command(mut self, command: Vec<String>) -> Self {
        self.audit.command = command;
        self
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = env_string(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "ignoring unparseable environment value");
            None
        }
    }
}

fn env_secs(key: &str) -> Option<Duration> {
    env_parse::<u64>(key).map(Duration::from_secs)
}
