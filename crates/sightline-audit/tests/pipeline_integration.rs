//! Integration tests for the audit pipeline with in-memory stores and fake stages.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use sightline_audit::prompt::NO_ISSUES_STATEMENT;
use sightline_audit::{
    AuditPipeline, AuditQueue, AuditReport, AuditService, AuditSummary, AuditTool, Capture,
    EngineRef, LighthouseReport, PipelineError, PipelineOptions, RetryPolicy, ScreenshotCapture,
    StageError, StageSet, Summarizer,
};
use sightline_state::fakes::{MemoryArtifactStore, MemoryRecordStore};
use sightline_state::{ArtifactRef, ArtifactStore, AuditRecord, AuditStatus, RecordStore};
use tempfile::TempDir;

const PNG: &[u8] = b"\x89PNG fake viewport";

const SUMMARY_JSON: &str = r#"```json
{"overall_assessment":"Render-blocking resources slow the first paint.",
 "issues":[{"title":"Eliminate render-blocking resources","explanation":"Two stylesheets block rendering.",
 "impact":"Delays first paint.","suggestion":"Inline critical CSS.","severity":"High"}]}
```"#;

// ===========================================================================
// Fake stages
// ===========================================================================

struct FakeCapture {
    calls: AtomicU32,
    /// Number of leading calls that fail.
    failures: u32,
    workspaces: Mutex<Vec<PathBuf>>,
}

impl FakeCapture {
    fn new(failures: u32) -> Self {
        Self {
            calls: AtomicU32::new(0),
            failures,
            workspaces: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ScreenshotCapture for FakeCapture {
    async fn capture(&self, _url: &str, workspace: &Path) -> Result<Capture, StageError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.workspaces
            .lock()
            .unwrap()
            .push(workspace.to_path_buf());
        if call <= self.failures {
            return Err(StageError::CaptureFailed {
                reason: "net::ERR_NAME_NOT_RESOLVED".to_string(),
            });
        }
        std::fs::write(workspace.join("screenshot.png"), PNG).unwrap();
        Ok(Capture {
            image: PNG.to_vec(),
            engine: EngineRef(PathBuf::from("/opt/chromium/chrome")),
        })
    }
}

enum AuditBehaviour {
    Report(serde_json::Value),
    Fail,
    Timeout,
}

struct FakeAuditor {
    calls: AtomicU32,
    behaviour: AuditBehaviour,
    engines: Mutex<Vec<EngineRef>>,
}

impl FakeAuditor {
    fn new(behaviour: AuditBehaviour) -> Self {
        Self {
            calls: AtomicU32::new(0),
            behaviour,
            engines: Mutex::new(Vec::new()),
        }
    }

    fn with_failing_audits() -> Self {
        Self::new(AuditBehaviour::Report(json!({
            "categories": {"performance": {"score": 0.73}},
            "audits": {
                "render-blocking-resources": {"title": "Eliminate render-blocking resources", "score": 0.2, "displayValue": "Potential savings of 900 ms"},
                "unused-javascript": {"title": "Reduce unused JavaScript", "score": 0.5, "displayValue": "Potential savings of 120 KiB"},
                "server-response-time": {"title": "Initial server response time was short", "score": 1.0}
            }
        })))
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuditTool for FakeAuditor {
    async fn audit(
        &self,
        _url: &str,
        engine: &EngineRef,
        _workspace: &Path,
    ) -> Result<AuditReport, StageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.engines.lock().unwrap().push(engine.clone());
        match &self.behaviour {
            AuditBehaviour::Report(raw) => {
                let report = LighthouseReport::from_value(raw)?;
                let performance_score = report.performance_score()?;
                Ok(AuditReport {
                    raw: raw.clone(),
                    report,
                    performance_score,
                })
            }
            AuditBehaviour::Fail => Err(StageError::AuditToolFailure {
                exit_code: 1,
                stdout: String::new(),
                stderr: "Chrome could not be reached".to_string(),
            }),
            AuditBehaviour::Timeout => Err(StageError::AuditTimeout { limit_secs: 120 }),
        }
    }
}

enum SummaryBehaviour {
    Respond(&'static str),
    NotConfigured,
    Fail,
    Hang,
}

struct FakeSummarizer {
    behaviour: SummaryBehaviour,
    prompts: Mutex<Vec<String>>,
}

impl FakeSummarizer {
    fn new(behaviour: SummaryBehaviour) -> Self {
        Self {
            behaviour,
            prompts: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Summarizer for FakeSummarizer {
    async fn summarize(&self, prompt: &str) -> Result<String, StageError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        match self.behaviour {
            SummaryBehaviour::Respond(text) => Ok(text.to_string()),
            SummaryBehaviour::NotConfigured => Err(StageError::SummarizerNotConfigured),
            SummaryBehaviour::Fail => Err(StageError::SummarizationFailed {
                reason: "HTTP 503: model overloaded".to_string(),
            }),
            SummaryBehaviour::Hang => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(String::new())
            }
        }
    }
}

// ===========================================================================
// Harness
// ===========================================================================

struct Harness {
    records: Arc<MemoryRecordStore>,
    artifacts: Arc<MemoryArtifactStore>,
    capture: Arc<FakeCapture>,
    auditor: Arc<FakeAuditor>,
    summarizer: Arc<FakeSummarizer>,
    pipeline: Arc<AuditPipeline>,
    work_dir: TempDir,
}

fn harness(
    capture: FakeCapture,
    auditor: FakeAuditor,
    summarizer: FakeSummarizer,
    retry: RetryPolicy,
) -> Harness {
    let records = Arc::new(MemoryRecordStore::new());
    let artifacts = Arc::new(MemoryArtifactStore::new());
    let capture = Arc::new(capture);
    let auditor = Arc::new(auditor);
    let summarizer = Arc::new(summarizer);
    let work_dir = TempDir::new().unwrap();

    let pipeline = AuditPipeline::new(
        records.clone(),
        artifacts.clone(),
        StageSet::new(capture.clone(), auditor.clone(), summarizer.clone()),
        PipelineOptions {
            retry,
            summary_timeout: Duration::from_millis(200),
            work_dir: work_dir.path().to_path_buf(),
        },
    );

    Harness {
        records,
        artifacts,
        capture,
        auditor,
        summarizer,
        pipeline: Arc::new(pipeline),
        work_dir,
    }
}

fn happy_harness(summary: SummaryBehaviour) -> Harness {
    harness(
        FakeCapture::new(0),
        FakeAuditor::with_failing_audits(),
        FakeSummarizer::new(summary),
        RetryPolicy::new(4, Duration::ZERO),
    )
}

fn stored_summary(record: &AuditRecord) -> AuditSummary {
    serde_json::from_str(record.summary.as_deref().unwrap()).unwrap()
}

// ===========================================================================
// Successful runs
// ===========================================================================

#[tokio::test]
async fn completed_run_persists_checkpoints_in_order() {
    let h = happy_harness(SummaryBehaviour::Respond(SUMMARY_JSON));
    let record = h.records.create("https://example.com/").await.unwrap();

    let outcome = h.pipeline.run(&record.id).await.unwrap();
    assert!(outcome.completed());
    assert_eq!(outcome.attempts, 1);
    assert!(!outcome.summary_degraded);
    assert!(outcome.error.is_none());

    let patches = h.records.patches(&record.id);
    assert_eq!(patches.len(), 4);
    assert_eq!(patches[0].status, Some(AuditStatus::Processing));
    assert!(patches[1].screenshot_ref.is_some() && patches[1].status.is_none());
    assert!(patches[2].audit.is_some() && patches[2].status.is_none());
    assert_eq!(patches[3].status, Some(AuditStatus::Completed));
    assert!(patches[3].summary.is_some());

    let done = h.records.get(&record.id).await.unwrap();
    assert_eq!(done.status, AuditStatus::Completed);
    assert_eq!(done.performance_score, Some(73));
    assert!(done.audit_report.is_some());
    assert_eq!(done.screenshot_ref, Some(ArtifactRef::from_bytes(PNG)));
    assert_eq!(
        h.artifacts.load(&ArtifactRef::from_bytes(PNG)).await.unwrap(),
        PNG
    );

    let summary = stored_summary(&done);
    assert_eq!(
        summary.overall_assessment,
        "Render-blocking resources slow the first paint."
    );
    assert_eq!(summary.issues.len(), 1);
}

#[tokio::test]
async fn capture_engine_is_handed_to_auditor() {
    let h = happy_harness(SummaryBehaviour::Respond(SUMMARY_JSON));
    let record = h.records.create("https://example.com/").await.unwrap();
    h.pipeline.run(&record.id).await.unwrap();

    let engines = h.auditor.engines.lock().unwrap().clone();
    assert_eq!(engines, vec![EngineRef(PathBuf::from("/opt/chromium/chrome"))]);
}

#[tokio::test]
async fn prompt_lists_failing_audits_worst_first() {
    let h = happy_harness(SummaryBehaviour::Respond(SUMMARY_JSON));
    let record = h.records.create("https://example.com/").await.unwrap();
    h.pipeline.run(&record.id).await.unwrap();

    let prompts = h.summarizer.prompts.lock().unwrap().clone();
    assert_eq!(prompts.len(), 1);
    let prompt = &prompts[0];
    assert!(prompt.contains("https://example.com/"));
    let worst = prompt
        .find("- Eliminate render-blocking resources (Value: Potential savings of 900 ms)")
        .unwrap();
    let next = prompt.find("- Reduce unused JavaScript").unwrap();
    assert!(worst < next);
    assert!(!prompt.contains("Initial server response time"));
}

#[tokio::test]
async fn passing_report_prompts_no_major_issues() {
    let h = harness(
        FakeCapture::new(0),
        FakeAuditor::new(AuditBehaviour::Report(json!({
            "categories": {"performance": {"score": 0.98}},
            "audits": {"speed-index": {"title": "Speed Index", "score": 0.97, "displayValue": "1.1 s"}}
        }))),
        FakeSummarizer::new(SummaryBehaviour::Respond(SUMMARY_JSON)),
        RetryPolicy::no_retry(),
    );
    let record = h.records.create("https://fast.example/").await.unwrap();
    h.pipeline.run(&record.id).await.unwrap();

    let prompts = h.summarizer.prompts.lock().unwrap().clone();
    assert!(prompts[0].contains(NO_ISSUES_STATEMENT));
    assert_eq!(
        h.records.get(&record.id).await.unwrap().performance_score,
        Some(98)
    );
}

// ===========================================================================
// Degraded summaries
// ===========================================================================

#[tokio::test]
async fn missing_credential_still_completes() {
    let h = happy_harness(SummaryBehaviour::NotConfigured);
    let record = h.records.create("https://example.com/").await.unwrap();

    let outcome = h.pipeline.run(&record.id).await.unwrap();
    assert!(outcome.completed());
    assert!(outcome.summary_degraded);

    let done = h.records.get(&record.id).await.unwrap();
    assert_eq!(done.status, AuditStatus::Completed);
    assert_eq!(done.performance_score, Some(73));
    let summary = stored_summary(&done);
    assert!(summary.overall_assessment.contains("not configured"));
    assert!(summary.issues.is_empty());
}

#[tokio::test]
async fn summarizer_failure_is_absorbed() {
    let h = happy_harness(SummaryBehaviour::Fail);
    let record = h.records.create("https://example.com/").await.unwrap();

    let outcome = h.pipeline.run(&record.id).await.unwrap();
    assert!(outcome.completed());
    assert_eq!(outcome.attempts, 1);
    assert_eq!(h.capture.calls(), 1);

    let summary = stored_summary(&h.records.get(&record.id).await.unwrap());
    assert!(summary
        .overall_assessment
        .starts_with("AI summary unavailable due to error"));
    assert!(summary.overall_assessment.contains("503"));
    assert!(summary.issues.is_empty());
}

#[tokio::test]
async fn unparseable_summary_is_absorbed() {
    let h = happy_harness(SummaryBehaviour::Respond("The page is fine, really."));
    let record = h.records.create("https://example.com/").await.unwrap();

    let outcome = h.pipeline.run(&record.id).await.unwrap();
    assert!(outcome.completed());
    assert!(outcome.summary_degraded);
    let summary = stored_summary(&h.records.get(&record.id).await.unwrap());
    assert!(summary.overall_assessment.contains("unavailable"));
}

#[tokio::test]
async fn slow_summarizer_is_timed_out() {
    let h = happy_harness(SummaryBehaviour::Hang);
    let record = h.records.create("https://example.com/").await.unwrap();

    let outcome = h.pipeline.run(&record.id).await.unwrap();
    assert!(outcome.completed());
    let summary = stored_summary(&h.records.get(&record.id).await.unwrap());
    assert!(summary.overall_assessment.contains("timed out"));
}

// ===========================================================================
// Retries and terminal failure
// ===========================================================================

#[tokio::test]
async fn always_failing_capture_makes_exactly_max_attempts() {
    let h = harness(
        FakeCapture::new(u32::MAX),
        FakeAuditor::with_failing_audits(),
        FakeSummarizer::new(SummaryBehaviour::Respond(SUMMARY_JSON)),
        RetryPolicy::new(3, Duration::ZERO),
    );
    let record = h.records.create("https://unreachable.example/").await.unwrap();

    let outcome = h.pipeline.run(&record.id).await.unwrap();
    assert_eq!(outcome.status, AuditStatus::Failed);
    assert_eq!(outcome.attempts, 3);
    assert_eq!(h.capture.calls(), 3);
    assert_eq!(h.auditor.calls(), 0);
    assert!(outcome.error.unwrap().contains("ERR_NAME_NOT_RESOLVED"));

    let failed = h.records.get(&record.id).await.unwrap();
    assert_eq!(failed.status, AuditStatus::Failed);
    assert!(failed.performance_score.is_none());
    assert!(failed.audit_report.is_none());
    assert!(failed.screenshot_ref.is_none());
    assert!(failed
        .summary
        .unwrap()
        .starts_with("Error: screenshot capture failed"));

    // Processing once, Failed once; retries never re-transition.
    let statuses: Vec<_> = h
        .records
        .patches(&record.id)
        .into_iter()
        .filter_map(|p| p.status)
        .collect();
    assert_eq!(statuses, vec![AuditStatus::Processing, AuditStatus::Failed]);
}

#[tokio::test(start_paused = true)]
async fn attempts_are_spaced_by_the_retry_delay() {
    let h = harness(
        FakeCapture::new(u32::MAX),
        FakeAuditor::with_failing_audits(),
        FakeSummarizer::new(SummaryBehaviour::Respond(SUMMARY_JSON)),
        RetryPolicy::new(3, Duration::from_secs(30)),
    );
    let record = h.records.create("https://unreachable.example/").await.unwrap();

    let started = tokio::time::Instant::now();
    let outcome = h.pipeline.run(&record.id).await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(outcome.status, AuditStatus::Failed);
    assert_eq!(outcome.attempts, 3);
    assert_eq!(h.capture.calls(), 3);
    // Two waits between three attempts, none after the last one.
    assert!(elapsed >= Duration::from_secs(60), "{elapsed:?}");
    assert!(elapsed < Duration::from_secs(90), "{elapsed:?}");
}

#[tokio::test]
async fn transient_capture_failure_recovers() {
    let h = harness(
        FakeCapture::new(2),
        FakeAuditor::with_failing_audits(),
        FakeSummarizer::new(SummaryBehaviour::Respond(SUMMARY_JSON)),
        RetryPolicy::new(4, Duration::ZERO),
    );
    let record = h.records.create("https://flaky.example/").await.unwrap();

    let outcome = h.pipeline.run(&record.id).await.unwrap();
    assert!(outcome.completed());
    assert_eq!(outcome.attempts, 3);
    assert_eq!(h.capture.calls(), 3);
    assert_eq!(h.auditor.calls(), 1);
}

#[tokio::test]
async fn audit_failure_keeps_screenshot_but_no_score() {
    let h = harness(
        FakeCapture::new(0),
        FakeAuditor::new(AuditBehaviour::Fail),
        FakeSummarizer::new(SummaryBehaviour::Respond(SUMMARY_JSON)),
        RetryPolicy::new(2, Duration::ZERO),
    );
    let record = h.records.create("https://example.com/").await.unwrap();

    let outcome = h.pipeline.run(&record.id).await.unwrap();
    assert_eq!(outcome.status, AuditStatus::Failed);
    assert_eq!(h.auditor.calls(), 2);

    let failed = h.records.get(&record.id).await.unwrap();
    assert!(failed.screenshot_ref.is_some());
    assert!(failed.performance_score.is_none());
    assert!(failed.audit_report.is_none());
    let message = failed.summary.unwrap();
    assert!(message.starts_with("Error: Lighthouse command failed with exit code 1"));
    assert!(message.contains("Chrome could not be reached"));
    assert!(h.summarizer.prompts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn audit_timeout_not_retried_when_disabled() {
    let h = harness(
        FakeCapture::new(0),
        FakeAuditor::new(AuditBehaviour::Timeout),
        FakeSummarizer::new(SummaryBehaviour::Respond(SUMMARY_JSON)),
        RetryPolicy::new(4, Duration::ZERO).with_retry_on_timeout(false),
    );
    let record = h.records.create("https://slow.example/").await.unwrap();

    let outcome = h.pipeline.run(&record.id).await.unwrap();
    assert_eq!(outcome.status, AuditStatus::Failed);
    assert_eq!(outcome.attempts, 1);
    assert_eq!(
        h.records.get(&record.id).await.unwrap().summary.as_deref(),
        Some("Error: Lighthouse audit timed out after 120 seconds")
    );
}

#[tokio::test]
async fn malformed_report_fails_after_retries() {
    let h = harness(
        FakeCapture::new(0),
        FakeAuditor::new(AuditBehaviour::Report(json!({"audits": {}}))),
        FakeSummarizer::new(SummaryBehaviour::Respond(SUMMARY_JSON)),
        RetryPolicy::new(2, Duration::ZERO),
    );
    let record = h.records.create("https://example.com/").await.unwrap();

    let outcome = h.pipeline.run(&record.id).await.unwrap();
    assert_eq!(outcome.status, AuditStatus::Failed);
    assert_eq!(outcome.attempts, 2);
}

// ===========================================================================
// Workspace hygiene and entry states
// ===========================================================================

#[tokio::test]
async fn attempt_workspaces_are_removed() {
    let h = harness(
        FakeCapture::new(1),
        FakeAuditor::with_failing_audits(),
        FakeSummarizer::new(SummaryBehaviour::Respond(SUMMARY_JSON)),
        RetryPolicy::new(3, Duration::ZERO),
    );
    let record = h.records.create("https://example.com/").await.unwrap();
    h.pipeline.run(&record.id).await.unwrap();

    let seen = h.capture.workspaces.lock().unwrap().clone();
    assert_eq!(seen.len(), 2);
    assert_ne!(seen[0], seen[1]);
    assert!(seen[0].ends_with(format!("{}-attempt1", record.id)));
    for path in &seen {
        assert!(!path.exists(), "{} left behind", path.display());
    }
    assert_eq!(std::fs::read_dir(h.work_dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn terminal_record_is_not_rerun() {
    let h = happy_harness(SummaryBehaviour::Respond(SUMMARY_JSON));
    let record = h.records.create("https://example.com/").await.unwrap();
    h.pipeline.run(&record.id).await.unwrap();
    let before = h.records.patches(&record.id).len();

    let err = h.pipeline.run(&record.id).await.unwrap_err();
    assert!(matches!(err, PipelineError::AlreadyTerminal { .. }));
    assert_eq!(h.records.patches(&record.id).len(), before);
    assert_eq!(h.capture.calls(), 1);
}

#[tokio::test]
async fn processing_record_is_resumed_without_retransition() {
    let h = happy_harness(SummaryBehaviour::Respond(SUMMARY_JSON));
    let mut record = AuditRecord::new("https://example.com/");
    record.status = AuditStatus::Processing;
    h.records.insert(record.clone());

    let outcome = h.pipeline.run(&record.id).await.unwrap();
    assert!(outcome.completed());
    let patches = h.records.patches(&record.id);
    assert_eq!(patches.len(), 3);
    assert!(patches[0].screenshot_ref.is_some());
}

#[tokio::test]
async fn unknown_record_is_an_error() {
    let h = happy_harness(SummaryBehaviour::Respond(SUMMARY_JSON));
    let err = h
        .pipeline
        .run(&sightline_state::RecordId::new())
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Storage(_)));
    assert_eq!(h.capture.calls(), 0);
}

// ===========================================================================
// Queue and submission
// ===========================================================================

#[tokio::test]
async fn submitted_audits_run_to_completion() {
    let h = happy_harness(SummaryBehaviour::NotConfigured);
    let queue = AuditQueue::start(h.pipeline.clone(), 2);
    let service = AuditService::new(h.records.clone(), queue);

    let mut ids = Vec::new();
    for url in ["https://a.example/", "https://b.example/", "https://c.example/"] {
        let record = service.submit(url).await.unwrap();
        assert_eq!(record.status, AuditStatus::Pending);
        ids.push(record.id);
    }
    service.shutdown().await;

    for id in &ids {
        let record = h.records.get(id).await.unwrap();
        assert_eq!(record.status, AuditStatus::Completed, "{id}");
    }
    assert_eq!(h.capture.calls(), 3);
}

#[tokio::test]
async fn invalid_url_is_rejected_before_creation() {
    let h = happy_harness(SummaryBehaviour::NotConfigured);
    let queue = AuditQueue::start(h.pipeline.clone(), 1);
    let service = AuditService::new(h.records.clone(), queue);

    let err = service.submit("ftp://example.com/file").await.unwrap_err();
    assert!(matches!(err, PipelineError::InvalidUrl { .. }));
    service.shutdown().await;

    assert!(h.records.list(10).await.unwrap().is_empty());
    assert_eq!(h.capture.calls(), 0);
}

#[tokio::test]
async fn queue_tolerates_already_finished_records() {
    let h = happy_harness(SummaryBehaviour::NotConfigured);
    let record = h.records.create("https://example.com/").await.unwrap();
    h.pipeline.run(&record.id).await.unwrap();

    let queue = AuditQueue::start(h.pipeline.clone(), 1);
    queue.enqueue(record.id.clone()).unwrap();
    queue.shutdown().await;

    assert_eq!(h.capture.calls(), 1);
    assert_eq!(
        h.records.get(&record.id).await.unwrap().status,
        AuditStatus::Completed
    );
}
