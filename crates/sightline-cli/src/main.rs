//! Sightline - web page performance audits from the command line
//!
//! ## Commands
//!
//! - `audit`: submit one or more URLs and wait for their audits to finish
//! - `show`: print a stored audit record
//! - `list`: list recent audit records, newest first

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sightline_audit::{
    AuditPipeline, AuditQueue, AuditService, AuditSummary, PipelineOptions, SightlineConfig,
    StageSet,
};
use sightline_state::{
    ArtifactStore, AuditRecord, AuditStatus, FsArtifactStore, RecordId, RecordStore,
    SurrealRecordStore,
};
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "sightline")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Screenshot, Lighthouse audit and AI summary for web pages", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Audit one or more pages and wait for the results
    Audit {
        /// Absolute http(s) URLs to audit
        #[arg(required = true)]
        urls: Vec<String>,

        /// Number of concurrent audit workers
        #[arg(short, long, default_value = "1", env = "SIGHTLINE_WORKERS")]
        workers: usize,
    },

    /// Show a stored audit record
    Show {
        /// Record ID
        id: String,

        /// Print the full record as JSON
        #[arg(long)]
        raw: bool,

        /// Write the stored screenshot to this path
        #[arg(long)]
        screenshot_out: Option<PathBuf>,
    },

    /// List recent audit records
    List {
        /// Maximum number of records to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    sightline_audit::telemetry::init_tracing(cli.json, level);

    let records: Arc<dyn RecordStore> = Arc::new(
        SurrealRecordStore::from_env()
            .await
            .context("Failed to connect to the Sightline database")?,
    );
    let artifacts: Arc<dyn ArtifactStore> = Arc::new(
        FsArtifactStore::from_env().context("Failed to open the artifact directory")?,
    );

    match cli.command {
        Commands::Audit { urls, workers } => {
            let config = SightlineConfig::from_env();
            cmd_audit(records, artifacts, &config, &urls, workers).await
        }
        Commands::Show {
            id,
            raw,
            screenshot_out,
        } => {
            cmd_show(
                records.as_ref(),
                artifacts.as_ref(),
                &id,
                raw,
                screenshot_out.as_deref(),
            )
            .await
        }
        Commands::List { limit } => cmd_list(records.as_ref(), limit).await,
    }
}

/// Submit URLs, wait for the queue to drain, then print each record.
async fn cmd_audit(
    records: Arc<dyn RecordStore>,
    artifacts: Arc<dyn ArtifactStore>,
    config: &SightlineConfig,
    urls: &[String],
    workers: usize,
) -> Result<()> {
    let stages = StageSet::from_config(config).context("Failed to set up audit stages")?;
    if config.summarizer.api_key.is_none() {
        info!("GEMINI_API_KEY not set; summaries will be marked as not configured");
    }

    let pipeline = Arc::new(AuditPipeline::new(
        records.clone(),
        artifacts,
        stages,
        PipelineOptions::from_config(config),
    ));
    let service = AuditService::new(records.clone(), AuditQueue::start(pipeline, workers));

    let mut ids = Vec::new();
    for url in urls {
        let record = service
            .submit(url)
            .await
            .with_context(|| format!("Failed to submit {}", url))?;
        println!("Submitted {} as {}", record.url, record.id);
        ids.push(record.id);
    }
    service.shutdown().await;

    let mut failed = 0;
    for id in &ids {
        let record = records.get(id).await?;
        if record.status == AuditStatus::Failed {
            failed += 1;
        }
        println!();
        print!("{}", describe_record(&record));
    }

    if failed > 0 {
        anyhow::bail!("{} of {} audits failed", failed, ids.len());
    }
    Ok(())
}

/// Show a single record
async fn cmd_show(
    records: &dyn RecordStore,
    artifacts: &dyn ArtifactStore,
    id: &str,
    raw: bool,
    screenshot_out: Option<&Path>,
) -> Result<()> {
    let record = records
        .get(&RecordId::from(id))
        .await
        .with_context(|| format!("Failed to load audit record {}", id))?;

    if raw {
        println!("{}", serde_json::to_string_pretty(&record)?);
    } else {
        print!("{}", describe_record(&record));
    }

    if let Some(out) = screenshot_out {
        let screenshot = record
            .screenshot_ref
            .as_ref()
            .with_context(|| format!("Record {} has no screenshot yet", id))?;
        let bytes = artifacts.load(screenshot).await?;
        std::fs::write(out, bytes)
            .with_context(|| format!("Failed to write {}", out.display()))?;
        println!("Screenshot written to {}", out.display());
    }

    Ok(())
}

/// List recent records
async fn cmd_list(records: &dyn RecordStore, limit: usize) -> Result<()> {
    let recent = records.list(limit).await?;
    if recent.is_empty() {
        println!("No audits found");
        return Ok(());
    }
    for record in &recent {
        println!("{}", list_line(record));
    }
    Ok(())
}

fn list_line(record: &AuditRecord) -> String {
    let score = record
        .performance_score
        .map(|s| format!("{:>3}", s))
        .unwrap_or_else(|| "  -".to_string());
    format!(
        "{}  {}  {:<10}  {}  {}",
        record.id,
        record.created_at.format("%Y-%m-%d %H:%M:%S"),
        record.status,
        score,
        record.url
    )
}

/// Human-readable rendering of a record and its summary.
fn describe_record(record: &AuditRecord) -> String {
    let mut out = String::new();
    out.push_str(&format!("audit {}\n", record.id));
    out.push_str(&format!("URL:     {}\n", record.url));
    out.push_str(&format!("Status:  {}\n", record.status));
    out.push_str(&format!(
        "Created: {}\n",
        record.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    if let Some(score) = record.performance_score {
        out.push_str(&format!("Score:   {}/100\n", score));
    }
    if let Some(shot) = &record.screenshot_ref {
        out.push_str(&format!("Screenshot: {}\n", shot.short()));
    }

    match record.summary.as_deref() {
        None => {}
        Some(text) => match serde_json::from_str::<AuditSummary>(text) {
            Ok(summary) => {
                out.push('\n');
                out.push_str(&format!("    {}\n", summary.overall_assessment));
                for issue in &summary.issues {
                    out.push('\n');
                    out.push_str(&format!("  [{:?}] {}\n", issue.severity, issue.title));
                    out.push_str(&format!("      {}\n", issue.explanation));
                    out.push_str(&format!("      Impact: {}\n", issue.impact));
                    out.push_str(&format!("      Fix:    {}\n", issue.suggestion));
                }
            }
            // Failed records carry the error message instead of a summary.
            Err(_) => out.push_str(&format!("\n    {}\n", text)),
        },
    }
    out
}
