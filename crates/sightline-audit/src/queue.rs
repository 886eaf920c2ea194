//! Work queue and submission service.
//!
//! [`AuditQueue`] is the "run pipeline for record id" entry point: ids are
//! pushed onto a channel and a fixed set of worker tasks drain it, one
//! pipeline run per id. [`AuditService`] sits in front of it, creating the
//! record for a URL and enqueuing it.

use std::sync::Arc;

use futures::future::join_all;
use sightline_state::{AuditRecord, RecordId, RecordStore};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{PipelineError, PipelineResult};
use crate::pipeline::AuditPipeline;

/// Background workers running [`AuditPipeline::run`] for enqueued ids.
pub struct AuditQueue {
    sender: mpsc::UnboundedSender<RecordId>,
    workers: Vec<JoinHandle<()>>,
}

impl AuditQueue {
    /// Spawn `workers` worker tasks (at least one).
    pub fn start(pipeline: Arc<AuditPipeline>, workers: usize) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel::<RecordId>();
        let receiver = Arc::new(Mutex::new(receiver));

        let handles: Vec<JoinHandle<()>> = (0..workers.max(1))
            .map(|worker| {
                let pipeline = pipeline.clone();
                let receiver = receiver.clone();
                tokio::spawn(async move {
                    loop {
                        let next = receiver.lock().await.recv().await;
                        let Some(id) = next else { break };
                        debug!(worker, record_id = %id, "picked up audit");
                        match pipeline.run(&id).await {
                            Ok(outcome) => info!(
                                worker,
                                record_id = %id,
                                status = %outcome.status,
                                attempts = outcome.attempts,
                                "audit finished"
                            ),
                            Err(e) => error!(worker, record_id = %id, error = %e, "audit could not run"),
                        }
                    }
                    debug!(worker, "audit worker stopped");
                })
            })
            .collect();

        Self {
            sender,
            workers: handles,
        }
    }

    /// Schedule a pipeline run for `id`.
    pub fn enqueue(&self, id: RecordId) -> PipelineResult<()> {
        self.sender.send(id).map_err(|_| PipelineError::QueueClosed)
    }

    /// Stop accepting work and wait for queued and in-flight audits to finish.
    pub async fn shutdown(self) {
        drop(self.sender);
        for result in join_all(self.workers).await {
            if let Err(e) = result {
                warn!(error = %e, "audit worker panicked");
            }
        }
    }
}

/// Creates audit records and hands them to the queue.
pub struct AuditService {
    records: Arc<dyn RecordStore>,
    queue: AuditQueue,
}

impl AuditService {
    pub fn new(records: Arc<dyn RecordStore>, queue: AuditQueue) -> Self {
        Self { records, queue }
    }

    /// Validate `url`, create a `Pending` record for it and enqueue it.
    pub async fn submit(&self, url: &str) -> PipelineResult<AuditRecord> {
        let url = validate_url(url)?;
        let record = self.records.create(url.as_str()).await?;
        self.queue.enqueue(record.id.clone())?;
        info!(record_id = %record.id, url = %record.url, "audit submitted");
        Ok(record)
    }

    /// Shut the queue down, waiting for submitted audits to finish.
    pub async fn shutdown(self) {
        self.queue.shutdown().await;
    }
}

/// Accept only absolute `http`/`https` URLs with a host.
pub fn validate_url(raw: &str) -> PipelineResult<reqwest::Url> {
    let invalid = |reason: String| PipelineError::InvalidUrl {
        url: raw.to_string(),
        reason,
    };
    let url = reqwest::Url::parse(raw.trim()).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(invalid("missing host".to_string()));
    }
    Ok(url)
}
