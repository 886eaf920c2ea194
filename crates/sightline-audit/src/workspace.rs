//! Per-attempt transient workspace.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{PipelineError, PipelineResult};
use sightline_state::RecordId;

/// Scratch directory for one pipeline attempt, removed on drop.
///
/// Holds the screenshot, the audit report and the browser profile for a
/// single attempt so nothing leaks between retries or records.
#[derive(Debug)]
pub struct TransientArtifacts {
    path: PathBuf,
}

impl TransientArtifacts {
    /// Create a fresh `<root>/<record_id>-attempt<n>` directory, clearing
    /// anything left behind by a crashed earlier run.
    pub fn create(root: &Path, record_id: &RecordId, attempt: u32) -> PipelineResult<Self> {
        let path = root.join(format!("{}-attempt{}", record_id, attempt));
        if path.exists() {
            std::fs::remove_dir_all(&path).map_err(|source| PipelineError::Workspace {
                path: path.clone(),
                source,
            })?;
        }
        std::fs::create_dir_all(&path).map_err(|source| PipelineError::Workspace {
            path: path.clone(),
            source,
        })?;
        debug!(path = %path.display(), "created attempt workspace");
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TransientArtifacts {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_dir_all(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %e, "failed to remove attempt workspace");
            }
        }
    }
}
