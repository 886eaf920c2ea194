use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{StateError, StorageError};
use crate::storage_traits::{ArtifactRef, ArtifactStore, RecordId, StorageResult};

/// Default artifact root used when `SIGHTLINE_ARTIFACT_DIR` is not set
pub const DEFAULT_ARTIFACT_DIR: &str = ".sightline/artifacts";

/// Filesystem-backed artifact store with git-style 2-char sharding.
///
/// Layout: `<root>/objects/<first 2 hex chars>/<remaining hex chars>`
pub struct FsArtifactStore {
    objects_dir: PathBuf,
}

impl FsArtifactStore {
    /// Create a new `FsArtifactStore` rooted at `root`. Creates `root/objects/` if needed.
    pub fn new(root: impl AsRef<Path>) -> crate::Result<Self> {
        let objects_dir = root.as_ref().join("objects");
        fs::create_dir_all(&objects_dir).map_err(|e| {
            StateError::ArtifactRoot(format!("{}: {}", objects_dir.display(), e))
        })?;
        Ok(Self { objects_dir })
    }

    /// Root from `SIGHTLINE_ARTIFACT_DIR`, defaulting to `.sightline/artifacts`.
    pub fn from_env() -> crate::Result<Self> {
        let root = std::env::var("SIGHTLINE_ARTIFACT_DIR")
            .unwrap_or_else(|_| DEFAULT_ARTIFACT_DIR.to_string());
        Self::new(root)
    }

    /// On-disk location of an artifact.
    pub fn path_of(&self, artifact: &ArtifactRef) -> PathBuf {
        let hex = artifact.as_str();
        self.objects_dir.join(&hex[..2]).join(&hex[2..])
    }

    fn put(&self, data: &[u8]) -> StorageResult<ArtifactRef> {
        let artifact = ArtifactRef::from_bytes(data);
        let path = self.path_of(&artifact);

        if path.exists() {
            return Ok(artifact);
        }

        let shard_dir = self.objects_dir.join(&artifact.as_str()[..2]);
        fs::create_dir_all(&shard_dir)?;

        // Atomic write: temp file in the same directory, then rename.
        let mut tmp = NamedTempFile::new_in(&shard_dir)?;
        tmp.write_all(data)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| e.error)?;

        Ok(artifact)
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn store(&self, record_id: &RecordId, data: &[u8]) -> StorageResult<ArtifactRef> {
        let artifact = self.put(data)?;
        debug!(record_id = %record_id, artifact = %artifact.short(), bytes = data.len(), "stored artifact");
        Ok(artifact)
    }

    async fn load(&self, artifact: &ArtifactRef) -> StorageResult<Vec<u8>> {
        let path = self.path_of(artifact);
        fs::read(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::ArtifactNotFound {
                    digest: artifact.as_str().to_string(),
                }
            } else {
                StorageError::Io(e)
            }
        })
    }
}
