//! In-memory fakes for storage traits (testing only)
//!
//! Provides `MemoryRecordStore` and `MemoryArtifactStore` that satisfy the
//! trait contracts without any external dependencies.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::StorageError;
use crate::storage_traits::*;

// ---------------------------------------------------------------------------
// MemoryRecordStore
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct RecordState {
    record: AuditRecord,
    /// Every patch that was successfully applied, in order
    patches: Vec<RecordPatch>,
}

/// In-memory record store backed by a `HashMap<RecordId, RecordState>`.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    records: Mutex<HashMap<String, RecordState>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applied patches for a record, oldest first.
    pub fn patches(&self, id: &RecordId) -> Vec<RecordPatch> {
        let records = self.records.lock().unwrap();
        records
            .get(&id.0)
            .map(|s| s.patches.clone())
            .unwrap_or_default()
    }

    /// Insert a record as-is, bypassing `create`.
    pub fn insert(&self, record: AuditRecord) {
        let mut records = self.records.lock().unwrap();
        records.insert(
            record.id.0.clone(),
            RecordState {
                record,
                patches: Vec::new(),
            },
        );
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn create(&self, url: &str) -> StorageResult<AuditRecord> {
        let record = AuditRecord::new(url);
        self.insert(record.clone());
        Ok(record)
    }

    async fn get(&self, id: &RecordId) -> StorageResult<AuditRecord> {
        let records = self.records.lock().unwrap();
        records
            .get(&id.0)
            .map(|s| s.record.clone())
            .ok_or_else(|| StorageError::RecordNotFound { id: id.0.clone() })
    }

    async fn save(&self, id: &RecordId, patch: RecordPatch) -> StorageResult<AuditRecord> {
        let mut records = self.records.lock().unwrap();
        let state = records
            .get_mut(&id.0)
            .ok_or_else(|| StorageError::RecordNotFound { id: id.0.clone() })?;

        // Apply to a copy so a rejected patch leaves the record untouched.
        let mut updated = state.record.clone();
        updated.apply(patch.clone())?;
        state.record = updated;
        state.patches.push(patch);
        Ok(state.record.clone())
    }

    async fn list(&self, limit: usize) -> StorageResult<Vec<AuditRecord>> {
        let records = self.records.lock().unwrap();
        let mut all: Vec<AuditRecord> = records.values().map(|s| s.record.clone()).collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        all.truncate(limit);
        Ok(all)
    }
}

// ---------------------------------------------------------------------------
// MemoryArtifactStore
// ---------------------------------------------------------------------------

/// In-memory artifact store backed by a `HashMap<digest, bytes>`.
#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    store: Mutex<HashMap<String, Vec<u8>>>,
    owners: Mutex<HashMap<String, Vec<ArtifactRef>>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Artifacts stored on behalf of a record, in storage order.
    pub fn stored_for(&self, record_id: &RecordId) -> Vec<ArtifactRef> {
        let owners = self.owners.lock().unwrap();
        owners.get(&record_id.0).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn store(&self, record_id: &RecordId, data: &[u8]) -> StorageResult<ArtifactRef> {
        let artifact = ArtifactRef::from_bytes(data);
        self.store
            .lock()
            .unwrap()
            .insert(artifact.as_str().to_string(), data.to_vec());
        self.owners
            .lock()
            .unwrap()
            .entry(record_id.0.clone())
            .or_default()
            .push(artifact.clone());
        Ok(artifact)
    }

    async fn load(&self, artifact: &ArtifactRef) -> StorageResult<Vec<u8>> {
        let store = self.store.lock().unwrap();
        store
            .get(artifact.as_str())
            .cloned()
            .ok_or_else(|| StorageError::ArtifactNotFound {
                digest: artifact.as_str().to_string(),
            })
    }
}
