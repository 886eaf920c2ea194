//! Sightline-State: persistence for audit records and artifacts
//!
//! This crate provides the storage layer the audit pipeline writes its
//! checkpoints into.
//!
//! ## Key Components
//!
//! - `RecordStore` / `ArtifactStore`: backend-agnostic storage traits
//! - `AuditRecord` / `RecordPatch`: the record model and its partial updates,
//!   with the lifecycle invariants enforced in `AuditRecord::apply`
//! - `SurrealRecordStore`: SurrealDB-backed record store
//! - `FsArtifactStore`: filesystem content-addressed artifact store
//! - `fakes`: in-memory implementations for tests

mod error;
pub mod fakes;
pub mod fs_artifacts;
mod migrations;
mod schema;
pub mod storage_traits;
pub mod surreal_store;

pub use error::{StateError, StorageError};
pub use fs_artifacts::FsArtifactStore;
pub use storage_traits::{
    ArtifactRef, ArtifactStore, AuditOutcome, AuditRecord, AuditStatus, RecordId, RecordPatch,
    RecordStore, StorageResult,
};
pub use surreal_store::SurrealRecordStore;

/// Result type for backend setup operations
pub type Result<T> = std::result::Result<T, StateError>;
