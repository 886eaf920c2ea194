//! SurrealDB-backed RecordStore implementation
//!
//! Uses `schema::AuditRecordRow` for persistence, converting to/from
//! `storage_traits` types at the boundary.

use async_trait::async_trait;
use surrealdb::engine::any::Any;
use surrealdb::opt::auth::Root;
use surrealdb::Surreal;
use tracing::{debug, info};

use crate::error::{StateError, StorageError};
use crate::migrations;
use crate::schema::AuditRecordRow;
use crate::storage_traits::{AuditRecord, RecordId, RecordPatch, RecordStore, StorageResult};

const NAMESPACE: &str = "sightline";
const DATABASE: &str = "main";

/// Default on-disk location used when `SIGHTLINE_DB_URL` is not set
pub const DEFAULT_DB_PATH: &str = ".sightline/db";

/// SurrealDB-backed implementation of [`RecordStore`].
#[derive(Clone)]
pub struct SurrealRecordStore {
    db: Surreal<Any>,
}

impl SurrealRecordStore {
    /// Create an in-memory instance for testing.
    pub async fn in_memory() -> crate::Result<Self> {
        let store = Self::connect("mem://").await?;
        info!("SurrealRecordStore connected (in-memory)");
        Ok(store)
    }

    /// Connect to any SurrealDB endpoint (`mem://`, `surrealkv://path`, `ws://host`).
    pub async fn connect(url: &str) -> crate::Result<Self> {
        let db = surrealdb::engine::any::connect(url)
            .await
            .map_err(|e| StateError::Connection(format!("Failed to connect to {}: {}", url, e)))?;

        Self::select_and_migrate(db).await
    }

    /// Create from environment variables.
    ///
    /// Reads:
    /// - SIGHTLINE_DB_URL (optional, default: `surrealkv://.sightline/db`)
    /// - SIGHTLINE_DB_USERNAME / SIGHTLINE_DB_PASSWORD (optional, root sign-in for remote servers)
    pub async fn from_env() -> crate::Result<Self> {
        let url = match std::env::var("SIGHTLINE_DB_URL") {
            Ok(url) => url,
            Err(_) => {
                std::fs::create_dir_all(DEFAULT_DB_PATH).map_err(|e| {
                    StateError::Connection(format!(
                        "Failed to create database directory {}: {}",
                        DEFAULT_DB_PATH, e
                    ))
                })?;
                let url = format!("surrealkv://{}", DEFAULT_DB_PATH);
                info!("No SIGHTLINE_DB_URL found, using local persistence: {}", url);
                url
            }
        };

        let db = surrealdb::engine::any::connect(&url)
            .await
            .map_err(|e| StateError::Connection(format!("Failed to connect to {}: {}", url, e)))?;

        if let (Ok(username), Ok(password)) = (
            std::env::var("SIGHTLINE_DB_USERNAME"),
            std::env::var("SIGHTLINE_DB_PASSWORD"),
        ) {
            db.signin(Root {
                username: &username,
                password: &password,
            })
            .await
            .map_err(|e| StateError::Connection(format!("Root auth failed: {e}")))?;
        }

        let store = Self::select_and_migrate(db).await?;
        info!("SurrealRecordStore connected ({})", url);
        Ok(store)
    }

    async fn select_and_migrate(db: Surreal<Any>) -> crate::Result<Self> {
        db.use_ns(NAMESPACE)
            .use_db(DATABASE)
            .await
            .map_err(|e| StateError::Connection(e.to_string()))?;

        migrations::init_schema(&db).await?;
        Ok(Self { db })
    }

    // -- private helpers -----------------------------------------------------

    /// Fetch a row by record ID, returning RecordNotFound when absent.
    async fn fetch_row(&self, id: &str) -> StorageResult<AuditRecordRow> {
        let rid_owned = id.to_string();
        let mut res = self
            .db
            .query("SELECT * FROM audit_records WHERE record_id = $rid")
            .bind(("rid", rid_owned))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let rows: Vec<AuditRecordRow> = res
            .take(0)
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        rows.into_iter()
            .next()
            .ok_or_else(|| StorageError::RecordNotFound { id: id.to_string() })
    }
}

#[async_trait]
impl RecordStore for SurrealRecordStore {
    async fn create(&self, url: &str) -> StorageResult<AuditRecord> {
        let record = AuditRecord::new(url);
        let row = AuditRecordRow::try_from(&record)?;

        debug!(record_id = %record.id, "creating audit record");

        self.db
            .query("CREATE audit_records CONTENT $row")
            .bind(("row", row))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?
            .check()
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        Ok(record)
    }

    async fn get(&self, id: &RecordId) -> StorageResult<AuditRecord> {
        self.fetch_row(&id.0).await?.into_record()
    }

    async fn save(&self, id: &RecordId, patch: RecordPatch) -> StorageResult<AuditRecord> {
        let mut record = self.fetch_row(&id.0).await?.into_record()?;
        record.apply(patch)?;

        let row = AuditRecordRow::try_from(&record)?;
        let rid_owned = id.0.clone();

        self.db
            .query("UPDATE audit_records CONTENT $row WHERE record_id = $rid")
            .bind(("row", row))
            .bind(("rid", rid_owned))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?
            .check()
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        debug!(record_id = %id, status = %record.status, "saved audit record");
        Ok(record)
    }

    async fn list(&self, limit: usize) -> StorageResult<Vec<AuditRecord>> {
        let mut res = self
            .db
            .query("SELECT * FROM audit_records ORDER BY created_at DESC LIMIT $limit")
            .bind(("limit", limit as i64))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let rows: Vec<AuditRecordRow> = res
            .take(0)
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        rows.into_iter().map(AuditRecordRow::into_record).collect()
    }
}
