//! SurrealDB schema migrations and initialization

use crate::Result;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

/// Initialize all Sightline tables in SurrealDB
///
/// Safe to call multiple times (idempotent).
pub async fn init_schema(db: &Surreal<Any>) -> Result<()> {
    info!("Initializing Sightline SurrealDB schema");
    init_audit_records_table(db).await?;
    info!("Sightline schema initialization complete");
    Ok(())
}

/// Initialize `audit_records` table with constraints and indexes
///
/// Schema:
/// ```text
/// TABLE audit_records {
///   record_id:          STRING (unique)
///   url:                STRING
///   status:             STRING (enum: pending | processing | completed | failed)
///   performance_score:  INT?
///   audit_report:       STRING? (JSON text, kept verbatim)
///   summary:            STRING?
///   screenshot_ref:     STRING?
///   created_at:         DATETIME (indexed)
/// }
/// ```
///
/// Constraints:
/// - `record_id` is unique
/// - `status` transitions: pending → processing → completed | failed (enforced via app logic)
/// - Terminal records are immutable (enforced via app logic)
/// - Records are never deleted by the pipeline
async fn init_audit_records_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing audit_records table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS audit_records SCHEMALESS
            PERMISSIONS
                FOR select, create, update FULL
                FOR delete NONE;

        DEFINE INDEX IF NOT EXISTS idx_record_id ON TABLE audit_records COLUMNS record_id UNIQUE;

        -- Listing is newest first
        DEFINE INDEX IF NOT EXISTS idx_created_at ON TABLE audit_records COLUMNS created_at;

        DEFINE INDEX IF NOT EXISTS idx_status ON TABLE audit_records COLUMNS status;
    "#;

    db.query(sql)
        .await
        .map_err(|e| crate::StateError::SchemaSetup(e.to_string()))?
        .check()
        .map_err(|e| crate::StateError::SchemaSetup(e.to_string()))?;
    debug!("audit_records table initialized");
    Ok(())
}
