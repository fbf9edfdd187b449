//! SurrealDB schema migrations and initialization
//!
//! Sets up the run history and release log tables with their uniqueness
//! constraints and query indexes.

use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

use crate::error::StorageError;
use crate::storage_traits::StorageResult;

/// Initialize all Gatehouse tables in SurrealDB.
///
/// Safe to call multiple times (idempotent).
pub async fn init_schema(db: &Surreal<Any>) -> StorageResult<()> {
    info!("Initializing Gatehouse SurrealDB schema");

    init_pipeline_runs_table(db).await?;
    init_releases_table(db).await?;

    info!("Gatehouse schema initialization complete");
    Ok(())
}

/// Initialize `pipeline_runs` table
///
/// Schema:
/// ```text
/// TABLE pipeline_runs {
///   run_id:       STRING (unique)
///   branch:       STRING (indexed)
///   commit_ref:   STRING (indexed)
///   status:       STRING (passed | failed | cancelled)
///   spec_digest:  STRING
///   started_at:   DATETIME
///   finished_at:  DATETIME (indexed)
///   payload:      OBJECT
/// }
/// ```
///
/// Rows are written once, after the run finished; updates and deletes are denied.
async fn init_pipeline_runs_table(db: &Surreal<Any>) -> StorageResult<()> {
    debug!("Initializing pipeline_runs table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS pipeline_runs SCHEMALESS
            PERMISSIONS
                FOR select FULL,
                FOR create FULL,
                FOR update NONE,
                FOR delete NONE;

        DEFINE INDEX IF NOT EXISTS idx_run_id ON TABLE pipeline_runs COLUMNS run_id UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_commit_ref ON TABLE pipeline_runs COLUMNS commit_ref;
        DEFINE INDEX IF NOT EXISTS idx_branch ON TABLE pipeline_runs COLUMNS branch;
        DEFINE INDEX IF NOT EXISTS idx_finished_at ON TABLE pipeline_runs COLUMNS finished_at;
    "#;

    db.query(sql)
        .await
        .and_then(|r| r.check())
        .map_err(|e| StorageError::SchemaSetup(e.to_string()))?;
    debug!("pipeline_runs table initialized");
    Ok(())
}

/// Initialize `releases` table
///
/// Schema:
/// ```text
/// TABLE releases {
///   version:      STRING (unique)
///   commit_ref:   STRING (indexed)
///   branch:       STRING
///   rollback_of:  STRING?
///   seq:          INT (unique, append order)
///   created_at:   DATETIME (indexed)
/// }
/// ```
///
/// The log is append-only; the version index backs the no-overwrite rule.
async fn init_releases_table(db: &Surreal<Any>) -> StorageResult<()> {
    debug!("Initializing releases table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS releases SCHEMALESS
            PERMISSIONS
                FOR select FULL,
                FOR create FULL,
                FOR update NONE,
                FOR delete NONE;

        DEFINE INDEX IF NOT EXISTS idx_version ON TABLE releases COLUMNS version UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_seq ON TABLE releases COLUMNS seq UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_commit_ref ON TABLE releases COLUMNS commit_ref;
        DEFINE INDEX IF NOT EXISTS idx_created_at ON TABLE releases COLUMNS created_at;
    "#;

    db.query(sql)
        .await
        .and_then(|r| r.check())
        .map_err(|e| StorageError::SchemaSetup(e.to_string()))?;
    debug!("releases table initialized");
    Ok(())
}
