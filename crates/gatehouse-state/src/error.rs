//! Error types for gatehouse-state

use thiserror::Error;

/// Errors that can occur in the persistence layer
#[derive(Error, Debug)]
pub enum StorageError {
    /// Database connection error
    #[error("Database connection failed: {0}")]
    Connection(String),

    /// Schema setup error
    #[error("Schema setup failed: {0}")]
    SchemaSetup(String),

    /// Backend query error
    #[error("Storage backend error: {0}")]
    Backend(String),

    /// Serialization error
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Run id not present in the history
    #[error("Run not found: {run_id}")]
    RunNotFound { run_id: String },

    /// Run id already persisted
    #[error("Run already recorded: {run_id}")]
    DuplicateRun { run_id: String },

    /// Release version already present in the log
    #[error("Release version already recorded: {version}")]
    DuplicateVersion { version: String },
}

impl From<surrealdb::Error> for StorageError {
    fn from(err: surrealdb::Error) -> Self {
        StorageError::Backend(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}
