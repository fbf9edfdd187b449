//! SurrealDB connection handle
//!
//! Supports in-memory (`mem://`), embedded file (`surrealkv://<path>`), and
//! remote (`ws://`/`wss://`) connections through the `any` engine.

use std::path::Path;

use surrealdb::engine::any::Any;
use surrealdb::opt::auth::Root;
use surrealdb::Surreal;
use tracing::info;

use crate::error::StorageError;
use crate::migrations;
use crate::storage_traits::StorageResult;

/// Namespace all Gatehouse tables live under.
pub const NAMESPACE: &str = "gatehouse";
/// Database name inside [`NAMESPACE`].
pub const DATABASE: &str = "main";

/// SurrealDB connection handle shared by the Surreal-backed stores.
#[derive(Clone)]
pub struct SurrealHandle {
    db: Surreal<Any>,
}

impl SurrealHandle {
    /// Connect to `url`, select the Gatehouse namespace, and run migrations.
    pub async fn connect(url: &str) -> StorageResult<Self> {
        let db = surrealdb::engine::any::connect(url)
            .await
            .map_err(|e| StorageError::Connection(format!("Failed to connect to {}: {}", url, e)))?;

        db.use_ns(NAMESPACE)
            .use_db(DATABASE)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        migrations::init_schema(&db).await?;
        info!("Gatehouse store connected ({})", url);
        Ok(Self { db })
    }

    /// In-memory instance for tests.
    pub async fn in_memory() -> StorageResult<Self> {
        Self::connect("mem://").await
    }

    /// Embedded on-disk store rooted at `dir`.
    pub async fn open(dir: &Path) -> StorageResult<Self> {
        std::fs::create_dir_all(dir).map_err(|e| {
            StorageError::Connection(format!(
                "Failed to create database directory {}: {}",
                dir.display(),
                e
            ))
        })?;
        Self::connect(&format!("surrealkv://{}", dir.display())).await
    }

    /// Resolve the store from the environment.
    ///
    /// Reads `SURREALDB_URL` (with optional `SURREALDB_USERNAME` /
    /// `SURREALDB_PASSWORD` root credentials); falls back to a local
    /// embedded store at `default_dir`.
    pub async fn from_env(default_dir: &Path) -> StorageResult<Self> {
        let Ok(url) = std::env::var("SURREALDB_URL") else {
            info!(
                "SURREALDB_URL not set, using local persistence at {}",
                default_dir.display()
            );
            return Self::open(default_dir).await;
        };

        let db = surrealdb::engine::any::connect(&url)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        if let (Ok(username), Ok(password)) = (
            std::env::var("SURREALDB_USERNAME"),
            std::env::var("SURREALDB_PASSWORD"),
        ) {
            db.signin(Root {
                username: &username,
                password: &password,
            })
            .await
            .map_err(|e| StorageError::Connection(format!("Root auth failed: {e}")))?;
        }

        db.use_ns(NAMESPACE)
            .use_db(DATABASE)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        migrations::init_schema(&db).await?;
        info!("Gatehouse store connected ({})", url);
        Ok(Self { db })
    }

    pub(crate) fn db(&self) -> &Surreal<Any> {
        &self.db
    }
}
