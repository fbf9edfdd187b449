//! Storage trait definitions for Gatehouse
//!
//! These traits define the two durable stores the engine writes to:
//! - `RunHistory`: finished pipeline runs, queryable by commit and time range
//! - `ReleaseLog`: append-only production release records with unique versions
//!
//! All traits are async and backend-agnostic. In-memory fakes are provided
//! for testing via the `fakes` module.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

// ---------------------------------------------------------------------------
// Time range queries
// ---------------------------------------------------------------------------

/// Inclusive time window used by history queries. Open ends match everything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl TimeRange {
    /// Window matching every timestamp.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn new(since: Option<DateTime<Utc>>, until: Option<DateTime<Utc>>) -> Self {
        Self { since, until }
    }

    /// Whether `at` falls inside the window.
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.since.map(|s| at >= s).unwrap_or(true) && self.until.map(|u| at <= u).unwrap_or(true)
    }
}

// ---------------------------------------------------------------------------
// RunHistory - finished pipeline runs
// ---------------------------------------------------------------------------

/// A finished pipeline run as persisted.
///
/// `payload` carries the full serialized run (per-check results and
/// diagnostics); the flat columns exist for querying.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    /// Unique run ID (UUID string)
    pub run_id: String,
    /// Branch the run was triggered from
    pub branch: String,
    /// Commit the run validated
    pub commit_ref: String,
    /// Overall status, lowercase (`passed`, `failed`, `cancelled`)
    pub status: String,
    /// Digest of the ordered check configuration
    pub spec_digest: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Full serialized run
    pub payload: serde_json::Value,
}

/// Append-only history of finished pipeline runs.
///
/// Guarantees:
/// - A run id is stored at most once; re-appending fails with `DuplicateRun`.
/// - Records are never updated or deleted.
/// - Query results are ordered oldest first by `finished_at`.
#[async_trait]
pub trait RunHistory: Send + Sync {
    /// Persist a finished run.
    async fn append(&self, record: RunRecord) -> StorageResult<()>;

    /// Fetch a run by id. Returns `StorageError::RunNotFound` if absent.
    async fn get(&self, run_id: &str) -> StorageResult<RunRecord>;

    /// All runs that validated `commit_ref`.
    async fn by_commit(&self, commit_ref: &str) -> StorageResult<Vec<RunRecord>>;

    /// All runs whose `finished_at` falls inside `range`.
    async fn between(&self, range: TimeRange) -> StorageResult<Vec<RunRecord>>;
}

// ---------------------------------------------------------------------------
// ReleaseLog - production releases
// ---------------------------------------------------------------------------

/// A single production release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseRecord {
    /// Semantic version label, e.g. `1.4.2`
    pub version: String,
    /// Commit that was promoted
    pub commit_ref: String,
    /// Branch that carried the commit
    pub branch: String,
    /// Version this release re-promotes, when it is a rollback
    pub rollback_of: Option<String>,
    /// Position in the log (1-based, assigned on append)
    pub seq: u64,
    pub created_at: DateTime<Utc>,
}

/// Append-only release log.
///
/// Semantics:
/// - `append` assigns the next `seq` and rejects a version that is already
///   recorded with `StorageError::DuplicateVersion`.
/// - `latest` is the record with the highest `seq`.
/// - `history` returns the full log newest first.
#[async_trait]
pub trait ReleaseLog: Send + Sync {
    /// Append a record; the stored copy (with its assigned `seq`) is returned.
    async fn append(&self, record: ReleaseRecord) -> StorageResult<ReleaseRecord>;

    /// Most recently appended release, if any.
    async fn latest(&self) -> StorageResult<Option<ReleaseRecord>>;

    /// Whether `version` has already been released.
    async fn contains_version(&self, version: &str) -> StorageResult<bool>;

    /// Full log (newest first).
    async fn history(&self) -> StorageResult<Vec<ReleaseRecord>>;

    /// Releases of `commit_ref` (newest first).
    async fn by_commit(&self, commit_ref: &str) -> StorageResult<Vec<ReleaseRecord>>;

    /// Releases created inside `range` (newest first).
    async fn between(&self, range: TimeRange) -> StorageResult<Vec<ReleaseRecord>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn open_range_contains_everything() {
        assert!(TimeRange::all().contains(Utc::now()));
    }

    #[test]
    fn bounded_range_is_inclusive() {
        let now = Utc::now();
        let range = TimeRange::new(Some(now - Duration::seconds(5)), Some(now));
        assert!(range.contains(now));
        assert!(range.contains(now - Duration::seconds(5)));
        assert!(!range.contains(now + Duration::seconds(1)));
        assert!(!range.contains(now - Duration::seconds(6)));
    }
}
