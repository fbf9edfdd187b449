//! In-memory fakes for storage traits (testing only)
//!
//! Provides `MemoryRunHistory` and `MemoryReleaseLog` that satisfy the trait
//! contracts without any external dependencies.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::error::StorageError;
use crate::storage_traits::*;

fn lock<T>(m: &Mutex<T>) -> StorageResult<MutexGuard<'_, T>> {
    m.lock()
        .map_err(|_| StorageError::Backend("in-memory store lock poisoned".to_string()))
}

// ---------------------------------------------------------------------------
// MemoryRunHistory
// ---------------------------------------------------------------------------

/// In-memory run history backed by a `HashMap<run_id, RunRecord>`.
#[derive(Debug, Default)]
pub struct MemoryRunHistory {
    runs: Mutex<HashMap<String, RunRecord>>,
}

impl MemoryRunHistory {
    pub fn new() -> Self {
        Self::default()
    }

    fn select(&self, pred: impl Fn(&RunRecord) -> bool) -> StorageResult<Vec<RunRecord>> {
        let runs = lock(&self.runs)?;
        let mut out: Vec<RunRecord> = runs.values().filter(|r| pred(r)).cloned().collect();
        out.sort_by_key(|r| r.finished_at);
        Ok(out)
    }
}

#[async_trait]
impl RunHistory for MemoryRunHistory {
    async fn append(&self, record: RunRecord) -> StorageResult<()> {
        let mut runs = lock(&self.runs)?;
        if runs.contains_key(&record.run_id) {
            return Err(StorageError::DuplicateRun {
                run_id: record.run_id,
            });
        }
        runs.insert(record.run_id.clone(), record);
        Ok(())
    }

    async fn get(&self, run_id: &str) -> StorageResult<RunRecord> {
        let runs = lock(&self.runs)?;
        runs.get(run_id)
            .cloned()
            .ok_or_else(|| StorageError::RunNotFound {
                run_id: run_id.to_string(),
            })
    }

    async fn by_commit(&self, commit_ref: &str) -> StorageResult<Vec<RunRecord>> {
        self.select(|r| r.commit_ref == commit_ref)
    }

    async fn between(&self, range: TimeRange) -> StorageResult<Vec<RunRecord>> {
        self.select(|r| range.contains(r.finished_at))
    }
}

// ---------------------------------------------------------------------------
// MemoryReleaseLog
// ---------------------------------------------------------------------------

/// In-memory release log backed by a `Vec<ReleaseRecord>` (oldest first internally).
#[derive(Debug, Default)]
pub struct MemoryReleaseLog {
    releases: Mutex<Vec<ReleaseRecord>>,
}

impl MemoryReleaseLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn select(&self, pred: impl Fn(&ReleaseRecord) -> bool) -> StorageResult<Vec<ReleaseRecord>> {
        let releases = lock(&self.releases)?;
        Ok(releases.iter().rev().filter(|r| pred(r)).cloned().collect())
    }
}

#[async_trait]
impl ReleaseLog for MemoryReleaseLog {
    async fn append(&self, mut record: ReleaseRecord) -> StorageResult<ReleaseRecord> {
        let mut releases = lock(&self.releases)?;
        if releases.iter().any(|r| r.version == record.version) {
            return Err(StorageError::DuplicateVersion {
                version: record.version,
            });
        }
        record.seq = releases.len() as u64 + 1;
        releases.push(record.clone());
        Ok(record)
    }

    async fn latest(&self) -> StorageResult<Option<ReleaseRecord>> {
        Ok(lock(&self.releases)?.last().cloned())
    }

    async fn contains_version(&self, version: &str) -> StorageResult<bool> {
        Ok(lock(&self.releases)?.iter().any(|r| r.version == version))
    }

    async fn history(&self) -> StorageResult<Vec<ReleaseRecord>> {
        self.select(|_| true)
    }

    async fn by_commit(&self, commit_ref: &str) -> StorageResult<Vec<ReleaseRecord>> {
        self.select(|r| r.commit_ref == commit_ref)
    }

    async fn between(&self, range: TimeRange) -> StorageResult<Vec<ReleaseRecord>> {
        self.select(|r| range.contains(r.created_at))
    }
}
