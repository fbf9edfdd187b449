//! SurrealDB-backed ReleaseLog implementation

use async_trait::async_trait;
use surrealdb::sql::Datetime as SurrealDatetime;
use tracing::{debug, instrument};

use crate::error::StorageError;
use crate::handle::SurrealHandle;
use crate::schema::DbReleaseRow;
use crate::storage_traits::{ReleaseLog, ReleaseRecord, StorageResult, TimeRange};

/// SurrealDB-backed implementation of [`ReleaseLog`].
///
/// Callers are expected to serialize appends (the release tagger is the
/// single writer); the unique indexes on `version` and `seq` reject anything
/// that slips through.
#[derive(Clone)]
pub struct SurrealReleaseLog {
    handle: SurrealHandle,
}

impl SurrealReleaseLog {
    pub fn new(handle: SurrealHandle) -> Self {
        Self { handle }
    }

    async fn select(
        &self,
        filter: &str,
        commit: Option<String>,
        range: TimeRange,
    ) -> StorageResult<Vec<ReleaseRecord>> {
        let sql = format!("SELECT * FROM releases WHERE {filter} ORDER BY seq DESC");
        let mut query = self.handle.db().query(sql);
        if let Some(commit) = commit {
            query = query.bind(("commit", commit));
        }
        if let Some(since) = range.since {
            query = query.bind(("since", SurrealDatetime::from(since)));
        }
        if let Some(until) = range.until {
            query = query.bind(("until", SurrealDatetime::from(until)));
        }
        let mut res = query.await?;
        let rows: Vec<DbReleaseRow> = res.take(0)?;
        Ok(rows.into_iter().map(ReleaseRecord::from).collect())
    }
}

#[async_trait]
impl ReleaseLog for SurrealReleaseLog {
    #[instrument(skip(self, record), fields(version = %record.version))]
    async fn append(&self, mut record: ReleaseRecord) -> StorageResult<ReleaseRecord> {
        if self.contains_version(&record.version).await? {
            return Err(StorageError::DuplicateVersion {
                version: record.version,
            });
        }

        record.seq = self.latest().await?.map(|r| r.seq).unwrap_or(0) + 1;
        debug!(seq = record.seq, "appending release");

        let created: Option<DbReleaseRow> = self
            .handle
            .db()
            .create("releases")
            .content(DbReleaseRow::from(record.clone()))
            .await
            .map_err(|e| {
                // The unique version index is the last line of defence.
                if e.to_string().contains("idx_version") {
                    StorageError::DuplicateVersion {
                        version: record.version.clone(),
                    }
                } else {
                    StorageError::Backend(e.to_string())
                }
            })?;

        created
            .map(ReleaseRecord::from)
            .ok_or_else(|| StorageError::Backend("failed to create release record".to_string()))
    }

    async fn latest(&self) -> StorageResult<Option<ReleaseRecord>> {
        let mut res = self
            .handle
            .db()
            .query("SELECT * FROM releases ORDER BY seq DESC LIMIT 1")
            .await?;
        let rows: Vec<DbReleaseRow> = res.take(0)?;
        Ok(rows.into_iter().next().map(ReleaseRecord::from))
    }

    async fn contains_version(&self, version: &str) -> StorageResult<bool> {
        let mut res = self
            .handle
            .db()
            .query("SELECT * FROM releases WHERE version = $version")
            .bind(("version", version.to_string()))
            .await?;
        let rows: Vec<DbReleaseRow> = res.take(0)?;
        Ok(!rows.is_empty())
    }

    async fn history(&self) -> StorageResult<Vec<ReleaseRecord>> {
        self.select("true", None, TimeRange::all()).await
    }

    async fn by_commit(&self, commit_ref: &str) -> StorageResult<Vec<ReleaseRecord>> {
        self.select("commit_ref = $commit", Some(commit_ref.to_string()), TimeRange::all())
            .await
    }

    async fn between(&self, range: TimeRange) -> StorageResult<Vec<ReleaseRecord>> {
        let mut filter = String::from("true");
        if range.since.is_some() {
            filter.push_str(" AND created_at >= $since");
        }
        if range.until.is_some() {
            filter.push_str(" AND created_at <= $until");
        }
        self.select(&filter, None, range).await
    }
}
