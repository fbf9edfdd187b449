//! SurrealDB-backed RunHistory implementation
//!
//! Uses `schema::DbRunRow` for persistence, converting to/from
//! `storage_traits::RunRecord` at the boundary.

use async_trait::async_trait;
use surrealdb::sql::Datetime as SurrealDatetime;
use tracing::debug;

use crate::error::StorageError;
use crate::handle::SurrealHandle;
use crate::schema::DbRunRow;
use crate::storage_traits::{RunHistory, RunRecord, StorageResult, TimeRange};

/// SurrealDB-backed implementation of [`RunHistory`].
#[derive(Clone)]
pub struct SurrealRunHistory {
    handle: SurrealHandle,
}

impl SurrealRunHistory {
    pub fn new(handle: SurrealHandle) -> Self {
        Self { handle }
    }

    async fn fetch(&self, run_id: &str) -> StorageResult<Option<DbRunRow>> {
        let mut res = self
            .handle
            .db()
            .query("SELECT * FROM pipeline_runs WHERE run_id = $rid")
            .bind(("rid", run_id.to_string()))
            .await?;
        let rows: Vec<DbRunRow> = res.take(0)?;
        Ok(rows.into_iter().next())
    }
}

#[async_trait]
impl RunHistory for SurrealRunHistory {
    async fn append(&self, record: RunRecord) -> StorageResult<()> {
        if self.fetch(&record.run_id).await?.is_some() {
            return Err(StorageError::DuplicateRun {
                run_id: record.run_id,
            });
        }

        debug!(run_id = %record.run_id, "persisting pipeline run");
        let _created: Option<DbRunRow> = self
            .handle
            .db()
            .create("pipeline_runs")
            .content(DbRunRow::from(record))
            .await?;
        Ok(())
    }

    async fn get(&self, run_id: &str) -> StorageResult<RunRecord> {
        self.fetch(run_id)
            .await?
            .map(RunRecord::from)
            .ok_or_else(|| StorageError::RunNotFound {
                run_id: run_id.to_string(),
            })
    }

    async fn by_commit(&self, commit_ref: &str) -> StorageResult<Vec<RunRecord>> {
        let mut res = self
            .handle
            .db()
            .query("SELECT * FROM pipeline_runs WHERE commit_ref = $commit ORDER BY finished_at ASC")
            .bind(("commit", commit_ref.to_string()))
            .await?;
        let rows: Vec<DbRunRow> = res.take(0)?;
        Ok(rows.into_iter().map(RunRecord::from).collect())
    }

    async fn between(&self, range: TimeRange) -> StorageResult<Vec<RunRecord>> {
        let mut sql = String::from("SELECT * FROM pipeline_runs WHERE true");
        if range.since.is_some() {
            sql.push_str(" AND finished_at >= $since");
        }
        if range.until.is_some() {
            sql.push_str(" AND finished_at <= $until");
        }
        sql.push_str(" ORDER BY finished_at ASC");

        let mut query = self.handle.db().query(sql);
        if let Some(since) = range.since {
            query = query.bind(("since", SurrealDatetime::from(since)));
        }
        if let Some(until) = range.until {
            query = query.bind(("until", SurrealDatetime::from(until)));
        }
        let mut res = query.await?;
        let rows: Vec<DbRunRow> = res.take(0)?;
        Ok(rows.into_iter().map(RunRecord::from).collect())
    }
}
