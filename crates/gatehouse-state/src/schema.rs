//! Schema definitions for Gatehouse SurrealDB tables
//!
//! Tables:
//! - pipeline_runs: finished pipeline runs
//! - releases: production release log

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::storage_traits::{ReleaseRecord, RunRecord};

/// Module for serializing chrono DateTime to SurrealDB datetime format
mod surreal_datetime {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};
    use surrealdb::sql::Datetime as SurrealDatetime;

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let sd = SurrealDatetime::from(*date);
        serde::Serialize::serialize(&sd, serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let sd = SurrealDatetime::deserialize(deserializer)?;
        Ok(DateTime::from(sd))
    }
}

/// Pipeline run row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbRunRow {
    /// SurrealDB record ID
    #[serde(default, skip_serializing)]
    pub id: Option<surrealdb::sql::Thing>,
    pub run_id: String,
    pub branch: String,
    pub commit_ref: String,
    pub status: String,
    pub spec_digest: String,
    #[serde(with = "surreal_datetime")]
    pub started_at: DateTime<Utc>,
    #[serde(with = "surreal_datetime")]
    pub finished_at: DateTime<Utc>,
    pub payload: serde_json::Value,
}

impl From<RunRecord> for DbRunRow {
    fn from(r: RunRecord) -> Self {
        Self {
            id: None,
            run_id: r.run_id,
            branch: r.branch,
            commit_ref: r.commit_ref,
            status: r.status,
            spec_digest: r.spec_digest,
            started_at: r.started_at,
            finished_at: r.finished_at,
            payload: r.payload,
        }
    }
}

impl From<DbRunRow> for RunRecord {
    fn from(row: DbRunRow) -> Self {
        Self {
            run_id: row.run_id,
            branch: row.branch,
            commit_ref: row.commit_ref,
            status: row.status,
            spec_digest: row.spec_digest,
            started_at: row.started_at,
            finished_at: row.finished_at,
            payload: row.payload,
        }
    }
}

/// Release row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbReleaseRow {
    #[serde(default, skip_serializing)]
    pub id: Option<surrealdb::sql::Thing>,
    pub version: String,
    pub commit_ref: String,
    pub branch: String,
    pub rollback_of: Option<String>,
    pub seq: u64,
    #[serde(with = "surreal_datetime")]
    pub created_at: DateTime<Utc>,
}

impl From<ReleaseRecord> for DbReleaseRow {
    fn from(r: ReleaseRecord) -> Self {
        Self {
            id: None,
            version: r.version,
            commit_ref: r.commit_ref,
            branch: r.branch,
            rollback_of: r.rollback_of,
            seq: r.seq,
            created_at: r.created_at,
        }
    }
}

impl From<DbReleaseRow> for ReleaseRecord {
    fn from(row: DbReleaseRow) -> Self {
        Self {
            version: row.version,
            commit_ref: row.commit_ref,
            branch: row.branch,
            rollback_of: row.rollback_of,
            seq: row.seq,
            created_at: row.created_at,
        }
    }
}
