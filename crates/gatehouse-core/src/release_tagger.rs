//! Release tagging: the single writer of the version sequence.

use std::sync::Arc;

use chrono::Utc;
use gatehouse_state::{ReleaseLog, ReleaseRecord, StorageError};
use tokio::sync::Mutex;
use tracing::debug;

use crate::domain::{GateError, Result, Version, VersionBump};
use crate::obs;

/// Computes and records release versions.
///
/// All tagging goes through one async mutex, so two concurrent promotions
/// into Production always receive distinct, consecutive versions.
pub struct ReleaseTagger {
    log: Arc<dyn ReleaseLog>,
    base: Version,
    lock: Mutex<()>,
}

impl ReleaseTagger {
    /// Tagger whose first release bumps `0.0.0`.
    pub fn new(log: Arc<dyn ReleaseLog>) -> Self {
        Self::with_base(log, Version::default())
    }

    pub fn with_base(log: Arc<dyn ReleaseLog>, base: Version) -> Self {
        Self {
            log,
            base,
            lock: Mutex::new(()),
        }
    }

    pub fn log(&self) -> &Arc<dyn ReleaseLog> {
        &self.log
    }

    /// Latest recorded version, or `None` before the first release.
    pub async fn current(&self) -> Result<Option<Version>> {
        match self.log.latest().await? {
            Some(record) => Ok(Some(record.version.parse()?)),
            None => Ok(None),
        }
    }

    /// Version the next `tag` call would produce, without recording anything.
    pub async fn preview(&self, bump: VersionBump) -> Result<Version> {
        Ok(self.current().await?.unwrap_or(self.base).bump(bump))
    }

    /// Compute the next version, check it is unused, and append it.
    ///
    /// Never overwrites an existing version and never skips past one: a
    /// collision is reported as [`GateError::VersionConflict`].
    pub async fn tag(
        &self,
        commit_ref: &str,
        branch: &str,
        bump: VersionBump,
        rollback_of: Option<Version>,
    ) -> Result<ReleaseRecord> {
        let _guard = self.lock.lock().await;

        let next = self.preview(bump).await?;
        let version = next.to_string();
        if self.log.contains_version(&version).await? {
            return Err(GateError::VersionConflict { version });
        }

        debug!(version = %version, commit = %commit_ref, "tagging release");
        let record = ReleaseRecord {
            version: version.clone(),
            commit_ref: commit_ref.to_string(),
            branch: branch.to_string(),
            rollback_of: rollback_of.map(|v| v.to_string()),
            seq: 0,
            created_at: Utc::now(),
        };
        let record = self.log.append(record).await.map_err(|e| match e {
            StorageError::DuplicateVersion { version } => GateError::VersionConflict { version },
            other => GateError::Storage(other),
        })?;

        obs::emit_release_created(&record.version, &record.commit_ref, record.seq);
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatehouse_state::fakes::MemoryReleaseLog;

    fn tagger() -> ReleaseTagger {
        ReleaseTagger::new(Arc::new(MemoryReleaseLog::new()))
    }

    #[tokio::test]
    async fn test_first_release_bumps_base() {
        let t = tagger();
        let r = t.tag("c1", "main", VersionBump::Patch, None).await.unwrap();
        assert_eq!(r.version, "0.0.1");

        let t = tagger();
        let r = t.tag("c1", "main", VersionBump::Minor, None).await.unwrap();
        assert_eq!(r.version, "0.1.0");
    }

    #[tokio::test]
    async fn test_bumps_from_latest() {
        let t = tagger();
        t.tag("c1", "main", VersionBump::Patch, None).await.unwrap();
        t.tag("c2", "main", VersionBump::Patch, None).await.unwrap();
        let r = t.tag("c3", "main", VersionBump::Major, None).await.unwrap();
        assert_eq!(r.version, "1.0.0");
        assert_eq!(t.current().await.unwrap(), Some(Version::new(1, 0, 0)));
    }

    #[tokio::test]
    async fn test_conflict_when_version_exists() {
        let log = Arc::new(MemoryReleaseLog::new());
        // An out-of-band 0.1.0 followed by 0.0.9 makes the next patch collide.
        for v in ["0.1.0", "0.0.9"] {
            log.append(ReleaseRecord {
                version: v.to_string(),
                commit_ref: "old".into(),
                branch: "main".into(),
                rollback_of: None,
                seq: 0,
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        }
        let t = ReleaseTagger::new(log.clone());
        let err = t
            .tag("c1", "main", VersionBump::Minor, None)
            .await
            .unwrap_err();
        assert!(matches!(err, GateError::VersionConflict { ref version } if version == "0.1.0"));
        assert_eq!(log.history().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_rollback_is_recorded() {
        let t = tagger();
        t.tag("c1", "main", VersionBump::Patch, None).await.unwrap();
        let r = t
            .tag("c1", "main", VersionBump::Patch, Some(Version::new(0, 0, 1)))
            .await
            .unwrap();
        assert_eq!(r.version, "0.0.2");
        assert_eq!(r.rollback_of.as_deref(), Some("0.0.1"));
    }
}
