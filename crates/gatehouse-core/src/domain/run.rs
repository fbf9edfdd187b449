//! Pipeline runs and their lifecycle.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use gatehouse_state::RunRecord;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::check::{CheckResult, CheckStatus};
use super::error::{GateError, Result};

/// What a run was triggered for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerRef {
    pub branch: String,
    pub commit: String,
}

impl TriggerRef {
    pub fn new(branch: impl Into<String>, commit: impl Into<String>) -> Self {
        Self {
            branch: branch.into(),
            commit: commit.into(),
        }
    }
}

/// Derived status of a run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Passed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Passed => "passed",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One execution of the gate pipeline.
///
/// Results are only ever appended, at most one per check name, and the run
/// rejects further appends once [`PipelineRun::finish`] has been called.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineRun {
    pub id: Uuid,
    pub trigger_ref: TriggerRef,

    /// SHA-256 over the ordered check names of the pipeline that produced this run.
    pub spec_digest: String,

    /// Check names in declaration order.
    declared: Vec<String>,

    /// Results, kept sorted by declaration order.
    results: Vec<CheckResult>,

    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,

    /// Set when the run stopped scheduling because of cancellation.
    pub cancelled: bool,
}

impl PipelineRun {
    pub fn new(trigger_ref: TriggerRef, declared: Vec<String>, spec_digest: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            trigger_ref,
            spec_digest: spec_digest.into(),
            declared,
            results: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
            cancelled: false,
        }
    }

    /// Append a result.
    pub fn record(&mut self, result: CheckResult) -> Result<()> {
        if self.is_finished() {
            return Err(GateError::RunFinalized {
                run_id: self.id.to_string(),
            });
        }
        if self.result(&result.name).is_some() {
            return Err(GateError::DuplicateResult {
                run_id: self.id.to_string(),
                check: result.name,
            });
        }

        let rank = self.rank(&result.name);
        let at = self
            .results
            .iter()
            .position(|r| self.rank(&r.name) > rank)
            .unwrap_or(self.results.len());
        self.results.insert(at, result);
        Ok(())
    }

    /// Seal the run. Idempotent.
    pub fn finish(&mut self) {
        if self.finished_at.is_none() {
            self.finished_at = Some(Utc::now());
        }
    }

    pub fn mark_cancelled(&mut self) {
        self.cancelled = true;
    }

    pub fn is_finished(&self) -> bool {
        self.finished_at.is_some()
    }

    pub fn result(&self, name: &str) -> Option<&CheckResult> {
        self.results.iter().find(|r| r.name == name)
    }

    /// Status of a named check, if it has a result.
    pub fn status_of(&self, name: &str) -> Option<CheckStatus> {
        self.result(name).map(|r| r.status)
    }

    /// All results in declaration order.
    pub fn results(&self) -> &[CheckResult] {
        &self.results
    }

    pub fn declared(&self) -> &[String] {
        &self.declared
    }

    pub fn overall_status(&self) -> RunStatus {
        if !self.is_finished() {
            return RunStatus::Running;
        }
        if self.results.iter().any(CheckResult::fails_run) {
            RunStatus::Failed
        } else if self.cancelled {
            RunStatus::Cancelled
        } else {
            RunStatus::Passed
        }
    }

    pub fn duration_ms(&self) -> u64 {
        self.finished_at
            .map(|end| (end - self.started_at).num_milliseconds().max(0) as u64)
            .unwrap_or(0)
    }

    /// Count of results per status, as `(passed, failed, skipped, errored)`.
    pub fn tally(&self) -> (usize, usize, usize, usize) {
        let count = |s: CheckStatus| self.results.iter().filter(|r| r.status == s).count();
        (
            count(CheckStatus::Passed),
            count(CheckStatus::Failed),
            count(CheckStatus::Skipped),
            count(CheckStatus::Errored),
        )
    }

    /// Human-readable report: one block per check, then a summary line.
    pub fn report(&self) -> String {
        let mut out = String::new();
        for r in &self.results {
            let marker = if r.blocking { "" } else { " (advisory)" };
            let _ = writeln!(
                out,
                "[{}] {}{} ({} ms)",
                r.status.as_str().to_uppercase(),
                r.name,
                marker,
                r.duration_ms
            );
            for line in &r.diagnostics {
                let _ = writeln!(out, "    {}", line);
            }
        }
        let (passed, failed, skipped, errored) = self.tally();
        let _ = write!(
            out,
            "run {} {}: {} passed, {} failed, {} skipped, {} errored",
            self.id,
            self.overall_status(),
            passed,
            failed,
            skipped,
            errored
        );
        out
    }

    /// Flatten into a persistence record. Only finished runs are persisted.
    pub fn to_record(&self) -> Result<RunRecord> {
        let finished_at = self.finished_at.ok_or_else(|| GateError::RunFinalized {
            run_id: format!("{} (not finished)", self.id),
        })?;
        Ok(RunRecord {
            run_id: self.id.to_string(),
            branch: self.trigger_ref.branch.clone(),
            commit_ref: self.trigger_ref.commit.clone(),
            status: self.overall_status().as_str().to_string(),
            spec_digest: self.spec_digest.clone(),
            started_at: self.started_at,
            finished_at,
            payload: serde_json::to_value(self)?,
        })
    }

    pub fn from_record(record: &RunRecord) -> Result<Self> {
        Ok(serde_json::from_value(record.payload.clone())?)
    }

    fn rank(&self, name: &str) -> usize {
        self.declared
            .iter()
            .position(|d| d == name)
            .unwrap_or(self.declared.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::check::SkipReason;

    fn run() -> PipelineRun {
        PipelineRun::new(
            TriggerRef::new("feature/x", "abc123"),
            vec!["format".into(), "lint".into(), "tests".into()],
            "digest",
        )
    }

    fn ok(name: &str) -> CheckResult {
        CheckResult::completed(name, CheckStatus::Passed, true, 5, vec![])
    }

    #[test]
    fn test_results_sorted_by_declaration_order() {
        let mut r = run();
        r.record(ok("tests")).unwrap();
        r.record(ok("format")).unwrap();
        r.record(ok("lint")).unwrap();
        let names: Vec<&str> = r.results().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["format", "lint", "tests"]);
    }

    #[test]
    fn test_duplicate_result_rejected() {
        let mut r = run();
        r.record(ok("lint")).unwrap();
        let err = r.record(ok("lint")).unwrap_err();
        assert!(matches!(err, GateError::DuplicateResult { .. }));
    }

    #[test]
    fn test_finished_run_rejects_appends() {
        let mut r = run();
        r.finish();
        let err = r.record(ok("lint")).unwrap_err();
        assert!(matches!(err, GateError::RunFinalized { .. }));
    }

    #[test]
    fn test_overall_status_derivation() {
        let mut r = run();
        assert_eq!(r.overall_status(), RunStatus::Running);
        r.record(ok("format")).unwrap();
        r.record(CheckResult::completed("lint", CheckStatus::Failed, false, 1, vec![]))
            .unwrap();
        r.record(ok("tests")).unwrap();
        r.finish();
        assert_eq!(r.overall_status(), RunStatus::Passed);

        let mut r = run();
        r.record(CheckResult::completed("format", CheckStatus::Errored, true, 1, vec![]))
            .unwrap();
        r.record(CheckResult::skipped(
            "lint",
            true,
            SkipReason::DependencyFailed {
                dependency: "format".into(),
            },
        ))
        .unwrap();
        r.finish();
        assert_eq!(r.overall_status(), RunStatus::Failed);
    }

    #[test]
    fn test_cancelled_without_failure() {
        let mut r = run();
        r.record(ok("format")).unwrap();
        r.record(CheckResult::skipped("lint", true, SkipReason::Cancelled))
            .unwrap();
        r.mark_cancelled();
        r.finish();
        assert_eq!(r.overall_status(), RunStatus::Cancelled);
    }

    #[test]
    fn test_record_round_trip() {
        let mut r = run();
        r.record(ok("format")).unwrap();
        assert!(r.to_record().is_err());
        r.finish();
        let record = r.to_record().unwrap();
        assert_eq!(record.status, "passed");
        assert_eq!(record.commit_ref, "abc123");
        let back = PipelineRun::from_record(&record).unwrap();
        assert_eq!(back, r);
    }

    #[test]
    fn test_report_lists_checks_in_order() {
        let mut r = run();
        r.record(CheckResult::completed(
            "lint",
            CheckStatus::Failed,
            true,
            3,
            vec!["E501 line too long".into()],
        ))
        .unwrap();
        r.record(ok("format")).unwrap();
        r.finish();
        let report = r.report();
        let format_at = report.find("format").unwrap();
        let lint_at = report.find("[FAILED] lint").unwrap();
        assert!(format_at < lint_at);
        assert!(report.contains("    E501 line too long"));
        assert!(report.contains("failed: 1 passed, 1 failed"));
    }
}
