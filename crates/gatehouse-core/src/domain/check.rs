//! Check outcomes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Terminal status of a single check in a run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum CheckStatus {
    Passed,
    Failed,
    Skipped,
    Errored,
}

impl CheckStatus {
    /// Failed and Errored both count against a blocking check.
    pub fn is_failure(self) -> bool {
        matches!(self, CheckStatus::Failed | CheckStatus::Errored)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CheckStatus::Passed => "passed",
            CheckStatus::Failed => "failed",
            CheckStatus::Skipped => "skipped",
            CheckStatus::Errored => "errored",
        }
    }
}

impl std::fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a check was recorded as Skipped instead of being run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SkipReason {
    /// A `depends_on` entry did not pass.
    DependencyFailed { dependency: String },
    /// An earlier blocking failure stopped the pipeline before this check's level.
    ShortCircuited { cause: String },
    /// The run was cancelled before this check was scheduled.
    Cancelled,
}

impl SkipReason {
    /// Skips that stem from a failure, as opposed to cancellation.
    pub fn is_failure_induced(&self) -> bool {
        !matches!(self, SkipReason::Cancelled)
    }

    fn describe(&self) -> String {
        match self {
            SkipReason::DependencyFailed { dependency } => {
                format!("skipped: dependency '{}' did not pass", dependency)
            }
            SkipReason::ShortCircuited { cause } => {
                format!("skipped: pipeline short-circuited after blocking failure of '{}'", cause)
            }
            SkipReason::Cancelled => "skipped: run cancelled before scheduling".to_string(),
        }
    }
}

/// Result of one check in one run. Produced once, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CheckResult {
    /// Check name (unique within a run).
    pub name: String,

    pub status: CheckStatus,

    /// Whether a failure of this check fails the run.
    pub blocking: bool,

    /// Wall-clock duration in milliseconds (0 for skipped checks).
    pub duration_ms: u64,

    /// Ordered diagnostic lines.
    pub diagnostics: Vec<String>,

    /// Set only when `status` is Skipped.
    pub skip_reason: Option<SkipReason>,

    /// When the result was produced.
    pub timestamp: DateTime<Utc>,
}

impl CheckResult {
    /// Result of a check that ran to completion (or crashed / timed out).
    pub fn completed(
        name: impl Into<String>,
        status: CheckStatus,
        blocking: bool,
        duration_ms: u64,
        diagnostics: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            status,
            blocking,
            duration_ms,
            diagnostics,
            skip_reason: None,
            timestamp: Utc::now(),
        }
    }

    /// Result of a check that was never run.
    pub fn skipped(name: impl Into<String>, blocking: bool, reason: SkipReason) -> Self {
        Self {
            name: name.into(),
            status: CheckStatus::Skipped,
            blocking,
            duration_ms: 0,
            diagnostics: vec![reason.describe()],
            skip_reason: Some(reason),
            timestamp: Utc::now(),
        }
    }

    pub fn passed(&self) -> bool {
        self.status == CheckStatus::Passed
    }

    /// Whether this result forces the run's overall status to Failed.
    pub fn fails_run(&self) -> bool {
        if !self.blocking {
            return false;
        }
        match self.status {
            CheckStatus::Failed | CheckStatus::Errored => true,
            CheckStatus::Skipped => self
                .skip_reason
                .as_ref()
                .map(SkipReason::is_failure_induced)
                .unwrap_or(true),
            CheckStatus::Passed => false,
        }
    }
}
