//! Promotion requests and decisions.

use serde::{Deserialize, Serialize};

use super::check::CheckStatus;
use super::environment::Environment;
use super::run::PipelineRun;
use super::version::{Version, VersionBump};

/// A proposed merge from one environment into the next.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromotionRequest {
    /// Branch being promoted (its ladder position is checked on submit).
    pub branch: String,
    pub from_env: Environment,
    pub to_env: Environment,

    /// Gate run backing this request.
    pub pipeline_run: PipelineRun,

    pub approval_count: u32,

    /// Commit being promoted. Defaults to the run's trigger commit and must
    /// match it for the request to be allowed.
    pub commit_ref: String,

    /// Version component to increment when this lands in Production.
    #[serde(default)]
    pub bump: VersionBump,

    /// Set when re-promoting the commit of an earlier release.
    #[serde(default)]
    pub rollback_of: Option<Version>,
}

impl PromotionRequest {
    pub fn new(
        branch: impl Into<String>,
        from_env: Environment,
        to_env: Environment,
        pipeline_run: PipelineRun,
        approval_count: u32,
    ) -> Self {
        let commit_ref = pipeline_run.trigger_ref.commit.clone();
        Self {
            branch: branch.into(),
            from_env,
            to_env,
            pipeline_run,
            approval_count,
            commit_ref,
            bump: VersionBump::Patch,
            rollback_of: None,
        }
    }

    pub fn with_bump(mut self, bump: VersionBump) -> Self {
        self.bump = bump;
        self
    }

    pub fn with_commit(mut self, commit_ref: impl Into<String>) -> Self {
        self.commit_ref = commit_ref.into();
        self
    }

    pub fn rollback_of(mut self, version: Version) -> Self {
        self.rollback_of = Some(version);
        self
    }
}

/// Why a promotion was refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum BlockReason {
    WrongEdge {
        from: Environment,
        to: Environment,
    },
    ChecksIncomplete {
        run_id: String,
    },
    /// The backing run validated a different commit than the one promoted.
    RunCommitMismatch {
        run_commit: String,
        commit: String,
    },
    RequiredCheckFailed {
        check: String,
        /// `None` when the run has no result for the check.
        status: Option<CheckStatus>,
    },
    InsufficientApprovals {
        have: u32,
        need: u32,
    },
    PositionMismatch {
        expected: Environment,
        actual: Environment,
    },
}

impl BlockReason {
    /// Stable machine-readable code (matches the serialized `code` tag).
    pub fn code(&self) -> &'static str {
        match self {
            BlockReason::WrongEdge { .. } => "wrong_edge",
            BlockReason::ChecksIncomplete { .. } => "checks_incomplete",
            BlockReason::RunCommitMismatch { .. } => "run_commit_mismatch",
            BlockReason::RequiredCheckFailed { .. } => "required_check_failed",
            BlockReason::InsufficientApprovals { .. } => "insufficient_approvals",
            BlockReason::PositionMismatch { .. } => "position_mismatch",
        }
    }
}

impl std::fmt::Display for BlockReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BlockReason::WrongEdge { from, to } => {
                write!(f, "{} -> {} is not a ladder edge", from, to)
            }
            BlockReason::ChecksIncomplete { run_id } => {
                write!(f, "run {} has not finished", run_id)
            }
            BlockReason::RunCommitMismatch { run_commit, commit } => {
                write!(f, "run validated {} but {} is being promoted", run_commit, commit)
            }
            BlockReason::RequiredCheckFailed { check, status } => match status {
                Some(s) => write!(f, "required check '{}' is {}", check, s),
                None => write!(f, "required check '{}' has no result", check),
            },
            BlockReason::InsufficientApprovals { have, need } => {
                write!(f, "{} of {} required approvals", have, need)
            }
            BlockReason::PositionMismatch { expected, actual } => {
                write!(f, "branch is at {}, request expects {}", actual, expected)
            }
        }
    }
}

/// Outcome of evaluating a promotion request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", content = "reason", rename_all = "snake_case")]
pub enum PromotionDecision {
    Allowed,
    Blocked(BlockReason),
}

impl PromotionDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, PromotionDecision::Allowed)
    }

    pub fn code(&self) -> &'static str {
        match self {
            PromotionDecision::Allowed => "allowed",
            PromotionDecision::Blocked(reason) => reason.code(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_block_reason_serializes_with_code() {
        let decision = PromotionDecision::Blocked(BlockReason::InsufficientApprovals {
            have: 0,
            need: 1,
        });
        let value = serde_json::to_value(&decision).unwrap();
        assert_eq!(
            value,
            json!({
                "decision": "blocked",
                "reason": { "code": "insufficient_approvals", "have": 0, "need": 1 }
            })
        );
        assert_eq!(decision.code(), "insufficient_approvals");
    }

    #[test]
    fn test_allowed_serializes() {
        let value = serde_json::to_value(PromotionDecision::Allowed).unwrap();
        assert_eq!(value, json!({ "decision": "allowed" }));
    }

    #[test]
    fn test_wrong_edge_display() {
        let reason = BlockReason::WrongEdge {
            from: Environment::Feature,
            to: Environment::Production,
        };
        assert_eq!(reason.to_string(), "feature -> production is not a ladder edge");
    }
}
