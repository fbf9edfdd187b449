//! Promotion state machine over the environment ladder.
//!
//! [`evaluate`] is a pure function of a request and the target environment's
//! policy. [`PromotionStateMachine::submit`] applies a request: it serializes
//! per branch, checks the branch's current position, evaluates, tags a
//! release when entering Production, and only then advances the branch.

use std::collections::HashMap;
use std::sync::Arc;

use gatehouse_state::ReleaseRecord;
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::domain::{
    BlockReason, BranchPolicy, CheckStatus, Environment, GateError, PipelineRun, PolicySet,
    PromotionDecision, PromotionRequest, Result, Version, VersionBump,
};
use crate::notify::{GateEvent, Notifier};
use crate::obs;
use crate::release_tagger::ReleaseTagger;

/// Decide a request against `policy` (the target environment's policy).
///
/// Checks, in order: ladder edge, run completion, run commit against the
/// promoted commit, required checks in the policy's declared order, approvals.
pub fn evaluate(req: &PromotionRequest, policy: &BranchPolicy) -> PromotionDecision {
    if req.from_env.successor() != Some(req.to_env) {
        return PromotionDecision::Blocked(BlockReason::WrongEdge {
            from: req.from_env,
            to: req.to_env,
        });
    }

    let run = &req.pipeline_run;
    if !run.is_finished() {
        return PromotionDecision::Blocked(BlockReason::ChecksIncomplete {
            run_id: run.id.to_string(),
        });
    }

    if run.trigger_ref.commit != req.commit_ref {
        return PromotionDecision::Blocked(BlockReason::RunCommitMismatch {
            run_commit: run.trigger_ref.commit.clone(),
            commit: req.commit_ref.clone(),
        });
    }

    for check in &policy.required_checks {
        let status = run.status_of(check);
        if status != Some(CheckStatus::Passed) {
            return PromotionDecision::Blocked(BlockReason::RequiredCheckFailed {
                check: check.clone(),
                status,
            });
        }
    }

    if req.approval_count < policy.required_approvals {
        return PromotionDecision::Blocked(BlockReason::InsufficientApprovals {
            have: req.approval_count,
            need: policy.required_approvals,
        });
    }

    PromotionDecision::Allowed
}

/// Current ladder position of every live branch.
///
/// Each branch has its own async mutex; requests on different branches never
/// wait on each other.
#[derive(Default)]
pub struct LadderPositions {
    cells: RwLock<HashMap<String, Arc<Mutex<Environment>>>>,
}

impl LadderPositions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking `branch` at `at`.
    pub async fn create_branch(&self, branch: &str, at: Environment) -> Result<()> {
        let mut cells = self.cells.write().await;
        if cells.contains_key(branch) {
            return Err(GateError::BranchExists(branch.to_string()));
        }
        cells.insert(branch.to_string(), Arc::new(Mutex::new(at)));
        Ok(())
    }

    /// Track `branch` at `at` unless it is already tracked. Returns its position.
    pub async fn ensure_branch(&self, branch: &str, at: Environment) -> Environment {
        let cell = {
            let mut cells = self.cells.write().await;
            cells
                .entry(branch.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(at)))
                .clone()
        };
        let position = *cell.lock().await;
        position
    }

    pub async fn retire_branch(&self, branch: &str) -> Result<Environment> {
        let cell = self
            .cells
            .write()
            .await
            .remove(branch)
            .ok_or_else(|| GateError::UnknownBranch(branch.to_string()))?;
        let position = *cell.lock().await;
        Ok(position)
    }

    pub async fn position(&self, branch: &str) -> Option<Environment> {
        let cell = self.cells.read().await.get(branch).cloned()?;
        let position = *cell.lock().await;
        Some(position)
    }

    /// Tracked branches, sorted by name.
    pub async fn branches(&self) -> Vec<(String, Environment)> {
        let cells: Vec<(String, Arc<Mutex<Environment>>)> = self
            .cells
            .read()
            .await
            .iter()
            .map(|(k, v)| (k.clone(), Arc::clone(v)))
            .collect();
        let mut out = Vec::with_capacity(cells.len());
        for (name, cell) in cells {
            out.push((name, *cell.lock().await));
        }
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    async fn cell(&self, branch: &str) -> Result<Arc<Mutex<Environment>>> {
        self.cells
            .read()
            .await
            .get(branch)
            .cloned()
            .ok_or_else(|| GateError::UnknownBranch(branch.to_string()))
    }
}

/// What applying a request did.
#[derive(Debug, Clone, Serialize)]
pub struct PromotionOutcome {
    pub decision: PromotionDecision,
    /// Branch position after the request.
    pub position: Environment,
    /// Set when the request promoted into Production.
    pub release: Option<ReleaseRecord>,
}

/// Applies promotion requests against branch positions and policies.
pub struct PromotionStateMachine {
    policies: PolicySet,
    ladder: LadderPositions,
    tagger: Arc<ReleaseTagger>,
    notifier: Notifier,
}

impl PromotionStateMachine {
    pub fn new(policies: PolicySet, tagger: Arc<ReleaseTagger>) -> Self {
        Self {
            policies,
            ladder: LadderPositions::new(),
            tagger,
            notifier: Notifier::disabled(),
        }
    }

    pub fn with_notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn ladder(&self) -> &LadderPositions {
        &self.ladder
    }

    pub fn policies(&self) -> &PolicySet {
        &self.policies
    }

    /// Evaluate against the configured policy of the request's target.
    pub fn evaluate(&self, req: &PromotionRequest) -> PromotionDecision {
        evaluate(req, &self.policies.policy(req.to_env))
    }

    /// Apply a request.
    ///
    /// Blocked decisions are returned as `Ok`. An `Err` means the request
    /// could not be applied at all (untracked branch, tagging failure); the
    /// branch position is unchanged in that case.
    pub async fn submit(&self, req: PromotionRequest) -> Result<PromotionOutcome> {
        let cell = self.ladder.cell(&req.branch).await?;
        let mut position = cell.lock().await;

        let decision = if *position != req.from_env {
            PromotionDecision::Blocked(BlockReason::PositionMismatch {
                expected: req.from_env,
                actual: *position,
            })
        } else {
            self.evaluate(&req)
        };

        obs::emit_promotion_evaluated(
            &req.branch,
            req.from_env.as_str(),
            req.to_env.as_str(),
            decision.code(),
        );

        if !decision.is_allowed() {
            self.notifier
                .emit(GateEvent::promotion_blocked(&req, &decision));
            return Ok(PromotionOutcome {
                decision,
                position: *position,
                release: None,
            });
        }

        let release = if req.to_env == Environment::Production {
            let record = self
                .tagger
                .tag(&req.commit_ref, &req.branch, req.bump, req.rollback_of)
                .await?;
            self.notifier.emit(GateEvent::release_created(&record));
            Some(record)
        } else {
            None
        };

        debug!(branch = %req.branch, to = %req.to_env, "advancing branch");
        *position = req.to_env;

        Ok(PromotionOutcome {
            decision,
            position: *position,
            release,
        })
    }

    /// Build a request that re-promotes the commit of release `version`
    /// from Uat into Production.
    ///
    /// `pipeline_run` must be a gate run of that release's commit.
    pub async fn rollback_request(
        &self,
        branch: &str,
        version: Version,
        pipeline_run: PipelineRun,
        approval_count: u32,
    ) -> Result<PromotionRequest> {
        let wanted = version.to_string();
        let target = self
            .tagger
            .log()
            .history()
            .await?
            .into_iter()
            .find(|r| r.version == wanted)
            .ok_or(GateError::UnknownRelease(wanted))?;

        if pipeline_run.trigger_ref.commit != target.commit_ref {
            return Err(GateError::RollbackRunMismatch {
                version: version.to_string(),
                release_commit: target.commit_ref,
                run_commit: pipeline_run.trigger_ref.commit,
            });
        }

        Ok(PromotionRequest::new(
            branch,
            Environment::Uat,
            Environment::Production,
            pipeline_run,
            approval_count,
        )
        .with_commit(target.commit_ref)
        .with_bump(VersionBump::Patch)
        .rollback_of(version))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CheckResult, TriggerRef};
    use gatehouse_state::fakes::MemoryReleaseLog;

    fn finished_run(statuses: &[(&str, CheckStatus)]) -> PipelineRun {
        let names = statuses.iter().map(|(n, _)| n.to_string()).collect();
        let mut run = PipelineRun::new(TriggerRef::new("feature/x", "abc"), names, "d");
        for (name, status) in statuses {
            run.record(CheckResult::completed(*name, *status, true, 1, vec![]))
                .unwrap();
        }
        run.finish();
        run
    }

    fn policy() -> BranchPolicy {
        BranchPolicy::new(1, vec!["format".into(), "lint".into(), "tests".into()])
    }

    #[test]
    fn test_evaluate_order_wrong_edge_first() {
        let run = PipelineRun::new(TriggerRef::new("b", "c"), vec![], "d");
        let req = PromotionRequest::new("b", Environment::Feature, Environment::Uat, run, 0);
        assert_eq!(
            evaluate(&req, &policy()),
            PromotionDecision::Blocked(BlockReason::WrongEdge {
                from: Environment::Feature,
                to: Environment::Uat
            })
        );
    }

    #[test]
    fn test_evaluate_unfinished_run() {
        let run = PipelineRun::new(TriggerRef::new("b", "c"), vec![], "d");
        let id = run.id.to_string();
        let req = PromotionRequest::new("b", Environment::Feature, Environment::Development, run, 5);
        assert_eq!(
            evaluate(&req, &policy()),
            PromotionDecision::Blocked(BlockReason::ChecksIncomplete { run_id: id })
        );
    }

    #[test]
    fn test_first_failing_required_check_in_policy_order() {
        let run = finished_run(&[
            ("tests", CheckStatus::Failed),
            ("format", CheckStatus::Passed),
            ("lint", CheckStatus::Errored),
        ]);
        let req = PromotionRequest::new("b", Environment::Feature, Environment::Development, run, 5);
        assert_eq!(
            evaluate(&req, &policy()),
            PromotionDecision::Blocked(BlockReason::RequiredCheckFailed {
                check: "lint".into(),
                status: Some(CheckStatus::Errored)
            })
        );
    }

    #[test]
    fn test_missing_required_check_counts_as_not_passed() {
        let run = finished_run(&[("format", CheckStatus::Passed), ("lint", CheckStatus::Passed)]);
        let req = PromotionRequest::new("b", Environment::Feature, Environment::Development, run, 5);
        assert_eq!(
            evaluate(&req, &policy()),
            PromotionDecision::Blocked(BlockReason::RequiredCheckFailed {
                check: "tests".into(),
                status: None
            })
        );
    }

    #[test]
    fn test_run_for_other_commit_is_blocked() {
        let run = finished_run(&[
            ("format", CheckStatus::Passed),
            ("lint", CheckStatus::Passed),
            ("tests", CheckStatus::Passed),
        ]);
        let req = PromotionRequest::new("b", Environment::Feature, Environment::Development, run, 5)
            .with_commit("def");
        let decision = evaluate(&req, &policy());
        assert_eq!(
            decision,
            PromotionDecision::Blocked(BlockReason::RunCommitMismatch {
                run_commit: "abc".into(),
                commit: "def".into()
            })
        );
        assert_eq!(decision.code(), "run_commit_mismatch");
    }

    #[test]
    fn test_commit_mismatch_checked_after_completion() {
        let run = PipelineRun::new(TriggerRef::new("b", "abc"), vec![], "d");
        let req = PromotionRequest::new("b", Environment::Feature, Environment::Development, run, 5)
            .with_commit("def");
        assert_eq!(evaluate(&req, &policy()).code(), "checks_incomplete");
    }

    #[tokio::test]
    async fn test_ladder_create_and_retire() {
        let ladder = LadderPositions::new();
        ladder
            .create_branch("feature/a", Environment::Feature)
            .await
            .unwrap();
        assert!(matches!(
            ladder.create_branch("feature/a", Environment::Feature).await,
            Err(GateError::BranchExists(_))
        ));
        assert_eq!(ladder.position("feature/a").await, Some(Environment::Feature));
        assert_eq!(
            ladder.ensure_branch("feature/a", Environment::Uat).await,
            Environment::Feature
        );
        assert_eq!(
            ladder.retire_branch("feature/a").await.unwrap(),
            Environment::Feature
        );
        assert_eq!(ladder.position("feature/a").await, None);
        assert!(ladder.retire_branch("feature/a").await.is_err());
    }

    #[tokio::test]
    async fn test_submit_untracked_branch_errors() {
        let machine = PromotionStateMachine::new(
            PolicySet::default(),
            Arc::new(ReleaseTagger::new(Arc::new(MemoryReleaseLog::new()))),
        );
        let run = finished_run(&[]);
        let req = PromotionRequest::new(
            "ghost",
            Environment::Feature,
            Environment::Development,
            run,
            1,
        );
        assert!(matches!(
            machine.submit(req).await,
            Err(GateError::UnknownBranch(_))
        ));
    }
}
