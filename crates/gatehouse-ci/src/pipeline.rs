//! Gate pipeline orchestration.
//!
//! Checks form a DAG through `depends_on`. The pipeline validates the graph,
//! splits it into topological levels (Kahn waves), and runs each level with
//! bounded concurrency. Levels run strictly in order. Once a blocking check
//! fails, checks that have not started yet (queued siblings included) are
//! skipped as short-circuited.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use gatehouse_core::notify::{GateEvent, Notifier};
use gatehouse_core::{
    obs, CheckResult, CheckStatus, ConfigError, GateError, PipelineRun, RunHistory, SkipReason,
    TriggerRef,
};
use tokio::sync::Semaphore;
use tracing::{info, Instrument};

use crate::cancel::CancelToken;
use crate::check::Workspace;
use crate::runner::{CheckRunner, DEFAULT_TIMEOUT};
use crate::spec::{spec_digest, CheckSpec};

/// Pipeline-wide execution settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Maximum checks running at once within a level.
    pub concurrency: usize,

    /// Timeout for checks without their own.
    pub default_timeout: Duration,

    /// Keep running advisory checks after a blocking failure.
    pub run_advisory_after_failure: bool,

    /// Write per-check stdout/stderr artifacts.
    pub artifacts: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            default_timeout: DEFAULT_TIMEOUT,
            run_advisory_after_failure: true,
            artifacts: false,
        }
    }
}

/// Validate `specs` and group their indices into topological levels.
///
/// Within a level, indices are in declaration order.
pub fn plan_levels(specs: &[CheckSpec]) -> Result<Vec<Vec<usize>>, ConfigError> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    for (i, spec) in specs.iter().enumerate() {
        if index.insert(spec.name.as_str(), i).is_some() {
            return Err(ConfigError::DuplicateCheck {
                name: spec.name.clone(),
            });
        }
    }

    let mut in_degree = vec![0usize; specs.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); specs.len()];
    for (i, spec) in specs.iter().enumerate() {
        let mut seen = HashSet::new();
        for dep in &spec.depends_on {
            let &d = index
                .get(dep.as_str())
                .ok_or_else(|| ConfigError::UnknownDependency {
                    check: spec.name.clone(),
                    dependency: dep.clone(),
                })?;
            if seen.insert(d) {
                in_degree[i] += 1;
                dependents[d].push(i);
            }
        }
    }

    let mut levels = Vec::new();
    let mut current: Vec<usize> = (0..specs.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut placed = 0;
    while !current.is_empty() {
        placed += current.len();
        let mut next = Vec::new();
        for &i in &current {
            for &d in &dependents[i] {
                in_degree[d] -= 1;
                if in_degree[d] == 0 {
                    next.push(d);
                }
            }
        }
        next.sort_unstable();
        levels.push(std::mem::take(&mut current));
        current = next;
    }

    if placed != specs.len() {
        return Err(ConfigError::DependencyCycle {
            checks: find_cycle(specs, &index, &in_degree),
        });
    }
    Ok(levels)
}

/// Walk dependency edges among unplaced nodes until one repeats.
fn find_cycle(specs: &[CheckSpec], index: &HashMap<&str, usize>, in_degree: &[usize]) -> Vec<String> {
    let stuck = |i: usize| in_degree[i] > 0;
    let Some(start) = (0..specs.len()).find(|&i| stuck(i)) else {
        return Vec::new();
    };

    let mut path = vec![start];
    let mut cur = start;
    loop {
        let next = specs[cur]
            .depends_on
            .iter()
            .filter_map(|d| index.get(d.as_str()).copied())
            .find(|&d| stuck(d));
        let Some(next) = next else {
            break;
        };
        if let Some(pos) = path.iter().position(|&p| p == next) {
            let mut cycle: Vec<String> = path[pos..].iter().map(|&i| specs[i].name.clone()).collect();
            cycle.push(specs[next].name.clone());
            return cycle;
        }
        path.push(next);
        cur = next;
    }
    path.into_iter().map(|i| specs[i].name.clone()).collect()
}

/// Runs a list of checks and aggregates them into a [`PipelineRun`].
pub struct GatePipeline {
    config: PipelineConfig,
    runner: CheckRunner,
    history: Option<Arc<dyn RunHistory>>,
    notifier: Notifier,
}

impl GatePipeline {
    pub fn new(config: PipelineConfig) -> Result<Self, ConfigError> {
        if config.concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        let runner = CheckRunner::new(config.default_timeout).with_artifacts(config.artifacts);
        Ok(Self {
            config,
            runner,
            history: None,
            notifier: Notifier::disabled(),
        })
    }

    /// Persist every finished run.
    pub fn with_history(mut self, history: Arc<dyn RunHistory>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn with_notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub async fn execute(
        &self,
        specs: &[CheckSpec],
        workspace: &Workspace,
        trigger: TriggerRef,
    ) -> Result<PipelineRun, GateError> {
        self.execute_with_cancel(specs, workspace, trigger, CancelToken::new())
            .await
    }

    /// Run the pipeline, stopping at the next level boundary once `cancel`
    /// fires. Checks already started are allowed to finish or time out.
    pub async fn execute_with_cancel(
        &self,
        specs: &[CheckSpec],
        workspace: &Workspace,
        trigger: TriggerRef,
        cancel: CancelToken,
    ) -> Result<PipelineRun, GateError> {
        let levels = plan_levels(specs)?;

        let names = specs.iter().map(|s| s.name.clone()).collect();
        let mut run = PipelineRun::new(trigger, names, spec_digest(specs));
        let run_id = run.id.to_string();

        obs::emit_pipeline_started(
            &run_id,
            &run.trigger_ref.branch,
            &run.trigger_ref.commit,
            specs.len(),
        );

        self.run_levels(&mut run, specs, &levels, workspace, &cancel)
            .instrument(obs::run_span(&run_id))
            .await?;

        run.finish();
        let status = run.overall_status();
        obs::emit_pipeline_finished(&run_id, status.as_str(), run.duration_ms());

        if let Some(history) = &self.history {
            if let Err(e) = history.append(run.to_record()?).await {
                obs::emit_persist_failed(&run_id, &e);
                return Err(e.into());
            }
        }
        self.notifier.emit(GateEvent::pipeline_completed(&run));

        Ok(run)
    }

    async fn run_levels(
        &self,
        run: &mut PipelineRun,
        specs: &[CheckSpec],
        levels: &[Vec<usize>],
        workspace: &Workspace,
        cancel: &CancelToken,
    ) -> Result<(), GateError> {
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency));
        let mut short_circuit: Option<String> = None;
        // First blocking failure of the run, visible to checks still queued.
        let tripped: Arc<Mutex<Option<String>>> = Arc::default();
        let halt_advisory = !self.config.run_advisory_after_failure;

        for (depth, level) in levels.iter().enumerate() {
            if cancel.is_cancelled() {
                info!(level = depth, "run cancelled, skipping remaining checks");
                for &i in levels[depth..].iter().flatten() {
                    let spec = &specs[i];
                    run.record(CheckResult::skipped(
                        &spec.name,
                        spec.blocking,
                        SkipReason::Cancelled,
                    ))?;
                }
                run.mark_cancelled();
                return Ok(());
            }

            let mut scheduled = Vec::new();
            let mut level_results: Vec<CheckResult> = Vec::new();
            for &i in level {
                let spec = &specs[i];
                if let Some(reason) = self.skip_reason(spec, run, short_circuit.as_deref()) {
                    level_results.push(CheckResult::skipped(&spec.name, spec.blocking, reason));
                } else {
                    scheduled.push(i);
                }
            }

            let mut handles = Vec::with_capacity(scheduled.len());
            for &i in &scheduled {
                let spec = specs[i].clone();
                let ws = workspace.clone();
                let runner = self.runner.clone();
                let semaphore = Arc::clone(&semaphore);
                let cancel = cancel.clone();
                let tripped = Arc::clone(&tripped);
                handles.push(tokio::spawn(
                    async move {
                        let _permit = semaphore.acquire_owned().await.ok();
                        // Cancelled while queued on the semaphore: never started.
                        if cancel.is_cancelled() {
                            return CheckResult::skipped(
                                &spec.name,
                                spec.blocking,
                                SkipReason::Cancelled,
                            );
                        }
                        if spec.blocking || halt_advisory {
                            let cause = tripped.lock().ok().and_then(|c| c.clone());
                            if let Some(cause) = cause {
                                return CheckResult::skipped(
                                    &spec.name,
                                    spec.blocking,
                                    SkipReason::ShortCircuited { cause },
                                );
                            }
                        }
                        let result = runner.run(&spec, &ws).await;
                        if result.fails_run() {
                            if let Ok(mut cause) = tripped.lock() {
                                cause.get_or_insert_with(|| spec.name.clone());
                            }
                        }
                        result
                    }
                    .in_current_span(),
                ));
            }

            let joined = futures::future::join_all(handles).await;
            for (&i, joined) in scheduled.iter().zip(joined) {
                let spec = &specs[i];
                let result = joined.unwrap_or_else(|e| {
                    CheckResult::completed(
                        &spec.name,
                        CheckStatus::Errored,
                        spec.blocking,
                        0,
                        vec![format!("check task failed: {}", e)],
                    )
                });
                level_results.push(result);
            }

            level_results.sort_by_key(|r| specs.iter().position(|s| s.name == r.name));
            let run_id = run.id.to_string();
            for result in level_results {
                obs::emit_check_finished(
                    &run_id,
                    &result.name,
                    result.status.as_str(),
                    result.duration_ms,
                );
                if result.skip_reason == Some(SkipReason::Cancelled) {
                    run.mark_cancelled();
                }
                let induced = matches!(
                    result.skip_reason,
                    Some(SkipReason::ShortCircuited { .. })
                );
                if short_circuit.is_none() && result.fails_run() && !induced {
                    short_circuit = Some(result.name.clone());
                }
                run.record(result)?;
            }
        }
        Ok(())
    }

    fn skip_reason(
        &self,
        spec: &CheckSpec,
        run: &PipelineRun,
        short_circuit: Option<&str>,
    ) -> Option<SkipReason> {
        if let Some(dep) = spec
            .depends_on
            .iter()
            .find(|d| run.status_of(d) != Some(CheckStatus::Passed))
        {
            return Some(SkipReason::DependencyFailed {
                dependency: dep.clone(),
            });
        }
        match short_circuit {
            Some(cause) if spec.blocking || !self.config.run_advisory_after_failure => {
                Some(SkipReason::ShortCircuited {
                    cause: cause.to_string(),
                })
            }
            _ => None,
        }
    }
}
