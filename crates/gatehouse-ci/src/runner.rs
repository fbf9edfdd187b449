//! Single-check execution.

use std::time::{Duration, Instant};

use gatehouse_core::{CheckResult, CheckStatus};
use tracing::{debug, warn};

use crate::check::{Invocation, Workspace};
use crate::spec::CheckSpec;

/// Default per-check timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

/// Runs one check and turns whatever happens into a [`CheckResult`].
///
/// Never returns an error and never panics on behalf of the check:
/// non-zero exit is Failed, while spawn errors, panics, and timeouts are
/// Errored.
#[derive(Debug, Clone)]
pub struct CheckRunner {
    default_timeout: Duration,
    artifacts: bool,
}

impl Default for CheckRunner {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl CheckRunner {
    pub fn new(default_timeout: Duration) -> Self {
        Self {
            default_timeout,
            artifacts: false,
        }
    }

    /// Write stdout/stderr under `<workspace>/.gatehouse/artifacts/<check>`.
    pub fn with_artifacts(mut self, enabled: bool) -> Self {
        self.artifacts = enabled;
        self
    }

    pub async fn run(&self, spec: &CheckSpec, workspace: &Workspace) -> CheckResult {
        let start = Instant::now();
        let limit = spec.timeout.unwrap_or(self.default_timeout);

        // The invocation runs on its own task so a panicking check surfaces
        // as a JoinError instead of unwinding into the pipeline.
        let check = spec.check.clone();
        let ws = workspace.clone();
        let handle = tokio::spawn(async move { check.invoke(&ws).await });
        let abort = handle.abort_handle();

        let (status, diagnostics) = match tokio::time::timeout(limit, handle).await {
            Ok(Ok(Ok(invocation))) => {
                if self.artifacts {
                    self.write_artifacts(&spec.name, workspace, &invocation).await;
                }
                classify(invocation)
            }
            Ok(Ok(Err(e))) => (CheckStatus::Errored, vec![format!("error: {:#}", e)]),
            Ok(Err(join_err)) => {
                let what = if join_err.is_panic() {
                    "check panicked"
                } else {
                    "check task was cancelled"
                };
                (CheckStatus::Errored, vec![what.to_string()])
            }
            Err(_) => {
                abort.abort();
                (
                    CheckStatus::Errored,
                    vec![format!("Timeout: check exceeded {} ms", limit.as_millis())],
                )
            }
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        debug!(check = %spec.name, status = %status, duration_ms, "check finished");
        CheckResult::completed(&spec.name, status, spec.blocking, duration_ms, diagnostics)
    }

    async fn write_artifacts(&self, name: &str, workspace: &Workspace, inv: &Invocation) {
        let dir = workspace.artifact_dir(name);
        let result = async {
            tokio::fs::create_dir_all(&dir).await?;
            tokio::fs::write(dir.join("stdout.log"), &inv.stdout).await?;
            tokio::fs::write(dir.join("stderr.log"), &inv.stderr).await?;
            Ok::<_, std::io::Error>(())
        }
        .await;
        if let Err(e) = result {
            warn!(check = %name, error = %e, "failed to write check artifacts");
        }
    }
}

/// Map a completed invocation to a status plus diagnostic lines.
fn classify(inv: Invocation) -> (CheckStatus, Vec<String>) {
    let mut diagnostics: Vec<String> = inv
        .stdout
        .lines()
        .chain(inv.stderr.lines())
        .map(str::trim_end)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect();

    if inv.passed() {
        (CheckStatus::Passed, diagnostics)
    } else {
        diagnostics.push(format!("exited with code {}", inv.exit_code));
        (CheckStatus::Failed, diagnostics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check::Check;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct Panicking;

    #[async_trait]
    impl Check for Panicking {
        fn describe(&self) -> String {
            "panics".into()
        }

        async fn invoke(&self, _workspace: &Workspace) -> anyhow::Result<Invocation> {
            panic!("boom")
        }
    }

    struct Broken;

    #[async_trait]
    impl Check for Broken {
        fn describe(&self) -> String {
            "broken".into()
        }

        async fn invoke(&self, _workspace: &Workspace) -> anyhow::Result<Invocation> {
            anyhow::bail!("tool not installed")
        }
    }

    fn sh(name: &str, script: &str) -> CheckSpec {
        CheckSpec::command(name, vec!["sh".into(), "-c".into(), script.into()])
    }

    #[test]
    fn test_classify_passed_and_failed() {
        let (status, diags) = classify(Invocation {
            exit_code: 0,
            stdout: "ok\n\n".into(),
            stderr: String::new(),
            duration_ms: 1,
        });
        assert_eq!(status, CheckStatus::Passed);
        assert_eq!(diags, vec!["ok"]);

        let (status, diags) = classify(Invocation {
            exit_code: 2,
            stdout: "a.py:1: E501\n".into(),
            stderr: "warn\n".into(),
            duration_ms: 1,
        });
        assert_eq!(status, CheckStatus::Failed);
        assert_eq!(diags, vec!["a.py:1: E501", "warn", "exited with code 2"]);
    }

    #[tokio::test]
    async fn test_run_passing_command() {
        let result = CheckRunner::default()
            .run(&sh("echo", "echo hi"), &Workspace::new("."))
            .await;
        assert_eq!(result.status, CheckStatus::Passed);
        assert_eq!(result.name, "echo");
        assert!(result.blocking);
    }

    #[tokio::test]
    async fn test_run_failing_command() {
        let result = CheckRunner::default()
            .run(&sh("lint", "echo finding; exit 1"), &Workspace::new("."))
            .await;
        assert_eq!(result.status, CheckStatus::Failed);
        assert_eq!(result.diagnostics[0], "finding");
    }

    #[tokio::test]
    async fn test_panic_is_errored() {
        let spec = CheckSpec::new("panics", Arc::new(Panicking));
        let result = CheckRunner::default().run(&spec, &Workspace::new(".")).await;
        assert_eq!(result.status, CheckStatus::Errored);
        assert_eq!(result.diagnostics, vec!["check panicked"]);
    }

    #[tokio::test]
    async fn test_capability_error_is_errored() {
        let spec = CheckSpec::new("broken", Arc::new(Broken));
        let result = CheckRunner::default().run(&spec, &Workspace::new(".")).await;
        assert_eq!(result.status, CheckStatus::Errored);
        assert!(result.diagnostics[0].contains("tool not installed"));
    }

    #[tokio::test]
    async fn test_timeout_is_errored() {
        let spec = sh("slow", "sleep 5").with_timeout(Duration::from_millis(100));
        let started = Instant::now();
        let result = CheckRunner::default().run(&spec, &Workspace::new(".")).await;
        assert_eq!(result.status, CheckStatus::Errored);
        assert!(result.diagnostics[0].starts_with("Timeout"));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_artifacts_written_under_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(dir.path());
        let runner = CheckRunner::default().with_artifacts(true);
        runner.run(&sh("lint", "echo out; echo err >&2"), &ws).await;
        let base = dir.path().join(".gatehouse/artifacts/lint");
        assert_eq!(std::fs::read_to_string(base.join("stdout.log")).unwrap(), "out\n");
        assert_eq!(std::fs::read_to_string(base.join("stderr.log")).unwrap(), "err\n");
    }
}
