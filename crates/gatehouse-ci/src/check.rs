//! The check capability and its command-line implementation.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use tokio::process::Command;

/// Directory a pipeline runs against, plus the environment handed to checks.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
    env: Vec<(String, String)>,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            env: Vec::new(),
        }
    }

    /// Add an environment variable for every check in this workspace.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn env(&self) -> &[(String, String)] {
        &self.env
    }

    /// Where artifacts of `check` may be written.
    pub fn artifact_dir(&self, check: &str) -> PathBuf {
        self.root.join(".gatehouse").join("artifacts").join(check)
    }
}

/// Raw outcome of invoking a check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Exit code (0 = success).
    pub exit_code: i32,

    /// Captured stdout.
    pub stdout: String,

    /// Captured stderr.
    pub stderr: String,

    /// Duration in milliseconds.
    pub duration_ms: u64,
}

impl Invocation {
    pub fn passed(&self) -> bool {
        self.exit_code == 0
    }
}

/// Something that can validate a workspace.
///
/// `Ok` with a non-zero exit code means the check ran and reported findings.
/// `Err` means the check could not run at all.
#[async_trait]
pub trait Check: Send + Sync {
    /// Short human-readable description (usually the command line).
    fn describe(&self) -> String;

    async fn invoke(&self, workspace: &Workspace) -> anyhow::Result<Invocation>;
}

/// Runs an external command in the workspace root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandCheck {
    /// Command to execute (first element is executable).
    command: Vec<String>,
}

impl CommandCheck {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }

    pub fn command(&self) -> &[String] {
        &self.command
    }
}

#[async_trait]
impl Check for CommandCheck {
    fn describe(&self) -> String {
        self.command.join(" ")
    }

    async fn invoke(&self, workspace: &Workspace) -> anyhow::Result<Invocation> {
        let start = Instant::now();

        let (exe, args) = self
            .command
            .split_first()
            .ok_or_else(|| anyhow::anyhow!("check has empty command"))?;

        // kill_on_drop: a timed-out check is dropped by the runner and must
        // not leave its process behind.
        let child = Command::new(exe)
            .args(args)
            .current_dir(workspace.root())
            .envs(workspace.env().iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| anyhow::anyhow!("failed to spawn '{}': {}", exe, e))?;

        let output = child.wait_with_output().await?;

        Ok(Invocation {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}
