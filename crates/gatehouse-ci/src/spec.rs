//! Check specifications and pipeline identity.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};

use crate::check::{Check, CommandCheck};

/// One configured check. Immutable once a run starts.
#[derive(Clone)]
pub struct CheckSpec {
    /// Unique name within the pipeline.
    pub name: String,

    /// What to invoke.
    pub check: Arc<dyn Check>,

    /// Checks that must pass before this one runs.
    pub depends_on: Vec<String>,

    /// Whether a failure fails the run.
    pub blocking: bool,

    /// Overrides the pipeline's default timeout.
    pub timeout: Option<Duration>,
}

impl CheckSpec {
    /// Blocking check with no dependencies.
    pub fn new(name: impl Into<String>, check: Arc<dyn Check>) -> Self {
        Self {
            name: name.into(),
            check,
            depends_on: Vec::new(),
            blocking: true,
            timeout: None,
        }
    }

    /// Check backed by an external command.
    pub fn command(name: impl Into<String>, command: Vec<String>) -> Self {
        Self::new(name, Arc::new(CommandCheck::new(command)))
    }

    pub fn depends_on<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on = deps.into_iter().map(Into::into).collect();
        self
    }

    pub fn advisory(mut self) -> Self {
        self.blocking = false;
        self
    }

    pub fn with_blocking(mut self, blocking: bool) -> Self {
        self.blocking = blocking;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl fmt::Debug for CheckSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckSpec")
            .field("name", &self.name)
            .field("check", &self.check.describe())
            .field("depends_on", &self.depends_on)
            .field("blocking", &self.blocking)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Deterministic digest of ordered check names.
pub fn spec_digest(specs: &[CheckSpec]) -> String {
    let mut hasher = Sha256::new();
    for spec in specs {
        hasher.update(spec.name.as_bytes());
        hasher.update(b"\0");
    }
    hex::encode(hasher.finalize())
}
