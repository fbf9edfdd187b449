//! Domain-level error taxonomy for Gatehouse.

use gatehouse_state::StorageError;

/// Configuration problems detected before any run starts. Always fatal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("dependency cycle among checks: {}", checks.join(" -> "))]
    DependencyCycle { checks: Vec<String> },

    #[error("check '{check}' depends on unknown check '{dependency}'")]
    UnknownDependency { check: String, dependency: String },

    #[error("duplicate check name: {name}")]
    DuplicateCheck { name: String },

    #[error("policy for {environment} requires unknown check '{check}'")]
    UnknownPolicyCheck { environment: String, check: String },

    #[error("direct push is not allowed on protected environment {environment}")]
    DirectPushNotAllowed { environment: String },

    #[error("concurrency must be at least 1")]
    ZeroConcurrency,

    #[error("{scope} timeout must be at least 1 second")]
    ZeroTimeout { scope: String },

    #[error("policy for {environment} is given twice, as [policies.{first}] and [policies.{second}]")]
    DuplicatePolicy {
        environment: String,
        first: String,
        second: String,
    },

    #[error("unknown environment: {0}")]
    UnknownEnvironment(String),

    #[error("unknown builtin check: {0}")]
    UnknownBuiltin(String),

    #[error("check '{name}' must set exactly one of `builtin` or `command`")]
    InvalidCheckCommand { name: String },

    #[error("cannot read config file {path}: {reason}")]
    Unreadable { path: String, reason: String },

    #[error("invalid config: {0}")]
    Invalid(String),
}

impl ConfigError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            ConfigError::DependencyCycle { .. } => "config.dependency_cycle",
            ConfigError::UnknownDependency { .. } => "config.unknown_dependency",
            ConfigError::DuplicateCheck { .. } => "config.duplicate_check",
            ConfigError::UnknownPolicyCheck { .. } => "config.unknown_policy_check",
            ConfigError::DirectPushNotAllowed { .. } => "config.direct_push_not_allowed",
            ConfigError::ZeroConcurrency => "config.zero_concurrency",
            ConfigError::ZeroTimeout { .. } => "config.zero_timeout",
            ConfigError::DuplicatePolicy { .. } => "config.duplicate_policy",
            ConfigError::UnknownEnvironment(_) => "config.unknown_environment",
            ConfigError::UnknownBuiltin(_) => "config.unknown_builtin",
            ConfigError::InvalidCheckCommand { .. } => "config.invalid_check_command",
            ConfigError::Unreadable { .. } => "config.unreadable",
            ConfigError::Invalid(_) => "config.invalid",
        }
    }
}

/// Errors raised while applying results, promotions, and releases.
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("version conflict: {version} is already released")]
    VersionConflict { version: String },

    #[error("invalid version '{0}'")]
    InvalidVersion(String),

    #[error("run {run_id} is already finished")]
    RunFinalized { run_id: String },

    #[error("run {run_id} already has a result for check '{check}'")]
    DuplicateResult { run_id: String, check: String },

    #[error("branch not tracked: {0}")]
    UnknownBranch(String),

    #[error("branch already tracked: {0}")]
    BranchExists(String),

    #[error("no release with version {0}")]
    UnknownRelease(String),

    #[error("release {version} is commit {release_commit}, but the run checked {run_commit}")]
    RollbackRunMismatch {
        version: String,
        release_commit: String,
        run_commit: String,
    },

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl GateError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            GateError::Config(e) => e.code(),
            GateError::VersionConflict { .. } => "release.version_conflict",
            GateError::InvalidVersion(_) => "release.invalid_version",
            GateError::RunFinalized { .. } => "run.finalized",
            GateError::DuplicateResult { .. } => "run.duplicate_result",
            GateError::UnknownBranch(_) => "ladder.unknown_branch",
            GateError::BranchExists(_) => "ladder.branch_exists",
            GateError::UnknownRelease(_) => "release.unknown",
            GateError::RollbackRunMismatch { .. } => "release.rollback_run_mismatch",
            GateError::Storage(_) => "storage.error",
            GateError::Serialization(_) => "serialization.error",
        }
    }
}

/// Result type for Gatehouse domain operations.
pub type Result<T> = std::result::Result<T, GateError>;
