//! `gatehouse.toml` loading.
//!
//! ```toml
//! [pipeline]
//! concurrency = 4
//! default_timeout_secs = 600
//! run_advisory_after_failure = true
//! artifacts = false
//!
//! [project]
//! min_coverage = 80
//! python_version_pin = "3.11"
//! environment = "development"
//!
//! [[checks]]
//! name = "format"
//! builtin = "formatter"
//!
//! [[checks]]
//! name = "tests"
//! command = ["pytest", "-q"]
//! depends_on = ["format"]
//! timeout_secs = 900
//!
//! [policies.development]
//! required_approvals = 1
//! required_checks = ["format", "tests"]
//!
//! [notify]
//! webhook_url = "https://hooks.example.com/T000/B000"
//! ```

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use gatehouse_core::{BranchPolicy, ConfigError, Environment, PolicySet};
use serde::{Deserialize, Serialize};

use crate::builtin::BuiltinCheck;
use crate::check::Workspace;
use crate::pipeline::{plan_levels, PipelineConfig};
use crate::spec::CheckSpec;

/// Project settings passed through to checks; never interpreted here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectSettings {
    pub min_coverage: Option<u32>,
    pub python_version_pin: Option<String>,
    pub environment: Option<String>,
}

impl ProjectSettings {
    /// Environment variables exposed to every check.
    pub fn env_vars(&self) -> Vec<(String, String)> {
        let mut vars = Vec::new();
        if let Some(min) = self.min_coverage {
            vars.push(("GATEHOUSE_MIN_COVERAGE".to_string(), min.to_string()));
        }
        if let Some(pin) = &self.python_version_pin {
            vars.push(("GATEHOUSE_PYTHON_VERSION".to_string(), pin.clone()));
        }
        if let Some(env) = &self.environment {
            vars.push(("GATEHOUSE_ENVIRONMENT".to_string(), env.clone()));
        }
        vars
    }

    /// Workspace at `root` carrying these settings as environment variables.
    pub fn workspace(&self, root: impl Into<std::path::PathBuf>) -> Workspace {
        self.env_vars()
            .into_iter()
            .fold(Workspace::new(root), |ws, (k, v)| ws.with_env(k, v))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineSection {
    pub concurrency: usize,
    pub default_timeout_secs: u64,
    pub run_advisory_after_failure: bool,
    pub artifacts: bool,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            concurrency: 4,
            default_timeout_secs: 600,
            run_advisory_after_failure: true,
            artifacts: false,
        }
    }
}

/// One `[[checks]]` entry. Exactly one of `builtin` or `command` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CheckEntry {
    pub name: String,
    #[serde(default)]
    pub builtin: Option<String>,
    #[serde(default)]
    pub command: Option<Vec<String>>,
    #[serde(default = "default_true")]
    pub blocking: bool,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PolicyEntry {
    pub required_approvals: u32,
    pub required_checks: Vec<String>,
    pub allow_direct_push: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NotifySection {
    pub webhook_url: Option<String>,
}

/// Parsed configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GateConfig {
    pub pipeline: PipelineSection,
    pub project: ProjectSettings,
    pub checks: Vec<CheckEntry>,
    pub policies: BTreeMap<String, PolicyEntry>,
    pub notify: NotifySection,
}

/// Configuration validated and turned into runnable pieces.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub pipeline: PipelineConfig,
    pub specs: Vec<CheckSpec>,
    pub policies: PolicySet,
    pub project: ProjectSettings,
    pub webhook_url: Option<String>,
}

impl GateConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        toml::from_str(raw).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Unreadable {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&raw)
    }

    /// Load `path` if given, otherwise the builtin configuration.
    pub fn load_or_builtin(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::builtin()),
        }
    }

    /// Python quality gate: format, lint, type-check, security, tests, standards.
    pub fn builtin() -> Self {
        let entry = |b: BuiltinCheck, blocking: bool, deps: &[&str]| CheckEntry {
            name: b.default_name().to_string(),
            builtin: Some(b.id().to_string()),
            command: None,
            blocking,
            depends_on: deps.iter().map(|d| d.to_string()).collect(),
            timeout_secs: None,
        };
        let checks = vec![
            entry(BuiltinCheck::Formatter, true, &[]),
            entry(BuiltinCheck::Linter, true, &[]),
            entry(BuiltinCheck::TypeChecker, true, &[]),
            entry(BuiltinCheck::SecurityScanner, true, &[]),
            entry(BuiltinCheck::TestRunner, true, &["format", "lint"]),
            entry(BuiltinCheck::Standards, false, &[]),
        ];

        let names = |list: &[&str]| list.iter().map(|c| c.to_string()).collect::<Vec<_>>();
        let full = names(&["format", "lint", "type-check", "security", "tests"]);
        let mut policies = BTreeMap::new();
        policies.insert(
            "development".to_string(),
            PolicyEntry {
                required_approvals: 1,
                required_checks: names(&["format", "lint", "tests"]),
                allow_direct_push: false,
            },
        );
        policies.insert(
            "uat".to_string(),
            PolicyEntry {
                required_approvals: 1,
                required_checks: full.clone(),
                allow_direct_push: false,
            },
        );
        policies.insert(
            "production".to_string(),
            PolicyEntry {
                required_approvals: 2,
                required_checks: full,
                allow_direct_push: false,
            },
        );

        Self {
            pipeline: PipelineSection::default(),
            project: ProjectSettings {
                min_coverage: Some(80),
                python_version_pin: None,
                environment: None,
            },
            checks,
            policies,
            notify: NotifySection::default(),
        }
    }

    /// Validate everything and build check specs and policies.
    ///
    /// An empty `[[checks]]` list falls back to the builtin checks. Environments
    /// absent from `[policies]` keep the default ladder policy: approvals only,
    /// no required checks.
    pub fn resolve(&self) -> Result<ResolvedConfig, ConfigError> {
        if self.pipeline.concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        if self.pipeline.default_timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout {
                scope: "pipeline default".to_string(),
            });
        }

        let builtin;
        let entries = if self.checks.is_empty() {
            builtin = Self::builtin().checks;
            &builtin
        } else {
            &self.checks
        };

        let specs = entries
            .iter()
            .map(|e| self.build_spec(e))
            .collect::<Result<Vec<_>, _>>()?;
        plan_levels(&specs)?;

        let mut policies = PolicySet::default();
        let mut keys: BTreeMap<Environment, &str> = BTreeMap::new();
        for (key, entry) in &self.policies {
            let env = Environment::from_str(key)?;
            if let Some(first) = keys.insert(env, key) {
                return Err(ConfigError::DuplicatePolicy {
                    environment: env.to_string(),
                    first: first.to_string(),
                    second: key.clone(),
                });
            }
            policies.set(
                env,
                BranchPolicy {
                    required_approvals: entry.required_approvals,
                    required_checks: entry.required_checks.clone(),
                    allow_direct_push: entry.allow_direct_push,
                },
            );
        }
        let known: HashSet<String> = specs.iter().map(|s| s.name.clone()).collect();
        policies.validate(&known)?;

        Ok(ResolvedConfig {
            pipeline: PipelineConfig {
                concurrency: self.pipeline.concurrency,
                default_timeout: Duration::from_secs(self.pipeline.default_timeout_secs),
                run_advisory_after_failure: self.pipeline.run_advisory_after_failure,
                artifacts: self.pipeline.artifacts,
            },
            specs,
            policies,
            project: self.project.clone(),
            webhook_url: self.notify.webhook_url.clone(),
        })
    }

    fn build_spec(&self, entry: &CheckEntry) -> Result<CheckSpec, ConfigError> {
        let check = match (&entry.builtin, &entry.command) {
            (Some(id), None) => BuiltinCheck::from_str(id)?.into_check(&self.project),
            (None, Some(cmd)) if !cmd.is_empty() => {
                std::sync::Arc::new(crate::check::CommandCheck::new(cmd.clone()))
            }
            _ => {
                return Err(ConfigError::InvalidCheckCommand {
                    name: entry.name.clone(),
                })
            }
        };

        if entry.timeout_secs == Some(0) {
            return Err(ConfigError::ZeroTimeout {
                scope: format!("check '{}'", entry.name),
            });
        }

        let mut spec = CheckSpec::new(&entry.name, check)
            .depends_on(entry.depends_on.iter().cloned())
            .with_blocking(entry.blocking);
        if let Some(secs) = entry.timeout_secs {
            spec = spec.with_timeout(Duration::from_secs(secs));
        }
        Ok(spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_config_resolves() {
        let resolved = GateConfig::builtin().resolve().unwrap();
        let names: Vec<&str> = resolved.specs.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["format", "lint", "type-check", "security", "tests", "standards"]
        );
        assert!(!resolved.specs[5].blocking);
        assert_eq!(
            resolved
                .policies
                .policy(Environment::Production)
                .required_approvals,
            2
        );
        assert_eq!(resolved.pipeline.default_timeout, Duration::from_secs(600));
    }

    #[test]
    fn test_parse_full_file() {
        let raw = r#"
            [pipeline]
            concurrency = 2
            default_timeout_secs = 30
            run_advisory_after_failure = false

            [project]
            min_coverage = 90
            environment = "uat"

            [[checks]]
            name = "format"
            builtin = "formatter"

            [[checks]]
            name = "unit"
            command = ["pytest", "-q"]
            depends_on = ["format"]
            timeout_secs = 5

            [[checks]]
            name = "docs"
            command = ["mkdocs", "build"]
            blocking = false

            [policies.dev]
            required_approvals = 3
            required_checks = ["unit"]
        "#;
        let resolved = GateConfig::from_toml_str(raw).unwrap().resolve().unwrap();
        assert_eq!(resolved.pipeline.concurrency, 2);
        assert!(!resolved.pipeline.run_advisory_after_failure);
        assert_eq!(resolved.specs[1].depends_on, vec!["format"]);
        assert_eq!(resolved.specs[1].timeout, Some(Duration::from_secs(5)));
        assert_eq!(resolved.specs[1].check.describe(), "pytest -q");
        assert!(!resolved.specs[2].blocking);
        let dev = resolved.policies.policy(Environment::Development);
        assert_eq!(dev.required_approvals, 3);
        assert_eq!(dev.required_checks, vec!["unit"]);
        assert_eq!(resolved.project.min_coverage, Some(90));
    }

    #[test]
    fn test_rejects_check_with_both_builtin_and_command() {
        let raw = r#"
            [[checks]]
            name = "x"
            builtin = "linter"
            command = ["flake8"]
        "#;
        let err = GateConfig::from_toml_str(raw).unwrap().resolve().unwrap_err();
        assert_eq!(err, ConfigError::InvalidCheckCommand { name: "x".into() });
    }

    #[test]
    fn test_rejects_unknown_policy_check_and_direct_push() {
        let raw = r#"
            [[checks]]
            name = "lint"
            builtin = "linter"

            [policies.uat]
            required_checks = ["lint", "e2e"]
        "#;
        let err = GateConfig::from_toml_str(raw).unwrap().resolve().unwrap_err();
        assert_eq!(err.code(), "config.unknown_policy_check");

        let raw = r#"
            [[checks]]
            name = "lint"
            builtin = "linter"

            [policies.main]
            allow_direct_push = true
        "#;
        let err = GateConfig::from_toml_str(raw).unwrap().resolve().unwrap_err();
        assert_eq!(err.code(), "config.direct_push_not_allowed");
    }

    #[test]
    fn test_rejects_cycles_and_bad_toml() {
        let raw = r#"
            [[checks]]
            name = "a"
            command = ["true"]
            depends_on = ["b"]

            [[checks]]
            name = "b"
            command = ["true"]
            depends_on = ["a"]
        "#;
        let err = GateConfig::from_toml_str(raw).unwrap().resolve().unwrap_err();
        assert_eq!(err.code(), "config.dependency_cycle");

        let err = GateConfig::from_toml_str("[pipeline]\nconcurrency = \"many\"").unwrap_err();
        assert_eq!(err.code(), "config.invalid");

        let err = GateConfig::from_toml_str("[pipeline]\nconcurrency = 0")
            .unwrap()
            .resolve()
            .unwrap_err();
        assert_eq!(err, ConfigError::ZeroConcurrency);
    }

    #[test]
    fn test_rejects_zero_timeouts() {
        let err = GateConfig::from_toml_str("[pipeline]\ndefault_timeout_secs = 0")
            .unwrap()
            .resolve()
            .unwrap_err();
        assert_eq!(err.code(), "config.zero_timeout");

        let raw = r#"
            [[checks]]
            name = "unit"
            command = ["pytest"]
            timeout_secs = 0
        "#;
        let err = GateConfig::from_toml_str(raw).unwrap().resolve().unwrap_err();
        assert_eq!(
            err,
            ConfigError::ZeroTimeout {
                scope: "check 'unit'".into()
            }
        );
    }

    #[test]
    fn test_rejects_aliased_policy_keys() {
        let raw = r#"
            [[checks]]
            name = "lint"
            builtin = "linter"

            [policies.main]
            required_approvals = 1

            [policies.production]
            required_approvals = 3
            required_checks = ["lint"]
        "#;
        let err = GateConfig::from_toml_str(raw).unwrap().resolve().unwrap_err();
        assert_eq!(
            err,
            ConfigError::DuplicatePolicy {
                environment: Environment::Production.to_string(),
                first: "main".into(),
                second: "production".into(),
            }
        );
    }

    #[test]
    fn test_omitted_environments_keep_default_policy() {
        let raw = r#"
            [[checks]]
            name = "lint"
            builtin = "linter"

            [policies.development]
            required_checks = ["lint"]
        "#;
        let resolved = GateConfig::from_toml_str(raw).unwrap().resolve().unwrap();
        let production = resolved.policies.policy(Environment::Production);
        assert_eq!(production.required_approvals, 2);
        assert!(production.required_checks.is_empty());
    }

    #[test]
    fn test_missing_file_is_unreadable() {
        let err = GateConfig::load(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert_eq!(err.code(), "config.unreadable");
    }

    #[test]
    fn test_project_settings_become_env() {
        let project = ProjectSettings {
            min_coverage: Some(75),
            python_version_pin: Some("3.12".into()),
            environment: Some("uat".into()),
        };
        let ws = project.workspace("/repo");
        assert_eq!(
            ws.env(),
            &[
                ("GATEHOUSE_MIN_COVERAGE".to_string(), "75".to_string()),
                ("GATEHOUSE_PYTHON_VERSION".to_string(), "3.12".to_string()),
                ("GATEHOUSE_ENVIRONMENT".to_string(), "uat".to_string()),
            ]
        );
    }
}
