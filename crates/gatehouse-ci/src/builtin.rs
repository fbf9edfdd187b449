//! Builtin checks.

use std::str::FromStr;
use std::sync::Arc;

use gatehouse_core::ConfigError;
use serde::{Deserialize, Serialize};

use crate::check::{Check, CommandCheck};
use crate::config::ProjectSettings;
use crate::standards::StandardsCheck;

/// Builtin quality checks for a Python project.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BuiltinCheck {
    /// black --check .
    Formatter,

    /// flake8 .
    Linter,

    /// mypy . (pinned with --python-version when configured)
    TypeChecker,

    /// bandit -r . -q
    SecurityScanner,

    /// pytest --cov (with --cov-fail-under when a coverage floor is configured)
    TestRunner,

    /// Native SDLC standards scan.
    Standards,
}

impl BuiltinCheck {
    pub const ALL: [BuiltinCheck; 6] = [
        BuiltinCheck::Formatter,
        BuiltinCheck::Linter,
        BuiltinCheck::TypeChecker,
        BuiltinCheck::SecurityScanner,
        BuiltinCheck::TestRunner,
        BuiltinCheck::Standards,
    ];

    /// Config identifier.
    pub fn id(&self) -> &'static str {
        match self {
            BuiltinCheck::Formatter => "formatter",
            BuiltinCheck::Linter => "linter",
            BuiltinCheck::TypeChecker => "type_checker",
            BuiltinCheck::SecurityScanner => "security_scanner",
            BuiltinCheck::TestRunner => "test_runner",
            BuiltinCheck::Standards => "standards",
        }
    }

    /// Default check name when used in the builtin pipeline.
    pub fn default_name(&self) -> &'static str {
        match self {
            BuiltinCheck::Formatter => "format",
            BuiltinCheck::Linter => "lint",
            BuiltinCheck::TypeChecker => "type-check",
            BuiltinCheck::SecurityScanner => "security",
            BuiltinCheck::TestRunner => "tests",
            BuiltinCheck::Standards => "standards",
        }
    }

    /// External command line, or `None` for checks implemented natively.
    pub fn command(&self, project: &ProjectSettings) -> Option<Vec<String>> {
        let argv = |parts: &[&str]| parts.iter().map(|p| p.to_string()).collect::<Vec<_>>();
        match self {
            BuiltinCheck::Formatter => Some(argv(&["black", "--check", "."])),
            BuiltinCheck::Linter => Some(argv(&["flake8", "."])),
            BuiltinCheck::TypeChecker => {
                let mut cmd = argv(&["mypy", "."]);
                if let Some(pin) = &project.python_version_pin {
                    cmd.push("--python-version".to_string());
                    cmd.push(pin.clone());
                }
                Some(cmd)
            }
            BuiltinCheck::SecurityScanner => Some(argv(&["bandit", "-r", ".", "-q"])),
            BuiltinCheck::TestRunner => {
                let mut cmd = argv(&["pytest", "--cov"]);
                if let Some(min) = project.min_coverage {
                    cmd.push(format!("--cov-fail-under={}", min));
                }
                Some(cmd)
            }
            BuiltinCheck::Standards => None,
        }
    }

    pub fn into_check(self, project: &ProjectSettings) -> Arc<dyn Check> {
        match self.command(project) {
            Some(command) => Arc::new(CommandCheck::new(command)),
            None => Arc::new(StandardsCheck::new()),
        }
    }
}

impl FromStr for BuiltinCheck {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BuiltinCheck::ALL
            .into_iter()
            .find(|b| b.id() == s)
            .ok_or_else(|| ConfigError::UnknownBuiltin(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_ids_round_trip() {
        for b in BuiltinCheck::ALL {
            assert_eq!(b.id().parse::<BuiltinCheck>().unwrap(), b);
        }
        assert!("prettier".parse::<BuiltinCheck>().is_err());
    }

    #[test]
    fn test_builtin_commands() {
        let project = ProjectSettings::default();
        let fmt = BuiltinCheck::Formatter.command(&project).unwrap();
        assert_eq!(fmt[0], "black");
        assert!(fmt.contains(&"--check".to_string()));
        assert!(BuiltinCheck::Standards.command(&project).is_none());
    }

    #[test]
    fn test_test_runner_gets_coverage_floor() {
        let project = ProjectSettings {
            min_coverage: Some(85),
            ..Default::default()
        };
        let cmd = BuiltinCheck::TestRunner.command(&project).unwrap();
        assert_eq!(cmd.last().unwrap(), "--cov-fail-under=85");

        let cmd = BuiltinCheck::TestRunner
            .command(&ProjectSettings::default())
            .unwrap();
        assert_eq!(cmd, vec!["pytest".to_string(), "--cov".to_string()]);
    }

    #[test]
    fn test_type_checker_pins_python_version() {
        let project = ProjectSettings {
            python_version_pin: Some("3.11".into()),
            ..Default::default()
        };
        let cmd = BuiltinCheck::TypeChecker.command(&project).unwrap();
        assert_eq!(&cmd[2..], &["--python-version".to_string(), "3.11".to_string()]);
    }

    #[test]
    fn test_into_check_describes_command() {
        let check = BuiltinCheck::Linter.into_check(&ProjectSettings::default());
        assert_eq!(check.describe(), "flake8 .");
    }
}
