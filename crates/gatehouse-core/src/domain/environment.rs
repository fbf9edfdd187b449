//! The environment ladder and per-environment branch policies.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::ConfigError;

/// One rung of the promotion ladder, in ascending order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Feature,
    Development,
    Uat,
    Production,
}

impl Environment {
    pub const LADDER: [Environment; 4] = [
        Environment::Feature,
        Environment::Development,
        Environment::Uat,
        Environment::Production,
    ];

    /// The only environment this one may promote into.
    pub fn successor(self) -> Option<Environment> {
        match self {
            Environment::Feature => Some(Environment::Development),
            Environment::Development => Some(Environment::Uat),
            Environment::Uat => Some(Environment::Production),
            Environment::Production => None,
        }
    }

    pub fn predecessor(self) -> Option<Environment> {
        match self {
            Environment::Feature => None,
            Environment::Development => Some(Environment::Feature),
            Environment::Uat => Some(Environment::Development),
            Environment::Production => Some(Environment::Uat),
        }
    }

    /// Conventional long-lived branch backing this environment.
    pub fn branch_name(self) -> &'static str {
        match self {
            Environment::Feature => "feature/*",
            Environment::Development => "development",
            Environment::Uat => "uat",
            Environment::Production => "main",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Environment::Feature => "feature",
            Environment::Development => "development",
            Environment::Uat => "uat",
            Environment::Production => "production",
        }
    }

    pub fn is_protected(self) -> bool {
        self != Environment::Feature
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = ConfigError;

    /// Accepts environment names and their branch aliases (`dev`, `main`, ...).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "feature" => Ok(Environment::Feature),
            "development" | "dev" => Ok(Environment::Development),
            "uat" | "staging" => Ok(Environment::Uat),
            "production" | "prod" | "main" => Ok(Environment::Production),
            _ => Err(ConfigError::UnknownEnvironment(s.to_string())),
        }
    }
}

/// Gates attached to an environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BranchPolicy {
    /// Approvals needed to promote into this environment.
    pub required_approvals: u32,

    /// Checks that must be Passed, in declared order.
    pub required_checks: Vec<String>,

    /// Only permitted on Feature.
    pub allow_direct_push: bool,
}

impl BranchPolicy {
    pub fn new(required_approvals: u32, required_checks: Vec<String>) -> Self {
        Self {
            required_approvals,
            required_checks,
            allow_direct_push: false,
        }
    }
}

/// Policies for every environment on the ladder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicySet {
    policies: BTreeMap<Environment, BranchPolicy>,
}

impl Default for PolicySet {
    fn default() -> Self {
        let mut policies = BTreeMap::new();
        policies.insert(
            Environment::Feature,
            BranchPolicy {
                required_approvals: 0,
                required_checks: Vec::new(),
                allow_direct_push: true,
            },
        );
        policies.insert(Environment::Development, BranchPolicy::new(1, Vec::new()));
        policies.insert(Environment::Uat, BranchPolicy::new(1, Vec::new()));
        policies.insert(Environment::Production, BranchPolicy::new(2, Vec::new()));
        Self { policies }
    }
}

impl PolicySet {
    /// Policy for `env`; environments without an explicit entry get an empty policy.
    pub fn policy(&self, env: Environment) -> BranchPolicy {
        self.policies.get(&env).cloned().unwrap_or_default()
    }

    pub fn set(&mut self, env: Environment, policy: BranchPolicy) {
        self.policies.insert(env, policy);
    }

    pub fn with(mut self, env: Environment, policy: BranchPolicy) -> Self {
        self.set(env, policy);
        self
    }

    /// Reject direct pushes on protected environments and required checks
    /// that are not among `known_checks`.
    pub fn validate(&self, known_checks: &HashSet<String>) -> Result<(), ConfigError> {
        for (env, policy) in &self.policies {
            if env.is_protected() && policy.allow_direct_push {
                return Err(ConfigError::DirectPushNotAllowed {
                    environment: env.to_string(),
                });
            }
            if let Some(missing) = policy
                .required_checks
                .iter()
                .find(|c| !known_checks.contains(c.as_str()))
            {
                return Err(ConfigError::UnknownPolicyCheck {
                    environment: env.to_string(),
                    check: missing.clone(),
                });
            }
        }
        Ok(())
    }
}
