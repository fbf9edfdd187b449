//! Domain models for Gatehouse.
//!
//! Canonical definitions for the core entities:
//! - `CheckResult`: outcome of one check in one run
//! - `PipelineRun`: one execution of the gate pipeline
//! - `Environment` / `BranchPolicy`: the promotion ladder and its gates
//! - `PromotionRequest` / `PromotionDecision`: proposed and decided transitions
//! - `Version`: semantic versions for releases

pub mod check;
pub mod environment;
pub mod error;
pub mod promotion;
pub mod run;
pub mod version;

pub use check::{CheckResult, CheckStatus, SkipReason};
pub use environment::{BranchPolicy, Environment, PolicySet};
pub use error::{ConfigError, GateError, Result};
pub use promotion::{BlockReason, PromotionDecision, PromotionRequest};
pub use run::{PipelineRun, RunStatus, TriggerRef};
pub use version::{Version, VersionBump};
