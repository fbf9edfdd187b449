//! Gatehouse CI - quality-gate pipeline execution
//!
//! ## Layer 2 - Checks and pipeline
//!
//! - `Check` / `CommandCheck`: the check capability and its process-backed form
//! - `BuiltinCheck`, `StandardsCheck`: the stock Python quality gate
//! - `CheckRunner`: one check in, one `CheckResult` out
//! - `GatePipeline`: DAG-levelled, bounded-concurrency execution of a check list
//! - `GateConfig`: `gatehouse.toml` loading and validation

pub mod builtin;
pub mod cancel;
pub mod check;
pub mod config;
pub mod pipeline;
pub mod runner;
pub mod spec;
pub mod standards;

// Re-export key types
pub use builtin::BuiltinCheck;
pub use cancel::CancelToken;
pub use check::{Check, CommandCheck, Invocation, Workspace};
pub use config::{GateConfig, ProjectSettings, ResolvedConfig};
pub use pipeline::{plan_levels, GatePipeline, PipelineConfig};
pub use runner::{CheckRunner, DEFAULT_TIMEOUT};
pub use spec::{spec_digest, CheckSpec};
pub use standards::{StandardsCheck, StandardsReport};
