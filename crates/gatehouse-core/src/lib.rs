//! Gatehouse Core Library
//!
//! ## Layer 1 - Domain and promotion
//!
//! Domain model for check results, pipeline runs, the environment ladder and
//! its policies, plus the services that act on them:
//!
//! - `PromotionStateMachine`: validates and applies ladder transitions
//! - `ReleaseTagger`: single writer of the release version sequence
//! - `Notifier` / `NotificationSink`: fire-and-forget terminal events
//! - `obs` / `telemetry`: structured tracing

pub mod domain;
pub mod notify;
pub mod obs;
pub mod promotion;
pub mod release_tagger;
pub mod telemetry;

pub use domain::{
    BlockReason, BranchPolicy, CheckResult, CheckStatus, ConfigError, Environment, GateError,
    PipelineRun, PolicySet, PromotionDecision, PromotionRequest, Result, RunStatus, SkipReason,
    TriggerRef, Version, VersionBump,
};

pub use notify::{
    EventKind, GateEvent, LogSink, MemorySink, NotificationSink, Notifier, WebhookSink,
};

pub use promotion::{evaluate, LadderPositions, PromotionOutcome, PromotionStateMachine};

pub use release_tagger::ReleaseTagger;

pub use telemetry::init_tracing;

pub use gatehouse_state::{ReleaseLog, ReleaseRecord, RunHistory, RunRecord, TimeRange};
