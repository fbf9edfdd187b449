//! Structured observability hooks for pipeline, promotion, and release events.
//!
//! This module provides:
//! - Run-scoped tracing spans (`run_span`, `RunSpan`)
//! - Emission functions for lifecycle events: pipeline start/finish, check
//!   completion, promotion evaluation, release creation, notification failure
//!
//! Events are emitted at `info!` level with a stable `event` field so they can
//! be filtered in JSON log output.

use tracing::{info, warn};

/// Run-scoped span; attach it to a run's future with
/// [`tracing::Instrument::instrument`] so every event carries the run id.
pub fn run_span(run_id: &str) -> tracing::Span {
    tracing::info_span!("gatehouse.run", run_id = %run_id)
}

/// RAII guard that enters a run-scoped span on the current thread.
///
/// Only for synchronous sections; use [`run_span`] across `.await` points.
pub struct RunSpan {
    _span: tracing::span::EnteredSpan,
}

impl RunSpan {
    /// Create and enter a span tagged with the run_id.
    pub fn enter(run_id: &str) -> Self {
        Self {
            _span: run_span(run_id).entered(),
        }
    }
}

/// Emit event: pipeline started.
pub fn emit_pipeline_started(run_id: &str, branch: &str, commit: &str, checks: usize) {
    info!(
        event = "pipeline.started",
        run_id = %run_id,
        branch = %branch,
        commit = %commit,
        checks = checks,
    );
}

/// Emit event: a single check produced its result.
pub fn emit_check_finished(run_id: &str, check: &str, status: &str, duration_ms: u64) {
    info!(
        event = "check.finished",
        run_id = %run_id,
        check = %check,
        status = %status,
        duration_ms = duration_ms,
    );
}

/// Emit event: pipeline finished with its overall status.
pub fn emit_pipeline_finished(run_id: &str, status: &str, duration_ms: u64) {
    info!(
        event = "pipeline.finished",
        run_id = %run_id,
        status = %status,
        duration_ms = duration_ms,
    );
}

pub fn emit_promotion_evaluated(branch: &str, from: &str, to: &str, code: &str) {
    info!(
        event = "promotion.evaluated",
        branch = %branch,
        from = %from,
        to = %to,
        code = %code,
    );
}

pub fn emit_release_created(version: &str, commit: &str, seq: u64) {
    info!(event = "release.created", version = %version, commit = %commit, seq = seq);
}

/// Emit event: a notification sink rejected an event (warning level).
pub fn emit_notify_failed(kind: &str, error: &dyn std::fmt::Display) {
    warn!(event = "notify.failed", kind = %kind, error = %error);
}

/// Emit event: a finished run could not be persisted (warning level).
pub fn emit_persist_failed(run_id: &str, error: &dyn std::fmt::Display) {
    warn!(event = "pipeline.persist_failed", run_id = %run_id, error = %error);
}
