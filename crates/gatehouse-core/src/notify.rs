//! Terminal-event notifications.
//!
//! Events are handed to a [`NotificationSink`] through a [`Notifier`], which
//! delivers on a spawned task so a slow or failing sink never blocks or fails
//! the pipeline or a promotion. Binaries call [`Notifier::flush`] before
//! exiting so in-flight deliveries are not dropped with the runtime.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::domain::{PipelineRun, PromotionDecision, PromotionRequest};
use crate::obs;
use gatehouse_state::ReleaseRecord;

/// Kind of terminal event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    PipelineCompleted,
    PromotionBlocked,
    ReleaseCreated,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::PipelineCompleted => "pipeline_completed",
            EventKind::PromotionBlocked => "promotion_blocked",
            EventKind::ReleaseCreated => "release_created",
        }
    }
}

/// An event with a JSON payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateEvent {
    pub kind: EventKind,
    pub payload: serde_json::Value,
    pub at: DateTime<Utc>,
}

impl GateEvent {
    pub fn new(kind: EventKind, payload: serde_json::Value) -> Self {
        Self {
            kind,
            payload,
            at: Utc::now(),
        }
    }

    pub fn pipeline_completed(run: &PipelineRun) -> Self {
        let (passed, failed, skipped, errored) = run.tally();
        Self::new(
            EventKind::PipelineCompleted,
            serde_json::json!({
                "run_id": run.id.to_string(),
                "branch": run.trigger_ref.branch,
                "commit": run.trigger_ref.commit,
                "status": run.overall_status(),
                "passed": passed,
                "failed": failed,
                "skipped": skipped,
                "errored": errored,
                "duration_ms": run.duration_ms(),
            }),
        )
    }

    pub fn promotion_blocked(req: &PromotionRequest, decision: &PromotionDecision) -> Self {
        let reason = match decision {
            PromotionDecision::Blocked(reason) => serde_json::to_value(reason).ok(),
            PromotionDecision::Allowed => None,
        };
        Self::new(
            EventKind::PromotionBlocked,
            serde_json::json!({
                "branch": req.branch,
                "from": req.from_env,
                "to": req.to_env,
                "run_id": req.pipeline_run.id.to_string(),
                "code": decision.code(),
                "reason": reason,
            }),
        )
    }

    pub fn release_created(record: &ReleaseRecord) -> Self {
        Self::new(
            EventKind::ReleaseCreated,
            serde_json::json!({
                "version": record.version,
                "commit": record.commit_ref,
                "branch": record.branch,
                "rollback_of": record.rollback_of,
                "seq": record.seq,
            }),
        )
    }

    /// One-line summary suitable for chat webhooks.
    pub fn summary(&self) -> String {
        let field = |k: &str| {
            self.payload
                .get(k)
                .and_then(|v| v.as_str())
                .unwrap_or("?")
                .to_string()
        };
        match self.kind {
            EventKind::PipelineCompleted => format!(
                "Pipeline {} on {}@{}: {}",
                field("run_id"),
                field("branch"),
                field("commit"),
                field("status")
            ),
            EventKind::PromotionBlocked => format!(
                "Promotion of {} from {} to {} blocked: {}",
                field("branch"),
                field("from"),
                field("to"),
                field("code")
            ),
            EventKind::ReleaseCreated => {
                format!("Released {} from {}", field("version"), field("commit"))
            }
        }
    }
}

/// Destination for terminal events.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, event: GateEvent) -> anyhow::Result<()>;
}

/// Fire-and-forget front for a sink.
///
/// Clones share the set of in-flight deliveries.
#[derive(Clone)]
pub struct Notifier {
    sink: Option<Arc<dyn NotificationSink>>,
    pending: Arc<Mutex<JoinSet<()>>>,
}

impl Notifier {
    pub fn new(sink: Arc<dyn NotificationSink>) -> Self {
        Self {
            sink: Some(sink),
            pending: Arc::default(),
        }
    }

    /// Drops every event.
    pub fn disabled() -> Self {
        Self {
            sink: None,
            pending: Arc::default(),
        }
    }

    /// Deliver on a background task. Failures are logged, never returned.
    ///
    /// Returns whether the event was queued (false when disabled).
    pub fn emit(&self, event: GateEvent) -> bool {
        let Some(sink) = self.sink.clone() else {
            return false;
        };
        let Ok(mut pending) = self.pending.lock() else {
            return false;
        };
        // Reap deliveries that already finished.
        while pending.try_join_next().is_some() {}
        pending.spawn(async move {
            let kind = event.kind;
            if let Err(e) = sink.notify(event).await {
                obs::emit_notify_failed(kind.as_str(), &e);
            }
        });
        true
    }

    /// Number of deliveries not yet reaped.
    pub fn in_flight(&self) -> usize {
        self.pending.lock().map(|p| p.len()).unwrap_or(0)
    }

    /// Wait up to `timeout` for every queued delivery.
    ///
    /// Returns false if deliveries were still running at the deadline; those
    /// are aborted.
    pub async fn flush(&self, timeout: Duration) -> bool {
        let mut pending = match self.pending.lock() {
            Ok(mut guard) => std::mem::replace(&mut *guard, JoinSet::new()),
            Err(_) => return false,
        };
        let drained = tokio::time::timeout(timeout, async {
            while pending.join_next().await.is_some() {}
        })
        .await
        .is_ok();
        if !drained {
            warn!(
                event = "notify.abandoned",
                pending = pending.len(),
                "notifications still in flight at flush deadline"
            );
        }
        drained
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::disabled()
    }
}

/// Writes events to the tracing subscriber.
#[derive(Debug, Default, Clone)]
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn notify(&self, event: GateEvent) -> anyhow::Result<()> {
        info!(event = "notify", kind = event.kind.as_str(), summary = %event.summary());
        Ok(())
    }
}

/// Collects events in memory.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    events: Arc<Mutex<Vec<GateEvent>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<GateEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn kinds(&self) -> Vec<EventKind> {
        self.events().into_iter().map(|e| e.kind).collect()
    }
}

#[async_trait]
impl NotificationSink for MemorySink {
    async fn notify(&self, event: GateEvent) -> anyhow::Result<()> {
        self.events
            .lock()
            .map_err(|_| anyhow::anyhow!("memory sink poisoned"))?
            .push(event);
        Ok(())
    }
}

/// POSTs events as JSON to an incoming-webhook URL (Slack/Teams style).
///
/// The body carries a `text` summary alongside the full event.
#[derive(Debug, Clone)]
pub struct WebhookSink {
    url: String,
    client: reqwest::Client,
}

impl WebhookSink {
    pub fn new(url: impl Into<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }
}

#[async_trait]
impl NotificationSink for WebhookSink {
    async fn notify(&self, event: GateEvent) -> anyhow::Result<()> {
        let body = serde_json::json!({
            "text": event.summary(),
            "event": event,
        });
        self.client
            .post(&self.url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
