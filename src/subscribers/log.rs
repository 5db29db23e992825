//! # LogWriter: events as `tracing` records
//!
//! Translates every [`Event`] into a structured `tracing` record under the
//! `reqvisor` target. Terminal failures, rate limiting and subscriber trouble
//! log at `warn`, lifecycle milestones at `info`, per-attempt chatter at `debug`.
//!
//! ## Example output (fmt subscriber)
//! ```text
//! INFO  reqvisor: admitted tenant="u1" item=7 in_flight=1
//! DEBUG reqvisor: dispatched tenant="u1" item=7 attempt=1 priority=0
//! DEBUG reqvisor: attempt failed tenant="u1" item=7 attempt=1 label="transient_upstream"
//! INFO  reqvisor: retry scheduled tenant="u1" item=7 attempt=1 delay_ms=1000
//! INFO  reqvisor: completed tenant="u1" item=7 attempt=2
//! ```

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Subscriber writing events through `tracing`.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let tenant = e.tenant.as_ref().map(|t| t.as_str());
        let item = e.item.map(|i| i.get());
        let reason = e.reason.as_deref();

        match e.kind {
            EventKind::Admitted => {
                info!(target: "reqvisor", ?tenant, ?item, in_flight = ?e.count, "admitted");
            }
            EventKind::AdmissionDelayed => {
                info!(target: "reqvisor", ?tenant, ?item, delay_ms = ?e.delay_ms, "admission delayed");
            }
            EventKind::RateLimited => {
                warn!(target: "reqvisor", ?tenant, retry_after_ms = ?e.delay_ms, ?reason, "rate limited");
            }
            EventKind::Enqueued => {
                debug!(target: "reqvisor", ?tenant, ?item, priority = ?e.priority, "enqueued");
            }
            EventKind::Dispatched => {
                debug!(target: "reqvisor", ?tenant, ?item, attempt = ?e.attempt, priority = ?e.priority, "dispatched");
            }
            EventKind::TimeoutHit => {
                warn!(target: "reqvisor", ?tenant, ?item, attempt = ?e.attempt, timeout_ms = ?e.timeout_ms, "timeout");
            }
            EventKind::AttemptFailed => {
                debug!(target: "reqvisor", ?tenant, ?item, attempt = ?e.attempt, label = ?e.label, ?reason, "attempt failed");
            }
            EventKind::RetryScheduled => {
                info!(target: "reqvisor", ?tenant, ?item, attempt = ?e.attempt, delay_ms = ?e.delay_ms, "retry scheduled");
            }
            EventKind::RetryRequeued => {
                debug!(target: "reqvisor", ?tenant, ?item, priority = ?e.priority, "retry requeued");
            }
            EventKind::Completed => {
                info!(target: "reqvisor", ?tenant, ?item, attempt = ?e.attempt, "completed");
            }
            EventKind::Failed => {
                warn!(target: "reqvisor", ?tenant, ?item, attempt = ?e.attempt, label = ?e.label, ?reason, "failed");
            }
            EventKind::DispatcherStarted => {
                debug!(target: "reqvisor", "dispatcher draining");
            }
            EventKind::DispatcherIdle => {
                debug!(target: "reqvisor", "dispatcher idle");
            }
            EventKind::TenantsEvicted => {
                info!(target: "reqvisor", evicted = ?e.count, "tenant budgets evicted");
            }
            EventKind::ShutdownRequested => {
                info!(target: "reqvisor", dropped = ?e.count, "shutdown requested");
            }
            EventKind::SubscriberOverflow => {
                warn!(target: "reqvisor", subscriber = ?e.subscriber, ?reason, "subscriber overflow");
            }
            EventKind::SubscriberPanicked => {
                warn!(target: "reqvisor", subscriber = ?e.subscriber, ?reason, "subscriber panicked");
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
