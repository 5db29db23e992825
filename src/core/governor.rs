//! # Governor: the entry point callers share.
//!
//! [`Governor`] is a cheap-to-clone handle over one governor instance. Every
//! handler of a service holds a clone and submits operations through it.
//!
//! ## Flow
//! ```text
//! execute(tenant, priority, op)
//!   ├─► closed?                          → Err(Closed)
//!   ├─► sweep idle tenant budgets        (at most once per tenant_idle_ttl)
//!   ├─► admit(tenant)                    → Err(RateLimitExceeded), nothing queued
//!   ├─► soft concurrency delay           (tenant over its ceiling)
//!   ├─► enqueue in priority order        → dispatcher spawned if Idle
//!   └─► await the reply                  → Ok(Completion) | Err(final error)
//! ```
//!
//! Admission runs before the first suspension point of the returned future,
//! so the over-budget call fails on its first poll.

use std::sync::Arc;

use tokio::sync::{broadcast, oneshot};
use tokio::time::{self, Instant};

use crate::core::{
    builder::GovernorBuilder,
    config::GovernorConfig,
    dispatcher::Shared,
    item::{Completion, DEFAULT_PRIORITY, Priority, WorkItem},
    stats::GovernorStats,
    tenant::TenantId,
};
use crate::error::{ConfigError, GovernorError};
use crate::events::{Event, EventKind};
use crate::ops::Operation;

/// Handle to a multi-tenant request governor producing values of type `T`.
///
/// # Example
/// ```rust
/// use reqvisor::{Governor, GovernorConfig, UpstreamError};
///
/// #[tokio::main(flavor = "current_thread")]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let cfg = GovernorConfig {
///         min_interval: std::time::Duration::ZERO,
///         ..GovernorConfig::inference()
///     };
///     let gov: Governor<String> = Governor::new(cfg)?;
///
///     let reply = gov
///         .submit("tenant-1", None, || async { Ok::<_, UpstreamError>("hello".to_string()) })
///         .await?;
///     assert_eq!(reply, "hello");
///     Ok(())
/// }
/// ```
pub struct Governor<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Governor<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Send + 'static> Governor<T> {
    pub(crate) fn from_shared(shared: Arc<Shared<T>>) -> Self {
        Self { shared }
    }

    /// Returns a builder for a governor with `cfg`.
    pub fn builder(cfg: GovernorConfig) -> GovernorBuilder<T> {
        GovernorBuilder::new(cfg)
    }

    /// Builds a governor without subscribers.
    pub fn new(cfg: GovernorConfig) -> Result<Self, ConfigError> {
        GovernorBuilder::new(cfg).build()
    }

    /// Submits `op` for `tenant` and waits for its final outcome.
    ///
    /// `priority` defaults to [`DEFAULT_PRIORITY`]; lower is more urgent.
    ///
    /// # Errors
    /// - [`GovernorError::RateLimitExceeded`] immediately when the tenant's window budget is spent
    /// - [`GovernorError::TerminalUpstream`] for a non-retryable failure (not retried)
    /// - [`GovernorError::RetriesExhausted`] when a retryable failure outlasts `max_retries`
    /// - [`GovernorError::Closed`] when the governor shuts down first
    pub async fn execute(
        &self,
        tenant: impl Into<TenantId>,
        priority: Option<Priority>,
        op: impl Operation<T>,
    ) -> Result<Completion<T>, GovernorError> {
        let shared = &self.shared;
        if shared.token.is_cancelled() {
            return Err(GovernorError::Closed);
        }
        let tenant = tenant.into();
        let priority = priority.unwrap_or(DEFAULT_PRIORITY);
        let now = Instant::now();

        let evicted = shared.admission.sweep(now);
        if evicted > 0 {
            shared.bus.publish(
                Event::new(EventKind::TenantsEvicted)
                    .with_count(u32::try_from(evicted).unwrap_or(u32::MAX)),
            );
        }

        let admitted = match shared.admission.admit(&tenant, now) {
            Ok(admitted) => admitted,
            Err(err) => {
                if let GovernorError::RateLimitExceeded { retry_after, .. } = &err {
                    shared.bus.publish(
                        Event::new(EventKind::RateLimited)
                            .with_tenant(&tenant)
                            .with_delay(*retry_after)
                            .with_error(&err),
                    );
                }
                return Err(err);
            }
        };

        let id = shared.next_item_id();
        shared.bus.publish(
            Event::new(EventKind::Admitted)
                .with_tenant(&tenant)
                .with_item(id)
                .with_count(admitted.in_flight),
        );

        if !admitted.delay.is_zero() {
            shared.bus.publish(
                Event::new(EventKind::AdmissionDelayed)
                    .with_tenant(&tenant)
                    .with_item(id)
                    .with_delay(admitted.delay),
            );
            tokio::select! {
                biased;
                _ = shared.token.cancelled() => return Err(GovernorError::Closed),
                _ = time::sleep(admitted.delay) => {}
            }
        }

        let (tx, rx) = oneshot::channel();
        let item = WorkItem::new(id, tenant, priority, Box::new(op), tx, admitted.guard);
        shared.enqueue(item);

        match rx.await {
            Ok(res) => res,
            Err(_dropped) => Err(GovernorError::Closed),
        }
    }

    /// Same as [`execute`](Self::execute), returning only the value.
    pub async fn submit(
        &self,
        tenant: impl Into<TenantId>,
        priority: Option<Priority>,
        op: impl Operation<T>,
    ) -> Result<T, GovernorError> {
        self.execute(tenant, priority, op).await.map(|c| c.value)
    }

    /// Point-in-time snapshot of queue and tenant counters.
    pub fn stats(&self) -> GovernorStats {
        self.shared.stats()
    }

    pub fn config(&self) -> &GovernorConfig {
        &self.shared.cfg
    }

    /// Raw receiver of every event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.shared.bus.subscribe()
    }

    /// Stops the governor.
    ///
    /// Pending items are dropped and their callers observe
    /// [`GovernorError::Closed`]; the attempt in progress is abandoned at its
    /// next suspension point; later submissions fail with `Closed`.
    pub fn shutdown(&self) {
        let dropped = self.shared.close();
        self.shared.bus.publish(
            Event::new(EventKind::ShutdownRequested)
                .with_count(u32::try_from(dropped).unwrap_or(u32::MAX)),
        );
        self.shared.token.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.shared.token.is_cancelled() || self.shared.is_closed()
    }
}

impl<T> std::fmt::Debug for Governor<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Governor")
            .field("config", &self.shared.cfg)
            .finish_non_exhaustive()
    }
}
