//! # Events emitted by the governor.
//!
//! [`EventKind`] classifies events in four groups:
//! - **Admission**: admitted, delayed by the concurrency gate, rate limited
//! - **Dispatch**: enqueued, dispatched, attempt failed, timeout, retry scheduled/requeued
//! - **Terminal**: completed, failed
//! - **Runtime**: dispatcher started/idle, eviction sweeps, shutdown, subscriber trouble
//!
//! [`Event`] carries the optional metadata for each kind.
//!
//! ## Ordering guarantees
//! Every event has a process-wide, monotonically increasing `seq`.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use reqvisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::RetryScheduled)
//!     .with_tenant("u1")
//!     .with_attempt(2)
//!     .with_delay(Duration::from_secs(2));
//!
//! assert_eq!(ev.kind, EventKind::RetryScheduled);
//! assert_eq!(ev.tenant.as_ref().map(|t| t.as_str()), Some("u1"));
//! assert_eq!(ev.delay_ms, Some(2000));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

use crate::core::{ItemId, Priority, TenantId};
use crate::error::GovernorError;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of governor events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Admission ===
    /// Tenant budget charged; the request will be queued.
    ///
    /// Sets: `tenant`, `item`, `count` (tenant in-flight after admission)
    Admitted,

    /// Tenant is over its concurrency ceiling; enqueue is delayed.
    ///
    /// Sets: `tenant`, `item`, `delay_ms`
    AdmissionDelayed,

    /// Tenant exhausted its window budget; request rejected.
    ///
    /// Sets: `tenant`, `delay_ms` (time until the window resets), `reason`
    RateLimited,

    // === Dispatch ===
    /// Item placed on the queue in priority order.
    ///
    /// Sets: `tenant`, `item`, `priority`
    Enqueued,

    /// Dispatcher started an attempt.
    ///
    /// Sets: `tenant`, `item`, `attempt` (1-based), `priority`
    Dispatched,

    /// Attempt exceeded the per-call timeout (always followed by `AttemptFailed`).
    ///
    /// Sets: `tenant`, `item`, `attempt`, `timeout_ms`
    TimeoutHit,

    /// Attempt failed.
    ///
    /// Sets: `tenant`, `item`, `attempt`, `label`, `reason`
    AttemptFailed,

    /// Failed item will re-enter the queue front after a delay.
    ///
    /// Sets: `tenant`, `item`, `attempt` (the failed one), `delay_ms`, `priority` (new)
    RetryScheduled,

    /// Backoff elapsed; item moved to the queue front.
    ///
    /// Sets: `tenant`, `item`, `attempt`, `priority`
    RetryRequeued,

    // === Terminal ===
    /// Caller resolved with a value.
    ///
    /// Sets: `tenant`, `item`, `attempt`
    Completed,

    /// Caller resolved with an error.
    ///
    /// Sets: `tenant`, `item`, `attempt`, `label`, `reason`
    Failed,

    // === Runtime ===
    /// Dispatcher moved from Idle to Draining.
    DispatcherStarted,

    /// Dispatcher found nothing left to do and went Idle.
    DispatcherIdle,

    /// Idle tenant budgets were removed.
    ///
    /// Sets: `count` (number evicted)
    TenantsEvicted,

    /// Shutdown requested; pending items are being dropped.
    ///
    /// Sets: `count` (number of items dropped, when known)
    ShutdownRequested,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets: `subscriber`, `reason`
    SubscriberOverflow,

    /// Subscriber panicked while handling an event.
    ///
    /// Sets: `subscriber`, `reason`
    SubscriberPanicked,
}

/// Governor event with optional metadata.
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Tenant the event concerns.
    pub tenant: Option<TenantId>,
    /// Work item the event concerns.
    pub item: Option<ItemId>,
    /// Attempt number (1-based).
    pub attempt: Option<u32>,
    /// Item priority at the time of the event.
    pub priority: Option<Priority>,
    /// Delay in milliseconds (backoff, admission delay, window reset).
    pub delay_ms: Option<u32>,
    /// Timeout in milliseconds.
    pub timeout_ms: Option<u32>,
    /// Generic counter (in-flight, evicted, dropped).
    pub count: Option<u32>,
    /// Stable error label, see [`GovernorError::as_label`].
    pub label: Option<&'static str>,
    /// Human-readable reason.
    pub reason: Option<Arc<str>>,
    /// Subscriber name for subscriber events.
    pub subscriber: Option<&'static str>,
}

fn as_compact_ms(d: Duration) -> u32 {
    d.as_millis().min(u128::from(u32::MAX)) as u32
}

impl Event {
    /// Creates an event of `kind` with the current time and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            tenant: None,
            item: None,
            attempt: None,
            priority: None,
            delay_ms: None,
            timeout_ms: None,
            count: None,
            label: None,
            reason: None,
            subscriber: None,
        }
    }

    #[inline]
    pub fn with_tenant(mut self, tenant: impl Into<TenantId>) -> Self {
        self.tenant = Some(tenant.into());
        self
    }

    #[inline]
    pub fn with_item(mut self, item: ItemId) -> Self {
        self.item = Some(item);
        self
    }

    #[inline]
    pub fn with_attempt(mut self, n: u32) -> Self {
        self.attempt = Some(n);
        self
    }

    #[inline]
    pub fn with_priority(mut self, p: Priority) -> Self {
        self.priority = Some(p);
        self
    }

    /// Attaches a delay (stored as milliseconds).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        self.delay_ms = Some(as_compact_ms(d));
        self
    }

    /// Attaches a timeout (stored as milliseconds).
    #[inline]
    pub fn with_timeout(mut self, d: Duration) -> Self {
        self.timeout_ms = Some(as_compact_ms(d));
        self
    }

    #[inline]
    pub fn with_count(mut self, n: u32) -> Self {
        self.count = Some(n);
        self
    }

    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches label and message of an error.
    #[inline]
    pub fn with_error(mut self, err: &GovernorError) -> Self {
        self.label = Some(err.as_label());
        self.reason = Some(err.as_message().into());
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        let mut ev = Event::new(EventKind::SubscriberOverflow).with_reason(reason);
        ev.subscriber = Some(subscriber);
        ev
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        let mut ev = Event::new(EventKind::SubscriberPanicked).with_reason(info);
        ev.subscriber = Some(subscriber);
        ev
    }

    /// True for `Completed` and `Failed`.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self.kind, EventKind::Completed | EventKind::Failed)
    }
}
