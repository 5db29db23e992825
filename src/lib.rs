//! # reqvisor
//!
//! **Reqvisor** is an outbound request governor for Rust services that call a
//! rate-limited, slow external dependency (an inference backend, a mapping
//! API, ...).
//!
//! Every call goes through a [`Governor`]: it is charged against the calling
//! tenant's budget, queued by priority, paced globally, executed under a
//! timeout and retried with exponential backoff when the failure is
//! transient. One governor is built per dependency; its handle is cloned into
//! every request handler.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   handler #1          handler #2          handler #3
//!   submit(u1, op)      submit(u2, op)      submit(u1, op)
//!        │                   │                   │
//!        ▼                   ▼                   ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  AdmissionController (per-tenant)                                 │
//! │  - fixed-window budget      → RateLimitExceeded (nothing queued)  │
//! │  - soft concurrency gate    → delay before enqueue                │
//! │  - in-flight guard          → released once per request           │
//! └────────────────────────────────┬──────────────────────────────────┘
//!                                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  PriorityQueue (priority, then arrival)   RetryQueue (deadline)   │
//! └────────────────────────────────┬──────────────────────────────────┘
//!                                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Dispatcher (single task, Idle ⇄ Draining)                        │
//! │  - promote due retries to the queue front                         │
//! │  - pacing: min_interval between attempt starts                    │
//! │  - run_once(op, timeout)                                          │
//! │  - RetryPolicy: retry (priority += 1, backoff) or resolve         │
//! └──────┬────────────────────────────────────────────────────┬───────┘
//!        │ Publishes Events:                                  │
//!        │ - Admitted / RateLimited / AdmissionDelayed        ▼
//!        │ - Dispatched / AttemptFailed / TimeoutHit     caller gets
//!        │ - RetryScheduled / Completed / Failed         Completion / error
//!        ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                        Bus (broadcast channel)                    │
//! │              (capacity: GovernorConfig::bus_capacity)             │
//! └─────────────────────────────────┬─────────────────────────────────┘
//!                                   ▼
//!                       ┌────────────────────────┐
//!                       │  subscriber listener   │
//!                       └───────────┬────────────┘
//!                                   ▼
//!                             SubscriberSet
//!                           (per-sub queues)
//!                       ┌───────────┼───────────┐
//!                       ▼           ▼           ▼
//!                   LogWriter    sub2.on     subN.on
//!                                _event()    _event()
//! ```
//!
//! ### Lifecycle of one request
//! ```text
//! submit(tenant, priority, op)
//!   ├─► admit(tenant) ─ over budget ─► Err(RateLimitExceeded)
//!   ├─► (concurrency delay)
//!   ├─► enqueue ─► dispatcher pops it
//!   │
//!   loop {
//!     ├─► attempt += 1, run_once(op, timeout)
//!     │     ├─ Ok  ──► Completed ──► Ok(Completion { value, attempts, .. })
//!     │     └─ Err ──► AttemptFailed
//!     │                ├─ retryable, attempt <= max_retries
//!     │                │     ─► priority += 1, RetryScheduled, wait backoff,
//!     │                │        RetryRequeued at the queue front, continue
//!     │                ├─ retryable, bound reached ─► Err(RetriesExhausted)
//!     │                └─ terminal                 ─► Err(TerminalUpstream)
//!   }
//! ```
//!
//! ## Features
//! | Area              | Description                                                  | Key types / traits                        |
//! |-------------------|--------------------------------------------------------------|-------------------------------------------|
//! | **Governor**      | Submit operations per tenant and priority; read stats.       | [`Governor`], [`GovernorBuilder`]         |
//! | **Operations**    | Any re-invocable async closure returning `UpstreamError`.    | [`Operation`], [`UpstreamError`]          |
//! | **Policies**      | Retry bound, exponential backoff, jitter.                    | [`RetryPolicy`], [`BackoffPolicy`]        |
//! | **Errors**        | Typed outcomes with labels and suggested HTTP statuses.      | [`GovernorError`], [`ConfigError`]        |
//! | **Subscriber API**| Hook into governor events (logging, metrics, custom).        | [`Subscribe`], [`LogWriter`]              |
//! | **Configuration** | Per-dependency settings and presets.                         | [`GovernorConfig`]                        |
//! | **Stats**         | Serializable queue and tenant snapshot.                      | [`GovernorStats`], [`TenantStats`]        |
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use reqvisor::{Governor, GovernorConfig, GovernorError, LogWriter, Subscribe, UpstreamError};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut cfg = GovernorConfig::inference();
//!     cfg.min_interval = std::time::Duration::from_millis(10);
//!
//!     let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::default())];
//!     let gov: Governor<String> = Governor::builder(cfg).with_subscribers(subs).build()?;
//!
//!     let answer = gov
//!         .execute("tenant-1", Some(0), || async {
//!             Ok::<_, UpstreamError>("match score: 0.82".to_string())
//!         })
//!         .await?;
//!     assert_eq!(answer.attempts, 1);
//!
//!     let rejected = gov
//!         .submit("tenant-2", None, || async {
//!             Err::<String, _>(UpstreamError::with_status(401, "bad key"))
//!         })
//!         .await;
//!     assert!(matches!(rejected, Err(GovernorError::TerminalUpstream { .. })));
//!
//!     gov.shutdown();
//!     Ok(())
//! }
//! ```
mod core;
mod error;
mod events;
mod ops;
mod policies;
mod subscribers;

// ---- Public re-exports ----

pub use core::{
    Completion, DEFAULT_PRIORITY, Governor, GovernorBuilder, GovernorConfig, GovernorStats, ItemId,
    Priority, TenantId, TenantStats,
};
pub use error::{ConfigError, GovernorError, UpstreamError, UpstreamKind};
pub use events::{Bus, Event, EventKind};
pub use ops::{BoxOperationFuture, Operation};
pub use policies::{BackoffPolicy, JitterPolicy, RetryDecision, RetryPolicy};
pub use subscribers::{LogWriter, Subscribe, SubscriberSet};
