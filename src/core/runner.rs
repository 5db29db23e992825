//! # Run a single attempt of a work item.
//!
//! Executes one attempt of an [`Operation`] with an optional timeout and
//! publishes failure events to [`Bus`].
//!
//! ## Event flow
//!
//! ```text
//! Success:
//!   op.call() → Ok(v)  → (dispatcher publishes Completed)
//!
//! Failure:
//!   op.call() → Err(e) → classify → publish AttemptFailed
//!
//! Timeout:
//!   timer fires first → detach task → publish TimeoutHit
//!                                   → publish AttemptFailed (timeout)
//!                                   → return Timeout error
//! ```
//!
//! ## Rules
//! - The operation future runs as its own task; the dispatcher only races its
//!   handle against the timer.
//! - On timeout the handle is dropped, which **detaches** the task. It keeps
//!   running and its result is discarded.
//! - A panicking operation becomes a terminal upstream error.
//! - `TimeoutHit` is published **in addition to** `AttemptFailed`.

use std::time::Duration;

use tokio::task::JoinError;
use tokio::time;

use crate::{
    core::{item::ItemId, tenant::TenantId},
    error::GovernorError,
    events::{Bus, Event, EventKind},
    ops::Operation,
};

/// Identity of the attempt being run, for events.
#[derive(Clone, Copy)]
pub(crate) struct Attempt<'a> {
    pub item: ItemId,
    pub tenant: &'a TenantId,
    pub number: u32,
}

/// Executes one attempt of `op`, publishing failure events to `bus`.
///
/// ### Timeout behavior
/// If `timeout` is `Some(dur)` and `dur > 0` the spawned task is raced against
/// `tokio::time::timeout`; on expiry `TimeoutHit` is published and
/// [`GovernorError::Timeout`] returned.
pub(crate) async fn run_once<T: Send + 'static>(
    op: &dyn Operation<T>,
    timeout: Option<Duration>,
    attempt: Attempt<'_>,
    bus: &Bus,
) -> Result<T, GovernorError> {
    let handle = tokio::spawn(op.call());

    let joined = match timeout.filter(|d| !d.is_zero()) {
        Some(dur) => match time::timeout(dur, handle).await {
            Ok(joined) => joined,
            Err(_elapsed) => {
                publish_timeout(bus, attempt, dur);
                let err = GovernorError::Timeout { timeout: dur };
                publish_failed(bus, attempt, &err);
                return Err(err);
            }
        },
        None => handle.await,
    };

    let res = match joined {
        Ok(Ok(v)) => Ok(v),
        Ok(Err(upstream)) => Err(GovernorError::from_upstream(upstream)),
        Err(join_err) => Err(from_join_error(join_err)),
    };

    if let Err(e) = &res {
        publish_failed(bus, attempt, e);
    }
    res
}

fn from_join_error(err: JoinError) -> GovernorError {
    let message = if err.is_panic() {
        format!("operation panicked: {err}")
    } else {
        err.to_string()
    };
    GovernorError::TerminalUpstream {
        status: None,
        message,
    }
}

/// Publishes `AttemptFailed` with error details.
fn publish_failed(bus: &Bus, a: Attempt<'_>, err: &GovernorError) {
    bus.publish(
        Event::new(EventKind::AttemptFailed)
            .with_tenant(a.tenant)
            .with_item(a.item)
            .with_attempt(a.number)
            .with_error(err),
    );
}

/// Publishes `TimeoutHit` (always followed by `AttemptFailed`).
fn publish_timeout(bus: &Bus, a: Attempt<'_>, dur: Duration) {
    bus.publish(
        Event::new(EventKind::TimeoutHit)
            .with_tenant(a.tenant)
            .with_item(a.item)
            .with_attempt(a.number)
            .with_timeout(dur),
    );
}
