//! # Work items.
//!
//! A [`WorkItem`] is one caller's request while the governor owns it: in the
//! queue, in the retry heap, or in the dispatcher's hands.
//!
//! ## Rules
//! - Resolution (`succeed`/`fail`) consumes the item, so a caller is answered
//!   at most once; dropping an unresolved item closes the reply channel and the
//!   caller observes [`GovernorError::Closed`].
//! - The in-flight guard travels with the item and is released exactly once,
//!   before the caller is answered.

use std::fmt;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::core::admission::InFlightGuard;
use crate::core::queue::Prioritized;
use crate::core::tenant::TenantId;
use crate::error::GovernorError;
use crate::ops::Operation;

/// Item priority; lower is more urgent.
pub type Priority = i32;

/// Priority used when a caller does not pass one.
pub const DEFAULT_PRIORITY: Priority = 0;

/// Opaque identifier of a submitted request, unique per governor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId(u64);

impl ItemId {
    pub(crate) fn new(n: u64) -> Self {
        Self(n)
    }

    /// Raw numeric value.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "item-{}", self.0)
    }
}

/// Successful resolution of a request.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion<T> {
    /// Value produced by the operation.
    pub value: T,
    /// Identifier assigned at submission.
    pub item: ItemId,
    /// Number of executions, including the successful one.
    pub attempts: u32,
    /// Time from enqueue to resolution.
    pub queued_for: Duration,
}

pub(crate) type Reply<T> = oneshot::Sender<Result<Completion<T>, GovernorError>>;

pub(crate) struct WorkItem<T> {
    pub(crate) id: ItemId,
    pub(crate) tenant: TenantId,
    pub(crate) priority: Priority,
    pub(crate) attempt: u32,
    pub(crate) enqueued_at: Instant,
    operation: Box<dyn Operation<T>>,
    // Declared before `reply` so an unresolved item releases in-flight first.
    guard: InFlightGuard,
    reply: Reply<T>,
}

impl<T> WorkItem<T> {
    pub(crate) fn new(
        id: ItemId,
        tenant: TenantId,
        priority: Priority,
        operation: Box<dyn Operation<T>>,
        reply: Reply<T>,
        guard: InFlightGuard,
    ) -> Self {
        Self {
            id,
            tenant,
            priority,
            attempt: 0,
            enqueued_at: Instant::now(),
            operation,
            guard,
            reply,
        }
    }

    pub(crate) fn operation(&self) -> &dyn Operation<T> {
        self.operation.as_ref()
    }

    /// Counts a new execution and returns its 1-based number.
    pub(crate) fn begin_attempt(&mut self) -> u32 {
        self.attempt += 1;
        self.attempt
    }

    pub(crate) fn deprioritize(&mut self) {
        self.priority = self.priority.saturating_add(1);
    }

    pub(crate) fn succeed(self, value: T) {
        let Self {
            id,
            attempt,
            enqueued_at,
            reply,
            guard,
            ..
        } = self;
        drop(guard);
        let _ = reply.send(Ok(Completion {
            value,
            item: id,
            attempts: attempt,
            queued_for: enqueued_at.elapsed(),
        }));
    }

    pub(crate) fn fail(self, err: GovernorError) {
        let Self { reply, guard, .. } = self;
        drop(guard);
        let _ = reply.send(Err(err));
    }
}

impl<T> Prioritized for WorkItem<T> {
    fn priority(&self) -> Priority {
        self.priority
    }
}
