//! # Dispatcher: the single worker draining a governor's queue.
//!
//! The dispatcher is **Idle** (no task) or **Draining** (one task running
//! [`Shared::run`]). The first enqueue while Idle spawns it; it returns to Idle
//! once both the queue and the retry heap are empty.
//!
//! ## Loop
//! ```text
//! loop:
//!   promote due retries → queue front (earliest deadline first)
//!   pop head ─┬─ none, retries pending → sleep until earliest deadline (or enqueue)
//!             ├─ none, nothing pending → Idle
//!             └─ item → pacing pause (min_interval since last start)
//!                     → attempt += 1, run_once(op, timeout)
//!                     → Ok        → Completed → caller
//!                     → Err retry → priority += 1 → retry heap at now + backoff
//!                     → Err final → Failed → caller
//!                     → inter_item_delay if the queue is non-empty
//! ```
//!
//! ## Rules
//! - The dispatcher is the only code that invokes operations; one attempt at a time.
//! - A due retry may overtake queued items of the same or lower urgency, never
//!   the item already popped.
//! - `last_dispatch` is stamped when an attempt starts and survives Idle periods.
//! - No lock is held across an await.
//! - Every suspension point also waits on the cancellation token; on shutdown
//!   the item in hand is dropped and its caller observes `Closed`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

use crate::{
    core::{
        admission::AdmissionController,
        config::GovernorConfig,
        item::{ItemId, WorkItem},
        queue::{PriorityQueue, RetryQueue},
        runner::{Attempt, run_once},
        stats::GovernorStats,
    },
    error::GovernorError,
    events::{Bus, Event, EventKind},
    policies::{RetryDecision, RetryPolicy},
};

struct State<T> {
    queue: PriorityQueue<WorkItem<T>>,
    retries: RetryQueue<WorkItem<T>>,
    draining: bool,
    closed: bool,
    last_dispatch: Option<Instant>,
}

enum Step<T> {
    Closed,
    Idle,
    WaitUntil(Instant),
    Dispatch { item: WorkItem<T>, pause: Duration },
}

/// State shared by the governor handles and the dispatcher task.
pub(crate) struct Shared<T> {
    pub(crate) cfg: GovernorConfig,
    pub(crate) bus: Bus,
    pub(crate) admission: Arc<AdmissionController>,
    pub(crate) token: CancellationToken,
    retry: RetryPolicy,
    state: Mutex<State<T>>,
    wake: Notify,
    next_id: AtomicU64,
}

impl<T> Drop for Shared<T> {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

impl<T: Send + 'static> Shared<T> {
    pub(crate) fn new(
        cfg: GovernorConfig,
        bus: Bus,
        admission: Arc<AdmissionController>,
        token: CancellationToken,
    ) -> Self {
        Self {
            retry: cfg.retry_policy(),
            cfg,
            bus,
            admission,
            token,
            state: Mutex::new(State {
                queue: PriorityQueue::new(),
                retries: RetryQueue::new(),
                draining: false,
                closed: false,
                last_dispatch: None,
            }),
            wake: Notify::new(),
            next_id: AtomicU64::new(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn next_item_id(&self) -> ItemId {
        ItemId::new(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Places `item` in priority order and makes sure a dispatcher is running.
    ///
    /// After [`close`](Self::close) the item is dropped and its caller sees `Closed`.
    pub(crate) fn enqueue(self: &Arc<Self>, item: WorkItem<T>) {
        let ev = Event::new(EventKind::Enqueued)
            .with_tenant(&item.tenant)
            .with_item(item.id)
            .with_priority(item.priority);

        let start = {
            let mut st = self.lock();
            if st.closed {
                return;
            }
            st.queue.push(item);
            !std::mem::replace(&mut st.draining, true)
        };
        self.bus.publish(ev);

        if start {
            self.bus.publish(Event::new(EventKind::DispatcherStarted));
            tokio::spawn(Arc::clone(self).run());
        } else {
            self.wake.notify_one();
        }
    }

    /// Marks the governor closed and drops every pending item.
    /// Returns how many were dropped.
    pub(crate) fn close(&self) -> usize {
        let (queued, retries) = {
            let mut st = self.lock();
            if st.closed {
                return 0;
            }
            st.closed = true;
            st.draining = false;
            (st.queue.drain_all(), st.retries.drain_all())
        };
        queued.len() + retries.len()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub(crate) fn stats(&self) -> GovernorStats {
        let (queue_length, pending_retries, is_draining) = {
            let st = self.lock();
            (st.queue.len(), st.retries.len(), st.draining)
        };
        let tenants = self.admission.snapshot(Instant::now());
        let in_flight = tenants
            .iter()
            .fold(0u32, |acc, t| acc.saturating_add(t.in_flight));

        GovernorStats {
            queue_length,
            pending_retries,
            is_draining,
            in_flight,
            tenants,
        }
    }

    fn next_step(&self, now: Instant) -> Step<T> {
        let mut requeued = Vec::new();
        let step = {
            let mut st = self.lock();
            if st.closed {
                return Step::Closed;
            }

            for item in st.retries.pop_due(now).into_iter().rev() {
                requeued.push(
                    Event::new(EventKind::RetryRequeued)
                        .with_tenant(&item.tenant)
                        .with_item(item.id)
                        .with_attempt(item.attempt)
                        .with_priority(item.priority),
                );
                st.queue.push_front(item);
            }

            match st.queue.pop() {
                Some(item) => {
                    let pause = st.last_dispatch.map_or(Duration::ZERO, |last| {
                        last.checked_add(self.cfg.min_interval)
                            .map_or(Duration::ZERO, |next| next.saturating_duration_since(now))
                    });
                    Step::Dispatch { item, pause }
                }
                None => match st.retries.next_due() {
                    Some(due) => Step::WaitUntil(due),
                    None => {
                        st.draining = false;
                        Step::Idle
                    }
                },
            }
        };

        for ev in requeued.into_iter().rev() {
            self.bus.publish(ev);
        }
        step
    }

    /// Sleeps for `dur` unless shutdown comes first; returns `false` on shutdown.
    async fn pause(&self, dur: Duration) -> bool {
        if dur.is_zero() {
            return !self.token.is_cancelled();
        }
        tokio::select! {
            biased;
            _ = self.token.cancelled() => false,
            _ = time::sleep(dur) => true,
        }
    }

    async fn run(self: Arc<Self>) {
        loop {
            let (mut item, pause) = match self.next_step(Instant::now()) {
                Step::Closed => return,
                Step::Idle => {
                    self.bus.publish(Event::new(EventKind::DispatcherIdle));
                    return;
                }
                Step::WaitUntil(due) => {
                    tokio::select! {
                        biased;
                        _ = self.token.cancelled() => return,
                        _ = time::sleep_until(due) => {}
                        _ = self.wake.notified() => {}
                    }
                    continue;
                }
                Step::Dispatch { item, pause } => (item, pause),
            };

            if !self.pause(pause).await {
                return;
            }

            let attempt = item.begin_attempt();
            self.lock().last_dispatch = Some(Instant::now());
            self.bus.publish(
                Event::new(EventKind::Dispatched)
                    .with_tenant(&item.tenant)
                    .with_item(item.id)
                    .with_attempt(attempt)
                    .with_priority(item.priority),
            );

            let outcome = tokio::select! {
                biased;
                _ = self.token.cancelled() => None,
                res = run_once(
                    item.operation(),
                    self.cfg.default_timeout(),
                    Attempt { item: item.id, tenant: &item.tenant, number: attempt },
                    &self.bus,
                ) => Some(res),
            };
            let Some(outcome) = outcome else {
                return;
            };

            self.settle(item, outcome);

            let more = !self.lock().queue.is_empty();
            if more && !self.pause(self.cfg.inter_item_delay).await {
                return;
            }
        }
    }

    /// Routes an attempt's outcome to the caller or the retry heap.
    fn settle(&self, mut item: WorkItem<T>, outcome: Result<T, GovernorError>) {
        let err = match outcome {
            Ok(value) => {
                self.bus.publish(
                    Event::new(EventKind::Completed)
                        .with_tenant(&item.tenant)
                        .with_item(item.id)
                        .with_attempt(item.attempt),
                );
                item.succeed(value);
                return;
            }
            Err(err) => err,
        };

        match self.retry.decide(item.attempt, &err) {
            RetryDecision::Retry { delay } => {
                item.deprioritize();
                let ev = Event::new(EventKind::RetryScheduled)
                    .with_tenant(&item.tenant)
                    .with_item(item.id)
                    .with_attempt(item.attempt)
                    .with_priority(item.priority)
                    .with_delay(delay)
                    .with_error(&err);
                let due = Instant::now() + delay;
                {
                    let mut st = self.lock();
                    if st.closed {
                        return;
                    }
                    st.retries.push(due, item);
                }
                self.bus.publish(ev);
            }
            RetryDecision::GiveUp => {
                let err = if err.is_retryable() {
                    GovernorError::RetriesExhausted {
                        attempts: item.attempt,
                        last: Box::new(err),
                    }
                } else {
                    err
                };
                self.bus.publish(
                    Event::new(EventKind::Failed)
                        .with_tenant(&item.tenant)
                        .with_item(item.id)
                        .with_attempt(item.attempt)
                        .with_error(&err),
                );
                item.fail(err);
            }
        }
    }
}
