//! # Per-tenant admission control.
//!
//! Every submission is charged against its tenant's [`TenantBudget`] before it
//! may enter the queue.
//!
//! ## Rules
//! - **Window budget**: at most `max_requests_per_window` admissions per fixed
//!   window; the next one fails with [`GovernorError::RateLimitExceeded`].
//!   The window restarts at the first admission after it expires.
//! - **Concurrency gate**: a tenant already at `max_concurrent_per_tenant`
//!   open requests is admitted, but its enqueue is delayed by
//!   `concurrency_delay × (overage + 1)`, capped at the window length when a
//!   window budget is set.
//! - **Atomicity**: check and charge happen under one lock, so two concurrent
//!   submissions cannot both pass on the last unit of budget.
//! - **In-flight**: incremented on admission, decremented when the returned
//!   [`InFlightGuard`] drops (terminal resolution, or the item being discarded).
//! - **Eviction**: budgets with nothing in flight whose window expired at least
//!   `tenant_idle_ttl` ago are swept; they are equivalent to fresh budgets.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

use crate::core::config::GovernorConfig;
use crate::core::stats::TenantStats;
use crate::core::tenant::TenantId;
use crate::error::GovernorError;

/// Limits applied by [`AdmissionController`], derived from [`GovernorConfig`].
#[derive(Clone, Copy, Debug)]
pub(crate) struct AdmissionLimits {
    pub max_requests: Option<u32>,
    pub window: Duration,
    pub max_concurrent: Option<u32>,
    pub concurrency_delay: Duration,
    pub idle_ttl: Option<Duration>,
}

impl From<&GovernorConfig> for AdmissionLimits {
    fn from(cfg: &GovernorConfig) -> Self {
        Self {
            max_requests: cfg.rate_limit(),
            window: cfg.window,
            max_concurrent: cfg.concurrency_limit(),
            concurrency_delay: cfg.concurrency_delay,
            idle_ttl: cfg.idle_ttl(),
        }
    }
}

impl AdmissionLimits {
    /// Soft delay for a tenant that already has `in_flight` open requests.
    fn concurrency_delay_for(&self, in_flight: u32) -> Duration {
        match self.max_concurrent {
            Some(max) if in_flight >= max => {
                let over = in_flight - max + 1;
                let delay = self.concurrency_delay.saturating_mul(over);
                match self.max_requests {
                    Some(_) => delay.min(self.window),
                    None => delay,
                }
            }
            _ => Duration::ZERO,
        }
    }
}

/// Rolling counters of one tenant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct TenantBudget {
    pub window_start: Instant,
    pub count: u32,
    pub in_flight: u32,
}

impl TenantBudget {
    fn new(now: Instant) -> Self {
        Self {
            window_start: now,
            count: 0,
            in_flight: 0,
        }
    }

    fn window_end(&self, window: Duration) -> Instant {
        self.window_start
            .checked_add(window)
            .unwrap_or(self.window_start)
    }

    fn is_expired(&self, window: Duration, now: Instant) -> bool {
        now > self.window_end(window)
    }

    /// Starts a new window if the current one has passed.
    fn roll(&mut self, window: Duration, now: Instant) {
        if self.is_expired(window, now) {
            self.count = 0;
            self.window_start = now;
        }
    }

    fn reset_in(&self, window: Duration, now: Instant) -> Duration {
        self.window_end(window).saturating_duration_since(now)
    }
}

/// Successful admission.
pub(crate) struct Admitted {
    pub guard: InFlightGuard,
    /// Soft delay to wait before enqueueing.
    pub delay: Duration,
    /// Tenant in-flight count including this request.
    pub in_flight: u32,
}

struct Budgets {
    tenants: HashMap<TenantId, TenantBudget>,
    last_sweep: Instant,
}

pub(crate) struct AdmissionController {
    limits: AdmissionLimits,
    budgets: Mutex<Budgets>,
}

impl AdmissionController {
    pub(crate) fn new(limits: AdmissionLimits, now: Instant) -> Arc<Self> {
        Arc::new(Self {
            limits,
            budgets: Mutex::new(Budgets {
                tenants: HashMap::new(),
                last_sweep: now,
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Budgets> {
        self.budgets.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Checks and charges `tenant`'s budget.
    pub(crate) fn admit(
        self: &Arc<Self>,
        tenant: &TenantId,
        now: Instant,
    ) -> Result<Admitted, GovernorError> {
        let limits = self.limits;
        let mut budgets = self.lock();
        let budget = budgets
            .tenants
            .entry(tenant.clone())
            .or_insert_with(|| TenantBudget::new(now));

        budget.roll(limits.window, now);

        if let Some(limit) = limits.max_requests {
            if budget.count >= limit {
                return Err(GovernorError::RateLimitExceeded {
                    tenant: tenant.clone(),
                    limit,
                    window: limits.window,
                    retry_after: budget.reset_in(limits.window, now),
                });
            }
        }

        let delay = limits.concurrency_delay_for(budget.in_flight);
        budget.count += 1;
        budget.in_flight += 1;

        Ok(Admitted {
            guard: InFlightGuard {
                controller: Arc::clone(self),
                tenant: tenant.clone(),
            },
            delay,
            in_flight: budget.in_flight,
        })
    }

    fn release(&self, tenant: &TenantId) {
        if let Some(budget) = self.lock().tenants.get_mut(tenant) {
            budget.in_flight = budget.in_flight.saturating_sub(1);
        }
    }

    /// Removes idle budgets; runs at most once per `tenant_idle_ttl`.
    /// Returns how many were evicted.
    pub(crate) fn sweep(&self, now: Instant) -> usize {
        let Some(ttl) = self.limits.idle_ttl else {
            return 0;
        };
        let window = self.limits.window;
        let mut budgets = self.lock();
        if now.saturating_duration_since(budgets.last_sweep) < ttl {
            return 0;
        }
        budgets.last_sweep = now;

        let before = budgets.tenants.len();
        budgets.tenants.retain(|_, b| {
            b.in_flight > 0 || now.saturating_duration_since(b.window_end(window)) < ttl
        });
        before - budgets.tenants.len()
    }

    /// Per-tenant view sorted by tenant; an expired window reads as zero usage.
    pub(crate) fn snapshot(&self, now: Instant) -> Vec<TenantStats> {
        let window = self.limits.window;
        let budgets = self.lock();
        let mut out: Vec<TenantStats> = budgets
            .tenants
            .iter()
            .map(|(tenant, b)| {
                let expired = b.is_expired(window, now);
                TenantStats {
                    tenant: tenant.clone(),
                    count: if expired { 0 } else { b.count },
                    in_flight: b.in_flight,
                    reset_in: if expired {
                        Duration::ZERO
                    } else {
                        b.reset_in(window, now)
                    },
                }
            })
            .collect();
        out.sort_unstable_by(|a, b| a.tenant.cmp(&b.tenant));
        out
    }

    #[cfg(test)]
    pub(crate) fn budget(&self, tenant: &TenantId) -> Option<TenantBudget> {
        self.lock().tenants.get(tenant).copied()
    }
}

/// Holds one unit of a tenant's in-flight count; releases it on drop.
pub(crate) struct InFlightGuard {
    controller: Arc<AdmissionController>,
    tenant: TenantId,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.controller.release(&self.tenant);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> AdmissionLimits {
        AdmissionLimits {
            max_requests: Some(3),
            window: Duration::from_secs(60),
            max_concurrent: Some(2),
            concurrency_delay: Duration::from_millis(500),
            idle_ttl: Some(Duration::from_secs(600)),
        }
    }

    fn tenant(s: &str) -> TenantId {
        TenantId::from(s)
    }

    #[test]
    fn rejects_past_window_budget_without_charging() {
        let t0 = Instant::now();
        let ctl = AdmissionController::new(limits(), t0);
        let u1 = tenant("u1");

        let held: Vec<_> = (0..3).map(|_| ctl.admit(&u1, t0).expect("admit")).collect();
        let err = ctl.admit(&u1, t0 + Duration::from_secs(10)).err().expect("reject");
        match err {
            GovernorError::RateLimitExceeded {
                limit, retry_after, ..
            } => {
                assert_eq!(limit, 3);
                assert_eq!(retry_after, Duration::from_secs(50));
            }
            other => panic!("unexpected {other:?}"),
        }

        let b = ctl.budget(&u1).expect("budget");
        assert_eq!(b.count, 3);
        assert_eq!(b.in_flight, 3);
        drop(held);
        assert_eq!(ctl.budget(&u1).expect("budget").in_flight, 0);
    }

    #[test]
    fn window_resets_after_expiry() {
        let t0 = Instant::now();
        let ctl = AdmissionController::new(limits(), t0);
        let u1 = tenant("u1");
        for _ in 0..3 {
            drop(ctl.admit(&u1, t0).expect("admit"));
        }
        assert!(ctl.admit(&u1, t0 + Duration::from_secs(60)).is_err());

        let later = t0 + Duration::from_secs(61);
        drop(ctl.admit(&u1, later).expect("new window"));
        let b = ctl.budget(&u1).expect("budget");
        assert_eq!(b.count, 1);
        assert_eq!(b.window_start, later);
    }

    #[test]
    fn tenants_are_isolated() {
        let t0 = Instant::now();
        let ctl = AdmissionController::new(limits(), t0);
        for _ in 0..3 {
            drop(ctl.admit(&tenant("a"), t0).expect("admit"));
        }
        assert!(ctl.admit(&tenant("a"), t0).is_err());
        assert!(ctl.admit(&tenant("b"), t0).is_ok());
    }

    #[test]
    fn concurrency_gate_delays_proportionally() {
        let t0 = Instant::now();
        let ctl = AdmissionController::new(
            AdmissionLimits {
                max_requests: None,
                ..limits()
            },
            t0,
        );
        let u1 = tenant("u1");

        let a = ctl.admit(&u1, t0).expect("admit");
        let b = ctl.admit(&u1, t0).expect("admit");
        let c = ctl.admit(&u1, t0).expect("admit");
        let d = ctl.admit(&u1, t0).expect("admit");
        assert_eq!(a.delay, Duration::ZERO);
        assert_eq!(b.delay, Duration::ZERO);
        assert_eq!(c.delay, Duration::from_millis(500));
        assert_eq!(d.delay, Duration::from_millis(1000));
        assert_eq!(d.in_flight, 4);

        drop((a, b, c));
        let e = ctl.admit(&u1, t0).expect("admit");
        assert_eq!(e.delay, Duration::ZERO);
    }

    #[test]
    fn concurrency_delay_is_uncapped_without_a_window_budget() {
        let t0 = Instant::now();
        let ctl = AdmissionController::new(
            AdmissionLimits {
                max_requests: None,
                window: Duration::ZERO,
                max_concurrent: Some(1),
                ..limits()
            },
            t0,
        );
        let u1 = tenant("u1");

        let a = ctl.admit(&u1, t0).expect("admit");
        let b = ctl.admit(&u1, t0).expect("admit");
        let c = ctl.admit(&u1, t0).expect("admit");
        assert_eq!(a.delay, Duration::ZERO);
        assert_eq!(b.delay, Duration::from_millis(500));
        assert_eq!(c.delay, Duration::from_millis(1000));
    }

    #[test]
    fn concurrency_delay_is_capped_at_the_window() {
        let t0 = Instant::now();
        let ctl = AdmissionController::new(
            AdmissionLimits {
                max_requests: Some(100),
                window: Duration::from_millis(700),
                max_concurrent: Some(1),
                ..limits()
            },
            t0,
        );
        let u1 = tenant("u1");

        let _a = ctl.admit(&u1, t0).expect("admit");
        let _b = ctl.admit(&u1, t0).expect("admit");
        let c = ctl.admit(&u1, t0).expect("admit");
        assert_eq!(c.delay, Duration::from_millis(700));
    }

    #[test]
    fn unlimited_sentinels_never_reject_or_delay() {
        let t0 = Instant::now();
        let ctl = AdmissionController::new(
            AdmissionLimits {
                max_requests: None,
                max_concurrent: None,
                ..limits()
            },
            t0,
        );
        let held: Vec<_> = (0..100)
            .map(|_| ctl.admit(&tenant("u1"), t0).expect("admit"))
            .collect();
        assert!(held.iter().all(|a| a.delay.is_zero()));
    }

    #[test]
    fn sweep_evicts_only_idle_expired_budgets() {
        let t0 = Instant::now();
        let ctl = AdmissionController::new(limits(), t0);
        drop(ctl.admit(&tenant("idle"), t0).expect("admit"));
        let _busy = ctl.admit(&tenant("busy"), t0).expect("admit");

        assert_eq!(ctl.sweep(t0 + Duration::from_secs(60)), 0);

        let late = t0 + Duration::from_secs(60 + 600);
        assert_eq!(ctl.sweep(late), 1);
        assert!(ctl.budget(&tenant("idle")).is_none());
        assert!(ctl.budget(&tenant("busy")).is_some());
    }

    #[test]
    fn snapshot_is_sorted_and_hides_expired_usage() {
        let t0 = Instant::now();
        let ctl = AdmissionController::new(limits(), t0);
        drop(ctl.admit(&tenant("b"), t0).expect("admit"));
        let _a = ctl.admit(&tenant("a"), t0 + Duration::from_secs(30)).expect("admit");

        let snap = ctl.snapshot(t0 + Duration::from_secs(70));
        assert_eq!(snap.len(), 2);
        assert_eq!(snap[0].tenant.as_str(), "a");
        assert_eq!(snap[0].count, 1);
        assert_eq!(snap[0].in_flight, 1);
        assert_eq!(snap[0].reset_in, Duration::from_secs(20));
        assert_eq!(snap[1].tenant.as_str(), "b");
        assert_eq!(snap[1].count, 0);
        assert_eq!(snap[1].reset_in, Duration::ZERO);
    }
}
