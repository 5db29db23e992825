//! # Governor configuration.
//!
//! Provides [`GovernorConfig`], the settings fixed when a [`Governor`](crate::Governor)
//! is built. One config is used per downstream dependency; presets exist for
//! the two common ones ([`GovernorConfig::inference`], [`GovernorConfig::mapping`]).
//!
//! ## Sentinel values
//! - `max_requests_per_window = 0` → no window budget
//! - `max_concurrent_per_tenant = 0` → no concurrency gate
//! - `timeout = 0s` → operations run without a timeout
//! - `tenant_idle_ttl = 0s` → tenant budgets are never evicted

use std::time::Duration;

use crate::error::ConfigError;
use crate::policies::{BackoffPolicy, RetryPolicy};

/// Configuration of a single governor.
///
/// ## Field semantics
/// - `max_requests_per_window` / `window`: per-tenant fixed-window budget
/// - `max_concurrent_per_tenant` / `concurrency_delay`: soft per-tenant concurrency gate
/// - `min_interval`: minimum spacing between two dispatches, across tenants
/// - `inter_item_delay`: pause after an item settles when more work is queued
/// - `max_retries` / `backoff`: retry bound and delay growth
/// - `timeout`: per-attempt timeout
/// - `tenant_idle_ttl`: how long an idle budget is kept after its window ends
/// - `bus_capacity`: event bus ring buffer size (min 1)
///
/// ## Notes
/// All fields are public. Prefer the accessors over checking sentinels inline.
#[derive(Clone, Debug, PartialEq)]
pub struct GovernorConfig {
    /// Admissions allowed per tenant within one window (`0` = unlimited).
    pub max_requests_per_window: u32,

    /// Length of the fixed rate window.
    pub window: Duration,

    /// Open requests per tenant before submissions are delayed (`0` = unlimited).
    pub max_concurrent_per_tenant: u32,

    /// Delay unit applied per request above the concurrency ceiling.
    pub concurrency_delay: Duration,

    /// Minimum time between the starts of two consecutive attempts.
    pub min_interval: Duration,

    /// Pause after an item settles while the queue is non-empty.
    pub inter_item_delay: Duration,

    /// Retries allowed beyond the first attempt.
    pub max_retries: u32,

    /// Delay growth between retries.
    pub backoff: BackoffPolicy,

    /// Per-attempt timeout (`Duration::ZERO` = none).
    ///
    /// The clock starts when an attempt is dispatched, not at submission:
    /// time spent queued, paced by `min_interval` or waiting out a backoff
    /// comes on top of it.
    ///
    /// The timeout is best-effort: an operation that overruns it is detached,
    /// not cancelled, and may still complete in the background.
    pub timeout: Duration,

    /// Idle period after which a tenant budget is forgotten (`Duration::ZERO` = never).
    pub tenant_idle_ttl: Duration,

    /// Capacity of the event bus broadcast channel.
    ///
    /// Listeners lagging behind by more than `bus_capacity` events skip
    /// older ones.
    pub bus_capacity: usize,
}

impl GovernorConfig {
    /// Preset for an AI-inference backend: slow, expensive calls.
    ///
    /// 10 requests per minute per tenant, 2 concurrent, 1s pacing, 30s timeout.
    pub fn inference() -> Self {
        Self::default()
    }

    /// Preset for a mapping/distance API: fast, cheap calls with a larger budget.
    ///
    /// 30 requests per minute per tenant, 3 concurrent, 200ms pacing, 10s timeout.
    pub fn mapping() -> Self {
        Self {
            max_requests_per_window: 30,
            max_concurrent_per_tenant: 3,
            concurrency_delay: Duration::from_millis(250),
            min_interval: Duration::from_millis(200),
            inter_item_delay: Duration::from_millis(50),
            timeout: Duration::from_secs(10),
            ..Self::default()
        }
    }

    /// Returns the window budget as an `Option`.
    #[inline]
    pub fn rate_limit(&self) -> Option<u32> {
        (self.max_requests_per_window > 0).then_some(self.max_requests_per_window)
    }

    /// Returns the per-tenant concurrency ceiling as an `Option`.
    #[inline]
    pub fn concurrency_limit(&self) -> Option<u32> {
        (self.max_concurrent_per_tenant > 0).then_some(self.max_concurrent_per_tenant)
    }

    /// Returns the per-attempt timeout as an `Option`.
    #[inline]
    pub fn default_timeout(&self) -> Option<Duration> {
        (!self.timeout.is_zero()).then_some(self.timeout)
    }

    /// Returns the tenant idle TTL as an `Option`.
    #[inline]
    pub fn idle_ttl(&self) -> Option<Duration> {
        (!self.tenant_idle_ttl.is_zero()).then_some(self.tenant_idle_ttl)
    }

    /// Retry policy assembled from `max_retries` and `backoff`.
    #[inline]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            backoff: self.backoff,
        }
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// Checks the values that would make the governor misbehave.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window.is_zero() && self.rate_limit().is_some() {
            return Err(ConfigError::ZeroWindow);
        }
        self.backoff.validate()
    }
}

impl Default for GovernorConfig {
    /// Default configuration:
    ///
    /// - `max_requests_per_window = 10`, `window = 60s`
    /// - `max_concurrent_per_tenant = 2`, `concurrency_delay = 500ms`
    /// - `min_interval = 1s`, `inter_item_delay = 100ms`
    /// - `max_retries = 3`, `backoff = BackoffPolicy::default()` (1s, ×2, max 10s)
    /// - `timeout = 30s`
    /// - `tenant_idle_ttl = 10min`
    /// - `bus_capacity = 1024`
    fn default() -> Self {
        Self {
            max_requests_per_window: 10,
            window: Duration::from_secs(60),
            max_concurrent_per_tenant: 2,
            concurrency_delay: Duration::from_millis(500),
            min_interval: Duration::from_secs(1),
            inter_item_delay: Duration::from_millis(100),
            max_retries: 3,
            backoff: BackoffPolicy::default(),
            timeout: Duration::from_secs(30),
            tenant_idle_ttl: Duration::from_secs(600),
            bus_capacity: 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinels_map_to_none() {
        let cfg = GovernorConfig {
            max_requests_per_window: 0,
            max_concurrent_per_tenant: 0,
            timeout: Duration::ZERO,
            tenant_idle_ttl: Duration::ZERO,
            bus_capacity: 0,
            ..GovernorConfig::default()
        };
        assert_eq!(cfg.rate_limit(), None);
        assert_eq!(cfg.concurrency_limit(), None);
        assert_eq!(cfg.default_timeout(), None);
        assert_eq!(cfg.idle_ttl(), None);
        assert_eq!(cfg.bus_capacity_clamped(), 1);
    }

    #[test]
    fn presets_are_valid() {
        assert!(GovernorConfig::inference().validate().is_ok());
        assert!(GovernorConfig::mapping().validate().is_ok());
        assert_eq!(GovernorConfig::mapping().rate_limit(), Some(30));
        assert_eq!(
            GovernorConfig::inference().default_timeout(),
            Some(Duration::from_secs(30))
        );
    }

    #[test]
    fn zero_window_needs_unlimited_budget() {
        let mut cfg = GovernorConfig {
            window: Duration::ZERO,
            ..GovernorConfig::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroWindow));

        cfg.max_requests_per_window = 0;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn retry_policy_follows_fields() {
        let cfg = GovernorConfig {
            max_retries: 1,
            ..GovernorConfig::default()
        };
        let p = cfg.retry_policy();
        assert_eq!(p.max_retries, 1);
        assert_eq!(p.backoff, cfg.backoff);
    }
}
