//! # Read-only governor snapshot.
//!
//! [`GovernorStats`] is assembled from two independent locks (queue state and
//! tenant budgets), so it is eventually consistent. It serializes to the JSON
//! shape a status endpoint returns:
//!
//! ```json
//! {
//!   "queueLength": 2,
//!   "pendingRetries": 1,
//!   "isDraining": true,
//!   "inFlight": 3,
//!   "tenants": [ { "tenant": "u1", "count": 3, "inFlight": 3, "resetInMs": 42000 } ]
//! }
//! ```

use std::time::Duration;

use serde::{Serialize, Serializer};

use crate::core::tenant::TenantId;

/// Snapshot of a governor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GovernorStats {
    /// Items waiting in the priority queue.
    pub queue_length: usize,
    /// Failed items waiting out their backoff.
    pub pending_retries: usize,
    /// Whether the dispatcher is currently running.
    pub is_draining: bool,
    /// Sum of in-flight requests across tenants.
    pub in_flight: u32,
    /// Per-tenant counters, sorted by tenant.
    pub tenants: Vec<TenantStats>,
}

/// Counters of one tenant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantStats {
    pub tenant: TenantId,
    /// Admissions in the current window.
    pub count: u32,
    /// Admitted requests not yet resolved.
    pub in_flight: u32,
    /// Time until the current window resets.
    #[serde(rename = "resetInMs", serialize_with = "as_millis")]
    pub reset_in: Duration,
}

fn as_millis<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}
