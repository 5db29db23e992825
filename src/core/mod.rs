//! Governor core: admission, queueing and dispatch.
//!
//! The public API from this module is [`Governor`] (built by
//! [`GovernorBuilder`] from a [`GovernorConfig`]) plus the value types it
//! hands out.
//!
//! Internal modules:
//! - [`admission`]: per-tenant window budget, soft concurrency gate, in-flight guards;
//! - [`queue`]: priority queue and deadline-ordered retry heap;
//! - [`dispatcher`]: the single worker draining the queue with pacing and retries;
//! - [`runner`]: executes one attempt under the timeout and publishes failures;
//! - [`item`]: work items and their exactly-once resolution.

mod admission;
mod builder;
mod config;
mod dispatcher;
mod governor;
mod item;
mod queue;
mod runner;
mod stats;
mod tenant;

#[cfg(test)]
mod tests;

pub use builder::GovernorBuilder;
pub use config::GovernorConfig;
pub use governor::Governor;
pub use item::{Completion, DEFAULT_PRIORITY, ItemId, Priority};
pub use stats::{GovernorStats, TenantStats};
pub use tenant::TenantId;
