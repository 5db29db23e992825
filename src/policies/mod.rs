//! Retry policies.
//!
//! ## Contents
//! - [`RetryPolicy`] whether a failed attempt is retried, and after how long
//! - [`BackoffPolicy`] how retry delays grow (first / factor / max + jitter)
//! - [`JitterPolicy`] randomization of delays
//!
//! ## Quick wiring
//! ```text
//! GovernorConfig { max_retries, backoff }
//!      └─► core::dispatcher uses RetryPolicy::decide(attempt, &err)
//!           - GiveUp           → resolve caller
//!           - Retry { delay }  → retry heap, due at now + delay
//! ```

mod backoff;
mod jitter;
mod retry;

pub use backoff::BackoffPolicy;
pub use jitter::JitterPolicy;
pub use retry::{RetryDecision, RetryPolicy};
