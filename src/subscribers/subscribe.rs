//! # Subscriber trait
//!
//! `Subscribe` is the extension point for reacting to governor events (logs,
//! metrics, audit). Each subscriber is driven by its own worker fed by a
//! bounded queue owned by [`SubscriberSet`](crate::SubscriberSet), so a slow
//! subscriber never delays the dispatcher.
//!
//! ## Example
//! ```rust
//! use reqvisor::{Event, EventKind, Subscribe};
//!
//! struct RejectionCounter(std::sync::atomic::AtomicU64);
//!
//! #[async_trait::async_trait]
//! impl Subscribe for RejectionCounter {
//!     async fn on_event(&self, ev: &Event) {
//!         if ev.kind == EventKind::RateLimited {
//!             self.0.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
//!         }
//!     }
//!     fn name(&self) -> &'static str { "rejections" }
//! }
//! ```

use async_trait::async_trait;

use crate::events::Event;

/// Contract for event subscribers.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Handles one event.
    async fn on_event(&self, event: &Event);

    /// Name used in overflow/panic reports.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Preferred capacity of this subscriber's queue. On overflow events are dropped.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
