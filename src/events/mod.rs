//! Governor events: types and broadcast bus.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `Governor::execute` (admission), the dispatcher loop,
//!   `runner::run_once`, `SubscriberSet` workers (overflow/panic).
//! - **Consumers**: the governor's subscriber listener (fans out to
//!   `SubscriberSet`) and any receiver from `Governor::subscribe`.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
