//! # Event subscribers.
//!
//! ```text
//!   dispatcher / admission ── publish(Event) ──► Bus ──► listener ──► SubscriberSet
//!                                                                ┌────────┼────────┐
//!                                                                ▼        ▼        ▼
//!                                                            LogWriter  Metrics  Custom
//! ```
//!
//! - [`Subscribe`] the trait to implement
//! - [`SubscriberSet`] per-subscriber queues and workers
//! - [`LogWriter`] built-in `tracing` subscriber

mod log;
mod set;
mod subscribe;

pub use log::LogWriter;
pub use set::SubscriberSet;
pub use subscribe::Subscribe;
