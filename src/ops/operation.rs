//! # Operation abstraction.
//!
//! The governor knows nothing about what an operation does. It only needs to
//! start a fresh attempt on demand and learn whether it produced a value or an
//! [`UpstreamError`].
//!
//! A closure producing a new future per call avoids shared mutable state
//! between retries; if attempts need shared state, capture an `Arc<...>`.
//!
//! ## Example
//! ```rust
//! use reqvisor::{Operation, UpstreamError};
//!
//! let op = || async { Ok::<_, UpstreamError>(42u32) };
//! let _fut = op.call();
//! ```

use std::future::Future;
use std::pin::Pin;

use crate::error::UpstreamError;

/// Boxed future returned by one attempt of an [`Operation`].
pub type BoxOperationFuture<T> =
    Pin<Box<dyn Future<Output = Result<T, UpstreamError>> + Send + 'static>>;

/// # Asynchronous, re-invocable unit of work.
///
/// Each call to [`call`](Operation::call) starts a new attempt. The returned
/// future is spawned onto its own task by the governor, so it must be `'static`.
pub trait Operation<T>: Send + Sync + 'static {
    /// Starts one attempt.
    fn call(&self) -> BoxOperationFuture<T>;
}

impl<T, F, Fut> Operation<T> for F
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, UpstreamError>> + Send + 'static,
{
    fn call(&self) -> BoxOperationFuture<T> {
        Box::pin(self())
    }
}
