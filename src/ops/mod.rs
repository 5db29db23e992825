//! # Operations executed on behalf of callers.
//!
//! - [`Operation`] - re-invocable async unit of work; every attempt calls it afresh
//! - [`BoxOperationFuture`] - the boxed future one attempt produces
//!
//! Any `Fn() -> impl Future<Output = Result<T, UpstreamError>>` closure is an
//! operation.

mod operation;

pub use operation::{BoxOperationFuture, Operation};
