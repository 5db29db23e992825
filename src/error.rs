//! Error types used by the governor and by the operations it runs.
//!
//! - [`UpstreamError`]: what an [`Operation`](crate::Operation) reports when the
//!   downstream service fails. It is raw: a status code, an optional kind hint
//!   and a message.
//! - [`GovernorError`]: the tagged taxonomy every caller observes. Raw upstream
//!   errors are classified into it exactly once, in
//!   [`GovernorError::from_upstream`], so retry decisions are a pattern match.
//! - [`ConfigError`]: rejected [`GovernorConfig`](crate::GovernorConfig) values.

use std::time::Duration;

use thiserror::Error;

use crate::core::TenantId;

/// HTTP status codes treated as transient upstream failures.
const TRANSIENT_STATUS: [u16; 4] = [429, 502, 503, 504];

/// Message fragments (lowercase) that mark an untyped error as transient.
const TRANSIENT_MARKERS: [&str; 11] = [
    "timeout",
    "timed out",
    "network",
    "connection",
    "econnreset",
    "rate limit",
    "quota",
    "429",
    "502",
    "503",
    "504",
];

/// Hint attached to an [`UpstreamError`] by code that knows what went wrong.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum UpstreamKind {
    /// Nothing known beyond status and message.
    #[default]
    Unspecified,
    /// The downstream (or the client library) timed out.
    Timeout,
    /// Transport-level failure (DNS, reset, TLS).
    Network,
    /// Could not connect.
    Connection,
    /// Downstream refused due to rate limiting or quota.
    Throttled,
}

/// Raw failure reported by an operation.
///
/// # Example
/// ```
/// use reqvisor::UpstreamError;
///
/// let err = UpstreamError::with_status(503, "service unavailable");
/// assert_eq!(err.status, Some(503));
/// ```
#[derive(Error, Clone, Debug, PartialEq, Eq)]
#[error("{message}")]
pub struct UpstreamError {
    /// HTTP-style status code, when the downstream produced one.
    pub status: Option<u16>,
    /// Failure kind hint.
    pub kind: UpstreamKind,
    /// Human-readable message.
    pub message: String,
}

impl UpstreamError {
    /// Error with only a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: None,
            kind: UpstreamKind::Unspecified,
            message: message.into(),
        }
    }

    /// Error carrying a status code.
    pub fn with_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            ..Self::new(message)
        }
    }

    /// Error carrying a kind hint.
    pub fn with_kind(kind: UpstreamKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            ..Self::new(message)
        }
    }

    /// Whether this failure is worth retrying.
    ///
    /// Status code wins when present; any explicit kind other than
    /// `Unspecified` is transient; otherwise the message is inspected
    /// case-insensitively.
    pub fn is_transient(&self) -> bool {
        if let Some(status) = self.status {
            if TRANSIENT_STATUS.contains(&status) {
                return true;
            }
        }
        if self.kind != UpstreamKind::Unspecified {
            return true;
        }
        let lower = self.message.to_ascii_lowercase();
        TRANSIENT_MARKERS.iter().any(|m| lower.contains(m))
    }
}

/// # Errors observed by callers of the governor.
#[non_exhaustive]
#[derive(Error, Clone, Debug)]
pub enum GovernorError {
    /// Tenant exhausted its request budget for the current window.
    /// Raised before the operation is enqueued; never retried.
    #[error("rate limit exceeded for tenant {tenant}: {limit} per {window:?}, retry after {retry_after:?}")]
    RateLimitExceeded {
        tenant: TenantId,
        limit: u32,
        window: Duration,
        retry_after: Duration,
    },

    /// The attempt did not finish within the configured timeout.
    #[error("timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    /// 5xx/429-class or network-class failure; retryable.
    #[error("transient upstream failure: {message}")]
    TransientUpstream {
        status: Option<u16>,
        message: String,
    },

    /// Any other upstream failure; surfaced as-is.
    #[error("upstream failure: {message}")]
    TerminalUpstream {
        status: Option<u16>,
        message: String,
    },

    /// A retryable failure persisted through every allowed attempt.
    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        last: Box<GovernorError>,
    },

    /// Governor shut down before the request was resolved.
    #[error("governor closed")]
    Closed,
}

impl GovernorError {
    /// Classifies a raw upstream failure.
    ///
    /// # Example
    /// ```
    /// use reqvisor::{GovernorError, UpstreamError};
    ///
    /// let err = GovernorError::from_upstream(UpstreamError::with_status(401, "unauthorized"));
    /// assert!(!err.is_retryable());
    ///
    /// let err = GovernorError::from_upstream(UpstreamError::new("Connection reset by peer"));
    /// assert!(err.is_retryable());
    /// ```
    pub fn from_upstream(err: UpstreamError) -> Self {
        let transient = err.is_transient();
        let UpstreamError {
            status, message, ..
        } = err;
        if transient {
            GovernorError::TransientUpstream { status, message }
        } else {
            GovernorError::TerminalUpstream { status, message }
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            GovernorError::RateLimitExceeded { .. } => "rate_limit_exceeded",
            GovernorError::Timeout { .. } => "timeout",
            GovernorError::TransientUpstream { .. } => "transient_upstream",
            GovernorError::TerminalUpstream { .. } => "terminal_upstream",
            GovernorError::RetriesExhausted { .. } => "retries_exhausted",
            GovernorError::Closed => "closed",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            GovernorError::RateLimitExceeded {
                tenant,
                retry_after,
                ..
            } => format!("tenant={tenant} retry_after={retry_after:?}"),
            GovernorError::Timeout { timeout } => format!("timeout: {timeout:?}"),
            GovernorError::TransientUpstream { status, message }
            | GovernorError::TerminalUpstream { status, message } => match status {
                Some(code) => format!("status={code} error: {message}"),
                None => format!("error: {message}"),
            },
            GovernorError::RetriesExhausted { attempts, last } => {
                format!("attempts={attempts} last: {}", last.as_message())
            }
            GovernorError::Closed => "governor closed".to_string(),
        }
    }

    /// Indicates whether a failed attempt with this error may be retried.
    ///
    /// Only [`GovernorError::Timeout`] and [`GovernorError::TransientUpstream`].
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GovernorError::Timeout { .. } | GovernorError::TransientUpstream { .. }
        )
    }

    /// Suggested HTTP status for a route handler translating this error.
    pub fn http_status(&self) -> u16 {
        match self {
            GovernorError::RateLimitExceeded { .. } => 429,
            GovernorError::Timeout { .. } => 504,
            GovernorError::TransientUpstream { .. } | GovernorError::Closed => 503,
            GovernorError::TerminalUpstream { status, .. } => status.unwrap_or(502),
            GovernorError::RetriesExhausted { last, .. } => last.http_status(),
        }
    }
}

/// Invalid governor configuration.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("window must be non-zero when a request limit is set")]
    ZeroWindow,

    #[error("backoff factor must be finite and >= 1.0, got {0}")]
    BackoffFactor(f64),

    #[error("backoff first delay {first:?} exceeds max {max:?}")]
    BackoffRange { first: Duration, max: Duration },
}
