//! Classified errors for remote service calls.
//!
//! Every failure carries a closed `kind` tag and a `retryable` flag so
//! callers never parse message text to decide what to do next. Matching
//! is exhaustive; there is no duck-typing on error shapes.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The failure taxonomy shared with the remote service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiErrorKind {
    /// Bad or missing credential. Never retried.
    Auth,

    /// Remote rate limiting. Retried, honoring `retry_after`.
    Quota,

    /// Connectivity or DNS fault. Retried with backoff.
    Network,

    /// Remote 5xx. Retried with backoff.
    Server,

    /// Catch-all; treated as transient unless flagged otherwise.
    Unknown,
}

impl fmt::Display for ApiErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Auth => "auth",
            Self::Quota => "quota",
            Self::Network => "network",
            Self::Server => "server",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// A classified remote failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} error: {message}")]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub message: String,

    /// Whether the service considers this failure transient
    pub retryable: bool,

    /// Server-provided delay hint in seconds, if any
    pub retry_after: Option<u64>,
}

impl ApiError {
    pub fn auth(message: impl Into<String>) -> Self {
        Self {
            kind: ApiErrorKind::Auth,
            message: message.into(),
            retryable: false,
            retry_after: None,
        }
    }

    pub fn quota(message: impl Into<String>, retry_after: Option<u64>) -> Self {
        Self {
            kind: ApiErrorKind::Quota,
            message: message.into(),
            retryable: true,
            retry_after,
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self {
            kind: ApiErrorKind::Network,
            message: message.into(),
            retryable: true,
            retry_after: None,
        }
    }

    pub fn server(message: impl Into<String>) -> Self {
        Self {
            kind: ApiErrorKind::Server,
            message: message.into(),
            retryable: true,
            retry_after: None,
        }
    }

    pub fn unknown(message: impl Into<String>, retryable: bool) -> Self {
        Self {
            kind: ApiErrorKind::Unknown,
            message: message.into(),
            retryable,
            retry_after: None,
        }
    }

    /// Retry policy decision: the `retryable` flag, with the hard
    /// override that auth failures are never retried.
    pub fn should_retry(&self) -> bool {
        self.retryable && self.kind != ApiErrorKind::Auth
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_never_retryable_even_when_flagged() {
        let mut err = ApiError::auth("bad key");
        err.retryable = true;
        assert!(!err.should_retry());
    }

    #[test]
    fn test_quota_carries_hint() {
        let err = ApiError::quota("slow down", Some(5));
        assert!(err.should_retry());
        assert_eq!(err.retry_after, Some(5));
    }

    #[test]
    fn test_kind_wire_names() {
        assert_eq!(
            serde_json::to_string(&ApiErrorKind::Network).unwrap(),
            "\"network\""
        );
        let parsed: ApiErrorKind = serde_json::from_str("\"auth\"").unwrap();
        assert_eq!(parsed, ApiErrorKind::Auth);
    }

    #[test]
    fn test_display_includes_kind() {
        let err = ApiError::server("boom");
        assert_eq!(err.to_string(), "server error: boom");
    }
}
