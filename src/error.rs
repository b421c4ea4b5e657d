//! Error types for the fleet node operator
//!
//! Provides structured error types for the reconciliation engine, the object
//! store adapters, and the per-kind request handlers, along with the requeue
//! policy applied when a reconcile pass fails.

use std::time::Duration;
use thiserror::Error;

/// Unified error type for the operator
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Startup / Configuration Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // =========================================================================
    // Object Store Errors
    // =========================================================================
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// A patch was rejected because the object changed concurrently. The
    /// engine re-fetches and re-runs its decision logic on this error; it is
    /// only surfaced to the dispatcher when the retry budget is exhausted.
    #[error("Write conflict on {kind} {namespace}/{name}")]
    Conflict {
        kind: String,
        namespace: String,
        name: String,
    },

    // =========================================================================
    // Request Handler Errors
    // =========================================================================
    /// A business rule failed while fulfilling or cleaning up a request. The
    /// finalizer stays in place, the failure is recorded as a status
    /// condition, and the request is retried on a later trigger.
    #[error("Request handling failed: {reason}: {message}")]
    Hook { reason: String, message: String },

    // =========================================================================
    // Serialization Errors
    // =========================================================================
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Action to take on error during reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorAction {
    /// Requeue with exponential backoff
    RequeueWithBackoff,
    /// Requeue after specific duration
    RequeueAfter(Duration),
    /// Don't requeue, wait for changes
    NoRequeue,
}

impl Error {
    /// Shorthand for a handler-reported business failure
    pub fn hook(reason: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Hook {
            reason: reason.into(),
            message: message.into(),
        }
    }

    /// Determine what action to take for this error
    pub fn action(&self) -> ErrorAction {
        match self {
            // Transient store errors - retry with backoff
            Error::Kube(_) | Error::Conflict { .. } => ErrorAction::RequeueWithBackoff,

            // Business failures - recorded in status, retried on a later pass
            Error::Hook { .. } => ErrorAction::RequeueAfter(Duration::from_secs(30)),

            // Startup and serialization problems are not fixed by retrying
            Error::Configuration(_) | Error::Json(_) => ErrorAction::NoRequeue,

            Error::Internal(_) => ErrorAction::RequeueWithBackoff,
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        !matches!(self.action(), ErrorAction::NoRequeue)
    }

    /// Check if this error is a concurrent-write conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict { .. })
    }
}

/// Result type alias for the operator
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_error_actions() {
        let err = Error::hook("AllocationFailed", "no nodes available in madrid");
        assert_eq!(
            err.action(),
            ErrorAction::RequeueAfter(Duration::from_secs(30))
        );

        let err = Error::Configuration("bad finalizer token".into());
        assert_eq!(err.action(), ErrorAction::NoRequeue);

        let err = Error::Conflict {
            kind: "NodeAllocationRequest".into(),
            namespace: "hw".into(),
            name: "req-1".into(),
        };
        assert_eq!(err.action(), ErrorAction::RequeueWithBackoff);
    }

    #[test]
    fn test_error_retryable() {
        let conflict = Error::Conflict {
            kind: "NodeReleaseRequest".into(),
            namespace: "hw".into(),
            name: "req-2".into(),
        };
        assert!(conflict.is_retryable());
        assert!(conflict.is_conflict());

        let config_err = Error::Configuration("invalid".into());
        assert!(!config_err.is_retryable());
        assert!(!config_err.is_conflict());
    }

    #[test]
    fn test_hook_shorthand() {
        let err = Error::hook("ReleaseFailed", "node busy");
        assert_matches!(err, Error::Hook { ref reason, .. } if reason == "ReleaseFailed");
    }
}
