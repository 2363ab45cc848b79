use std::time::Duration;

use reelsmith_core::Stage;

/// Errors from a single stage call against the provider.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The provider returned a non-2xx status code.
    #[error("Provider API error ({status}): {body}")]
    Api {
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// The provider answered with an `"error"` envelope.
    #[error("Provider reported an error: {message}")]
    Provider { message: String },

    /// The response could not be understood (bad JSON, missing field).
    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),

    /// The call did not finish within its stage timeout.
    #[error("Stage {stage} timed out after {}s", after.as_secs())]
    Timeout { stage: Stage, after: Duration },
}

impl StageError {
    /// Whether retrying the same call may succeed.
    ///
    /// Network failures, timeouts, 408/429/5xx responses and provider error
    /// envelopes are transient. Other client errors and malformed responses
    /// are not.
    pub fn is_transient(&self) -> bool {
        match self {
            StageError::Request(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            StageError::Api { status, .. } => {
                matches!(*status, 408 | 429) || (500..600).contains(status)
            }
            StageError::Provider { .. } | StageError::Timeout { .. } => true,
            StageError::InvalidResponse(_) => false,
        }
    }
}
