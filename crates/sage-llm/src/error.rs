use sage_config::Vendor;
use thiserror::Error;

/// Errors surfaced by adapters and the orchestrator
#[derive(Debug, Error)]
pub enum LlmError {
    /// Request failed local checks before any network I/O
    #[error("invalid request: {0}")]
    Validation(String),

    /// Vendor rejected the credential (HTTP 401/403)
    #[error("authentication failed: {0}")]
    Unauthenticated(String),

    /// Vendor is throttling requests (HTTP 429)
    #[error("rate limited: {message}")]
    RateLimited {
        /// Seconds until the limit resets, from `Retry-After`
        retry_after: Option<u64>,
        /// Vendor-supplied detail
        message: String,
    },

    /// Any other vendor or transport failure
    #[error("provider failure{}: {message}", .status.map_or_else(String::new, |s| format!(" (status {s})")))]
    ProviderFailure {
        /// HTTP status, when the vendor answered at all
        status: Option<u16>,
        /// Unwrapped vendor message or transport error text
        message: String,
    },

    /// No adapter is registered for the vendor
    #[error("provider not configured: {provider}")]
    ProviderNotFound {
        /// Vendor that was asked for
        provider: Vendor,
    },

    /// Every candidate in the fallback chain failed and the last error did
    /// not come from a vendor
    #[error("all {attempts} attempts failed; last error: {last}")]
    Exhausted {
        /// Number of candidates tried
        attempts: usize,
        /// Error returned by the final candidate
        last: Box<LlmError>,
    },

    /// Unexpected internal error
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl LlmError {
    /// Whether this error should advance the fallback chain
    pub fn is_retryable(&self) -> bool {
        crate::classify::is_retryable(self)
    }

    /// Whether the error came from a vendor rather than from local checks
    pub const fn is_provider_domain(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::ProviderFailure { .. })
    }

    /// Build a status-less provider failure
    pub fn provider(message: impl Into<String>) -> Self {
        Self::ProviderFailure {
            status: None,
            message: message.into(),
        }
    }

    /// Build a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}
