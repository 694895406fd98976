//! Retryable versus permanent failure classification

use crate::error::LlmError;

/// Lower-cased substrings that mark a failure as transient
const TRANSIENT_SIGNATURES: &[&str] = &[
    "429",
    "503",
    "timeout",
    "timed out",
    "connection reset",
    "econnreset",
    "overloaded",
    "capacity",
    "temporarily unavailable",
    "service unavailable",
];

/// HTTP statuses that are always worth retrying elsewhere
const TRANSIENT_STATUSES: &[u16] = &[429, 503];

/// Whether a failure should advance the fallback chain
///
/// Only rate limiting and provider failures that look transient qualify;
/// authentication, validation and configuration errors never do.
pub fn is_retryable(error: &LlmError) -> bool {
    match error {
        LlmError::RateLimited { .. } => true,
        LlmError::ProviderFailure { status, message } => {
            status.is_some_and(|s| TRANSIENT_STATUSES.contains(&s)) || has_transient_signature(message)
        }
        LlmError::Validation(_)
        | LlmError::Unauthenticated(_)
        | LlmError::ProviderNotFound { .. }
        | LlmError::Exhausted { .. }
        | LlmError::Internal(_) => false,
    }
}

fn has_transient_signature(message: &str) -> bool {
    let lowered = message.to_lowercase();
    TRANSIENT_SIGNATURES.iter().any(|sig| lowered.contains(sig))
}

#[cfg(test)]
mod tests {
    use sage_config::Vendor;

    use super::*;

    fn failure(status: Option<u16>, message: &str) -> LlmError {
        LlmError::ProviderFailure {
            status,
            message: message.to_owned(),
        }
    }

    #[test]
    fn rate_limited_is_retryable() {
        let err = LlmError::RateLimited {
            retry_after: None,
            message: String::new(),
        };
        assert!(is_retryable(&err));
    }

    #[test]
    fn transient_statuses_are_retryable() {
        assert!(is_retryable(&failure(Some(429), "")));
        assert!(is_retryable(&failure(Some(503), "")));
        assert!(!is_retryable(&failure(Some(500), "internal server error")));
        assert!(!is_retryable(&failure(Some(400), "bad request")));
    }

    #[test]
    fn transient_signatures_match_case_insensitively() {
        for message in [
            "Request Timeout",
            "operation timed out",
            "Connection reset by peer",
            "read ECONNRESET",
            "Overloaded",
            "model at capacity",
            "Temporarily Unavailable",
            "Service Unavailable",
            "upstream said 503",
        ] {
            assert!(is_retryable(&failure(None, message)), "{message}");
        }
    }

    #[test]
    fn permanent_errors_are_not_retryable() {
        assert!(!is_retryable(&LlmError::Validation("timeout".to_owned())));
        assert!(!is_retryable(&LlmError::Unauthenticated("invalid key".to_owned())));
        assert!(!is_retryable(&LlmError::ProviderNotFound {
            provider: Vendor::Google
        }));
        assert!(!is_retryable(&LlmError::Internal(anyhow::anyhow!("timed out"))));
        assert!(!is_retryable(&LlmError::Exhausted {
            attempts: 1,
            last: Box::new(failure(Some(503), "")),
        }));
        assert!(!is_retryable(&failure(None, "model not found")));
    }
}
