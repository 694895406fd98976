//! HTTP plumbing shared by the remote adapters

use std::time::Duration;

use eventsource_stream::{Event, Eventsource};
use futures_util::{Stream, StreamExt};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use sage_config::Vendor;
use serde::de::DeserializeOwned;

use crate::error::LlmError;

/// Connect timeout applied to every vendor connection
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest raw body kept in an error message
const MAX_ERROR_BODY: usize = 512;

/// Build the HTTP client used by an adapter
pub(crate) fn build_client() -> Result<Client, LlmError> {
    Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .map_err(|e| LlmError::Internal(anyhow::anyhow!("failed to build HTTP client: {e}")))
}

/// Send a request and turn non-success statuses into classified errors
///
/// `timeout` bounds the whole exchange and is only passed for non-streaming
/// calls; streams rely on the connect timeout.
pub(crate) async fn send(
    vendor: Vendor,
    builder: RequestBuilder,
    timeout: Option<Duration>,
) -> Result<Response, LlmError> {
    let builder = match timeout {
        Some(t) => builder.timeout(t),
        None => builder,
    };

    let response = builder.send().await.map_err(|e| {
        tracing::error!(provider = %vendor, error = %e, "upstream request failed");
        transport_error(vendor, &e)
    })?;

    if response.status().is_success() {
        return Ok(response);
    }

    let err = error_from_response(response).await;
    tracing::warn!(provider = %vendor, error = %err, "upstream returned error");
    Err(err)
}

/// Decode a JSON body
pub(crate) async fn read_json<T: DeserializeOwned>(vendor: Vendor, response: Response) -> Result<T, LlmError> {
    response.json().await.map_err(|e| {
        if e.is_timeout() {
            transport_error(vendor, &e)
        } else {
            LlmError::provider(format!("failed to parse {vendor} response: {e}"))
        }
    })
}

/// Map a transport-level failure
pub(crate) fn transport_error(vendor: Vendor, error: &reqwest::Error) -> LlmError {
    if error.is_timeout() {
        return LlmError::provider(format!("request to {vendor} timed out"));
    }
    LlmError::ProviderFailure {
        status: error.status().map(|s| s.as_u16()),
        message: format!("request to {vendor} failed: {error}"),
    }
}

/// Classify a non-success response
pub(crate) async fn error_from_response(response: Response) -> LlmError {
    let status = response.status();
    let retry_after = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());
    let body = response.text().await.unwrap_or_default();

    error_from_parts(status, retry_after, &body)
}

pub(crate) fn error_from_parts(status: StatusCode, retry_after: Option<u64>, body: &str) -> LlmError {
    let message = extract_message(body).unwrap_or_else(|| {
        if body.trim().is_empty() {
            status.canonical_reason().unwrap_or("no response body").to_owned()
        } else {
            truncate(body.trim(), MAX_ERROR_BODY)
        }
    });

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => LlmError::Unauthenticated(message),
        StatusCode::TOO_MANY_REQUESTS => LlmError::RateLimited { retry_after, message },
        _ => LlmError::ProviderFailure {
            status: Some(status.as_u16()),
            message,
        },
    }
}

/// Pull the human-readable message out of a vendor error body
///
/// Understands `{"error":{"message":..}}`, `{"error":".."}` and `{"message":..}`.
fn extract_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;

    value
        .get("error")
        .and_then(|e| e.get("message").or(Some(e)))
        .and_then(serde_json::Value::as_str)
        .or_else(|| value.get("message").and_then(serde_json::Value::as_str))
        .map(ToOwned::to_owned)
}

fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_owned(),
    }
}

/// Server-sent events from a streaming response
pub(crate) fn sse_events(response: Response) -> impl Stream<Item = Result<Event, LlmError>> + Send {
    response
        .bytes_stream()
        .eventsource()
        .map(|result| result.map_err(|e| LlmError::provider(format!("stream interrupted: {e}"))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unwraps_nested_error_message() {
        let err = error_from_parts(
            StatusCode::SERVICE_UNAVAILABLE,
            None,
            r#"{"error":{"message":"engine overloaded","type":"server_error"}}"#,
        );
        match err {
            LlmError::ProviderFailure { status, message } => {
                assert_eq!(status, Some(503));
                assert_eq!(message, "engine overloaded");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn auth_statuses_are_unauthenticated() {
        assert!(matches!(
            error_from_parts(StatusCode::UNAUTHORIZED, None, r#"{"error":"bad key"}"#),
            LlmError::Unauthenticated(ref m) if m == "bad key"
        ));
        assert!(matches!(
            error_from_parts(StatusCode::FORBIDDEN, None, ""),
            LlmError::Unauthenticated(_)
        ));
    }

    #[test]
    fn too_many_requests_keeps_retry_after() {
        let err = error_from_parts(StatusCode::TOO_MANY_REQUESTS, Some(12), r#"{"message":"slow down"}"#);
        assert!(matches!(
            err,
            LlmError::RateLimited { retry_after: Some(12), ref message } if message == "slow down"
        ));
    }

    #[test]
    fn non_json_body_is_truncated() {
        let body = "x".repeat(2000);
        let err = error_from_parts(StatusCode::BAD_GATEWAY, None, &body);
        match err {
            LlmError::ProviderFailure { message, .. } => assert!(message.len() < 600),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn empty_body_uses_reason_phrase() {
        let err = error_from_parts(StatusCode::SERVICE_UNAVAILABLE, None, "");
        assert!(err.to_string().contains("Service Unavailable"));
        assert!(err.is_retryable());
    }
}
