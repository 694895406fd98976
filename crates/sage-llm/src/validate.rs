//! Local request checks run before any network I/O

use crate::error::LlmError;
use crate::types::CompletionRequest;

/// Check a request against the bounds every vendor shares
///
/// # Errors
///
/// Returns `LlmError::Validation` naming the first violated bound
pub fn validate_request(request: &CompletionRequest) -> Result<(), LlmError> {
    if request.model.trim().is_empty() {
        return Err(LlmError::validation("model must not be empty"));
    }

    if request.messages.is_empty() {
        return Err(LlmError::validation("at least one message is required"));
    }

    let params = &request.params;

    if let Some(temperature) = params.temperature
        && !(0.0..=2.0).contains(&temperature)
    {
        return Err(LlmError::Validation(format!(
            "temperature must be between 0 and 2, got {temperature}"
        )));
    }

    if params.max_tokens == Some(0) {
        return Err(LlmError::validation("max_tokens must be greater than 0"));
    }

    if let Some(top_p) = params.top_p
        && !(0.0..=1.0).contains(&top_p)
    {
        return Err(LlmError::Validation(format!("top_p must be between 0 and 1, got {top_p}")));
    }

    for (name, value) in [
        ("frequency_penalty", params.frequency_penalty),
        ("presence_penalty", params.presence_penalty),
    ] {
        if let Some(value) = value
            && !(-2.0..=2.0).contains(&value)
        {
            return Err(LlmError::Validation(format!("{name} must be between -2 and 2, got {value}")));
        }
    }

    Ok(())
}
