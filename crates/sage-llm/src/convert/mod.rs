//! Conversion between the neutral types and each vendor's wire format

pub mod anthropic;
pub mod google;
pub mod ollama;
pub mod openai;

/// Parse JSON-encoded tool arguments, falling back to an empty object
pub(crate) fn parse_arguments(arguments: &str) -> serde_json::Value {
    if arguments.trim().is_empty() {
        return serde_json::json!({});
    }
    serde_json::from_str(arguments).unwrap_or_else(|_| serde_json::json!({}))
}

/// Encode structured tool arguments as a JSON string
pub(crate) fn encode_arguments(arguments: &serde_json::Value) -> String {
    if arguments.is_null() {
        return "{}".to_owned();
    }
    serde_json::to_string(arguments).unwrap_or_else(|_| "{}".to_owned())
}
