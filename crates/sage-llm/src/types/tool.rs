use serde::{Deserialize, Serialize};

/// A tool offered to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Only `"function"` exists today
    #[serde(rename = "type", default = "function_type")]
    pub tool_type: String,
    /// Function signature
    pub function: FunctionDefinition,
}

impl ToolDefinition {
    /// Function tool with a JSON-schema parameter object
    pub fn function(name: impl Into<String>, description: Option<String>, parameters: serde_json::Value) -> Self {
        Self {
            tool_type: function_type(),
            function: FunctionDefinition {
                name: name.into(),
                description,
                parameters: Some(parameters),
            },
        }
    }
}

/// Name, description and argument schema of a function
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDefinition {
    /// Function name
    pub name: String,
    /// Human-readable description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema for the function parameters, forwarded untouched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<serde_json::Value>,
}

/// How the model should select tools
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolChoice {
    /// Never call a tool
    None,
    /// Let the model decide
    Auto,
    /// Call at least one tool
    Required,
    /// Model must call the named function
    Function {
        /// Function to call
        name: String,
    },
}

fn function_type() -> String {
    "function".to_owned()
}
