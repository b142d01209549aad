//! Capability types discovered from connected servers.
//!
//! Tools, resources, and prompts keep the name of the server that owns them
//! so aggregated lists stay unambiguous when two servers expose the same id.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A callable remote operation exposed by a server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpTool {
    /// Stable identifier used for invocation and always-allow matching.
    pub id: String,

    /// Display name (falls back to the id when the server gives none).
    pub name: String,

    /// Human-readable description; empty when the server omits one.
    #[serde(default)]
    pub description: String,

    /// JSON-schema-like contract for call arguments.
    pub input_schema: Value,

    /// Declared output schema, when the server provides one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,

    /// Name of the owning server.
    pub server_name: String,

    /// Whether the owning server's entry always-allows this tool.
    pub always_allow: bool,
}

/// A URI-addressable piece of content exposed by a server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpResource {
    /// Resource URI.
    pub uri: String,

    /// Display name; empty when the server omits one.
    #[serde(default)]
    pub name: String,

    /// Human-readable description; empty when the server omits one.
    #[serde(default)]
    pub description: String,

    /// Name of the owning server.
    pub server_name: String,
}

/// A parameter accepted by a prompt template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpPromptParameter {
    /// Parameter name.
    pub name: String,

    /// Human-readable description; empty when the server omits one.
    #[serde(default)]
    pub description: String,

    /// Whether the parameter must be supplied.
    #[serde(default)]
    pub required: bool,
}

/// A named template exposed by a server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpPrompt {
    /// Stable identifier.
    pub id: String,

    /// Display name (falls back to the id when the server gives none).
    pub name: String,

    /// Human-readable description; empty when the server omits one.
    #[serde(default)]
    pub description: String,

    /// Template text; empty when the server only lists the prompt.
    #[serde(default)]
    pub template: String,

    /// Declared parameters.
    #[serde(default)]
    pub parameters: Vec<McpPromptParameter>,

    /// Name of the owning server.
    pub server_name: String,
}

/// Outcome of a tool invocation: a payload or an error string, never both.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallToolResult {
    /// Result payload when the call succeeded.
    pub result: Option<Value>,

    /// Error message when the call failed.
    pub error: Option<String>,
}

impl CallToolResult {
    /// Create a success result.
    #[must_use]
    pub const fn ok(result: Value) -> Self {
        Self {
            result: Some(result),
            error: None,
        }
    }

    /// Create an error result.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            result: None,
            error: Some(message.into()),
        }
    }

    /// Whether this result carries an error.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Outcome of a resource read: content or an error string, never both.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadResourceResult {
    /// Resource content when the read succeeded.
    pub content: Option<String>,

    /// MIME type reported alongside the content.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,

    /// Error message when the read failed.
    pub error: Option<String>,
}

impl ReadResourceResult {
    /// Create a success result.
    #[must_use]
    pub const fn ok(content: String, mime_type: Option<String>) -> Self {
        Self {
            content: Some(content),
            mime_type,
            error: None,
        }
    }

    /// Create an error result.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: None,
            mime_type: None,
            error: Some(message.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_call_result_ok() {
        let result = CallToolResult::ok(json!({"temp": 72}));
        assert!(!result.is_error());
        assert!(result.result.is_some());
        assert!(result.error.is_none());
    }

    #[test]
    fn test_call_result_error() {
        let result = CallToolResult::error("Server files not found");
        assert!(result.is_error());
        assert!(result.result.is_none());
        assert_eq!(result.error.as_deref(), Some("Server files not found"));
    }

    #[test]
    fn test_tool_serialization_skips_absent_output_schema() {
        let tool = McpTool {
            id: "read_file".to_string(),
            name: "read_file".to_string(),
            description: String::new(),
            input_schema: json!({"type": "object"}),
            output_schema: None,
            server_name: "files".to_string(),
            always_allow: false,
        };
        let json = serde_json::to_string(&tool).unwrap();
        assert!(!json.contains("output_schema"));
        assert!(json.contains("\"server_name\":\"files\""));
    }

    #[test]
    fn test_read_resource_result_roundtrip() {
        let ok = ReadResourceResult::ok("hello".to_string(), Some("text/plain".to_string()));
        assert_eq!(ok.content.as_deref(), Some("hello"));
        assert!(ok.error.is_none());

        let err = ReadResourceResult::error("Resource x://y not found");
        assert!(err.content.is_none());
        assert!(err.error.is_some());
    }
}
