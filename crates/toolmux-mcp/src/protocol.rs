//! MCP JSON-RPC 2.0 wire types.
//!
//! Everything here mirrors the wire format, tolerant of omitted optional
//! fields. Reference: <https://spec.modelcontextprotocol.io/>

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol revision sent in the initialize handshake.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// JSON-RPC 2.0 request.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method: method.into(),
            params,
        }
    }
}

/// JSON-RPC 2.0 response.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponse {
    #[allow(dead_code)]
    pub jsonrpc: String,
    pub id: Option<u64>,
    pub result: Option<Value>,
    pub error: Option<JsonRpcError>,
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[allow(dead_code)]
    pub data: Option<Value>,
}

/// Server information from the initialize response.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    #[serde(default)]
    pub version: String,
}

/// Server capabilities from the initialize response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerCapabilities {
    #[serde(default)]
    pub tools: Option<Value>,
    #[serde(default)]
    pub resources: Option<Value>,
    #[serde(default)]
    pub prompts: Option<Value>,
}

/// MCP initialize response.
#[derive(Debug, Clone, Deserialize)]
pub struct InitializeResult {
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    #[serde(default)]
    pub capabilities: ServerCapabilities,
    #[serde(default, rename = "serverInfo")]
    pub server_info: Option<ServerInfo>,
}

/// Tool definition from `tools/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireTool {
    pub name: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_input_schema", rename = "inputSchema")]
    pub input_schema: Value,
    #[serde(default, rename = "outputSchema")]
    pub output_schema: Option<Value>,
}

fn default_input_schema() -> Value {
    serde_json::json!({"type": "object", "properties": {}})
}

/// Resource definition from `resources/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireResource {
    pub uri: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Prompt argument from `prompts/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WirePromptArgument {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub required: Option<bool>,
}

/// Prompt definition from `prompts/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WirePrompt {
    pub name: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub arguments: Vec<WirePromptArgument>,
}

/// Content block in a `tools/call` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireContent {
    #[serde(rename = "type")]
    pub content_type: String,
    #[serde(default)]
    pub text: String,
}

/// Result of `tools/call`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallToolWireResult {
    #[serde(default)]
    pub content: Vec<WireContent>,
    #[serde(default, rename = "isError")]
    pub is_error: bool,
}

impl CallToolWireResult {
    /// First textual content item, when present.
    #[must_use]
    pub fn first_text(&self) -> Option<&str> {
        self.content
            .iter()
            .find(|c| c.content_type == "text" && !c.text.is_empty())
            .map(|c| c.text.as_str())
    }
}

/// One content entry in a `resources/read` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireResourceContent {
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default, rename = "mimeType")]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub blob: Option<String>,
}

/// Result of `resources/read`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadResourceWireResult {
    #[serde(default)]
    pub contents: Vec<WireResourceContent>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization() {
        let request = JsonRpcRequest::new(1, "tools/list", None);
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("\"jsonrpc\":\"2.0\""));
        assert!(json.contains("\"method\":\"tools/list\""));
        assert!(!json.contains("params")); // omitted when None
    }

    #[test]
    fn test_response_parsing() {
        let json = r#"{"jsonrpc":"2.0","id":1,"result":{"tools":[]}}"#;
        let response: JsonRpcResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.id, Some(1));
        assert!(response.result.is_some());
        assert!(response.error.is_none());
    }

    #[test]
    fn test_error_parsing() {
        let json =
            r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32600,"message":"Invalid Request"}}"#;
        let response: JsonRpcResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.error.as_ref().unwrap().code, -32600);
    }

    #[test]
    fn test_wire_tool_defaults() {
        let tool: WireTool = serde_json::from_str(r#"{"name":"read_file"}"#).unwrap();
        assert_eq!(tool.name, "read_file");
        assert!(tool.description.is_none());
        assert_eq!(tool.input_schema["type"], "object");
    }

    #[test]
    fn test_call_result_first_text() {
        let result: CallToolWireResult = serde_json::from_str(
            r#"{"content":[{"type":"image","text":""},{"type":"text","text":"boom"}],"isError":true}"#,
        )
        .unwrap();
        assert!(result.is_error);
        assert_eq!(result.first_text(), Some("boom"));

        let empty: CallToolWireResult = serde_json::from_str(r#"{"isError":true}"#).unwrap();
        assert_eq!(empty.first_text(), None);
    }

    #[test]
    fn test_wire_prompt_arguments() {
        let prompt: WirePrompt = serde_json::from_str(
            r#"{"name":"summarize","description":"Summarize text","arguments":[{"name":"text","required":true}]}"#,
        )
        .unwrap();
        assert_eq!(prompt.arguments.len(), 1);
        assert_eq!(prompt.arguments[0].required, Some(true));
        assert!(prompt.template.is_none());
    }
}
