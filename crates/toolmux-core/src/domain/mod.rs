//! Domain types shared across the workspace.

mod capability;
mod server;

pub use capability::{
    CallToolResult, McpPrompt, McpPromptParameter, McpResource, McpTool, ReadResourceResult,
};
pub use server::{
    ConnectionStatus, DEFAULT_TIMEOUT_SECS, MAX_TIMEOUT_SECS, McpServerConfig,
    McpServerDescriptor, MIN_TIMEOUT_SECS, ServerKey, ServerSource, TransportConfig,
};
