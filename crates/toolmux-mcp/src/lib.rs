//! MCP client hub for toolmux.
//!
//! Connects to independently operated MCP servers over two transports
//! (subprocess stdio pipes and server-sent-event streams), aggregates
//! their tools, resources, and prompts behind a TTL cache, reconciles the
//! settings file against live connections as it changes, and hands the
//! embedding process a reference-counted shared hub with precise teardown.

#![deny(unsafe_code)]
#![deny(unused_crate_dependencies)]

pub mod client;
pub(crate) mod connection;
pub mod hub;
pub mod lifecycle;
pub mod protocol;
pub mod schema;
pub mod transport;
pub(crate) mod watcher;

// Re-export domain types from core for convenience
pub use toolmux_core::{
    CallToolResult, ConnectionStatus, McpHubError, McpPrompt, McpResource, McpServerConfig,
    McpServerDescriptor, McpTool, ReadResourceResult, ServerKey, ServerSource, TransportConfig,
};

// Re-export this crate's public types
pub use client::{McpClient, McpSession};
pub use connection::McpServerInfo;
pub use hub::{CACHE_TTL, DefaultConnector, McpConnector, McpHub};
pub use lifecycle::{HubHandle, HubRegistry};
pub use transport::{McpClientError, StdioTransport, StreamTransport, Transport};
