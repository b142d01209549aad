//! MCP protocol client layered on a [`Transport`].
//!
//! [`McpClient`] performs the initialize handshake and exposes the discovery
//! and invocation calls. The [`McpSession`] port is the seam the hub talks
//! through, so hub logic can be exercised with stub sessions in tests.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::time::Duration;

use toolmux_core::McpServerConfig;

use crate::protocol::{
    CallToolWireResult, InitializeResult, PROTOCOL_VERSION, ReadResourceWireResult,
    ServerCapabilities, ServerInfo, WirePrompt, WireResource, WireTool,
};
use crate::transport::{McpClientError, Transport};

/// An initialized protocol session with one server.
#[async_trait]
pub trait McpSession: Send + Sync {
    /// Server identity reported during the handshake.
    fn server_info(&self) -> Option<&ServerInfo>;

    /// List the server's tools; empty when the capability is absent.
    async fn list_tools(&self) -> Result<Vec<WireTool>, McpClientError>;

    /// List the server's resources; empty when the capability is absent.
    async fn list_resources(&self) -> Result<Vec<WireResource>, McpClientError>;

    /// List the server's prompts; empty when the capability is absent.
    async fn list_prompts(&self) -> Result<Vec<WirePrompt>, McpClientError>;

    /// Invoke a tool.
    async fn call_tool(
        &self,
        name: &str,
        arguments: Value,
    ) -> Result<CallToolWireResult, McpClientError>;

    /// Read a resource.
    async fn read_resource(&self, uri: &str) -> Result<ReadResourceWireResult, McpClientError>;

    /// Tear down the underlying transport.
    async fn shutdown(&self);
}

/// Production session over the two-variant transport.
pub struct McpClient {
    transport: Transport,
    server_info: Option<ServerInfo>,
    capabilities: ServerCapabilities,
}

impl McpClient {
    /// Connect the configured transport and perform the MCP handshake.
    pub async fn connect(
        server_name: &str,
        config: &McpServerConfig,
        client_name: &str,
        client_version: &str,
    ) -> Result<Self, McpClientError> {
        let request_timeout = Duration::from_secs(config.timeout_secs);
        let transport = Transport::connect(&config.transport, request_timeout).await?;

        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "clientInfo": {
                "name": client_name,
                "version": client_version,
            },
            "capabilities": {},
        });

        let result = transport.request("initialize", Some(params)).await?;
        let init: InitializeResult = serde_json::from_value(result)?;

        transport.notify("notifications/initialized", None).await?;

        tracing::info!(
            server_name,
            transport = transport.kind(),
            protocol_version = %init.protocol_version,
            "MCP session initialized"
        );

        Ok(Self {
            transport,
            server_info: init.server_info,
            capabilities: init.capabilities,
        })
    }

    async fn list<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        field: &str,
        supported: bool,
    ) -> Result<Vec<T>, McpClientError> {
        // Servers that never declared the capability are not queried.
        if !supported {
            return Ok(Vec::new());
        }

        let result = self.transport.request(method, None).await?;
        let items = result.get(field).cloned().unwrap_or_else(|| json!([]));
        Ok(serde_json::from_value(items)?)
    }
}

#[async_trait]
impl McpSession for McpClient {
    fn server_info(&self) -> Option<&ServerInfo> {
        self.server_info.as_ref()
    }

    async fn list_tools(&self) -> Result<Vec<WireTool>, McpClientError> {
        self.list("tools/list", "tools", self.capabilities.tools.is_some())
            .await
    }

    async fn list_resources(&self) -> Result<Vec<WireResource>, McpClientError> {
        self.list(
            "resources/list",
            "resources",
            self.capabilities.resources.is_some(),
        )
        .await
    }

    async fn list_prompts(&self) -> Result<Vec<WirePrompt>, McpClientError> {
        self.list(
            "prompts/list",
            "prompts",
            self.capabilities.prompts.is_some(),
        )
        .await
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Value,
    ) -> Result<CallToolWireResult, McpClientError> {
        let params = json!({
            "name": name,
            "arguments": arguments,
        });
        let result = self.transport.request("tools/call", Some(params)).await?;
        Ok(serde_json::from_value(result)?)
    }

    async fn read_resource(&self, uri: &str) -> Result<ReadResourceWireResult, McpClientError> {
        let params = json!({ "uri": uri });
        let result = self
            .transport
            .request("resources/read", Some(params))
            .await?;
        Ok(serde_json::from_value(result)?)
    }

    async fn shutdown(&self) {
        self.transport.shutdown().await;
    }
}
