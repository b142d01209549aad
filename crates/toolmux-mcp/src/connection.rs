//! Connection state for one configured server.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use toolmux_core::{ConnectionStatus, McpServerDescriptor, McpTool, ServerKey, ServerSource};

use crate::client::McpSession;

/// A configured server paired with its live session (when any).
///
/// Placeholder connections (failed or disabled servers) keep `session` empty
/// so the server stays visible in listings instead of silently absent.
pub(crate) struct McpConnection {
    /// Descriptor the connection was built from.
    pub descriptor: McpServerDescriptor,

    /// Initialized protocol session; `None` for placeholders.
    pub session: Option<Arc<dyn McpSession>>,

    /// Current status.
    pub status: ConnectionStatus,

    /// Messages accumulated from failed operations.
    pub errors: Vec<String>,

    /// Tools discovered from this server, refreshed on each discovery pass.
    pub tools: Vec<McpTool>,

    /// When the session last completed its handshake.
    pub connected_at: Option<DateTime<Utc>>,

    /// Keeps per-server watch-path watchers alive for the connection's
    /// lifetime; dropping them releases the file-system watches.
    pub path_watchers: Vec<notify::RecommendedWatcher>,
}

impl McpConnection {
    /// Create a placeholder in the given status, with no session.
    pub fn placeholder(descriptor: McpServerDescriptor, status: ConnectionStatus) -> Self {
        Self {
            descriptor,
            session: None,
            status,
            errors: Vec::new(),
            tools: Vec::new(),
            connected_at: None,
            path_watchers: Vec::new(),
        }
    }

    /// Connection identity.
    pub fn key(&self) -> ServerKey {
        self.descriptor.key()
    }

    /// Whether this connection participates in aggregation.
    pub fn is_aggregatable(&self) -> bool {
        !self.descriptor.config.disabled && self.status == ConnectionStatus::Connected
    }

    /// Record a failure message and flip into the error status.
    pub fn record_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
        self.status = ConnectionStatus::Error;
    }

    /// Snapshot for listings and UI payloads.
    pub fn info(&self) -> McpServerInfo {
        McpServerInfo {
            name: self.descriptor.name.clone(),
            source: self.descriptor.source,
            status: self.status,
            disabled: self.descriptor.config.disabled,
            transport: self.descriptor.config.transport.kind().to_string(),
            errors: self.errors.clone(),
            tools: self.tools.clone(),
            connected_at: self.connected_at,
        }
    }
}

/// Serializable snapshot of one server's connection state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServerInfo {
    /// Server name.
    pub name: String,
    /// Configuration scope.
    pub source: ServerSource,
    /// Current status.
    pub status: ConnectionStatus,
    /// Whether the entry is disabled in settings.
    pub disabled: bool,
    /// Transport kind label.
    pub transport: String,
    /// Accumulated error messages.
    pub errors: Vec<String>,
    /// Tools discovered from this server.
    pub tools: Vec<McpTool>,
    /// When the session last completed its handshake.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connected_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use toolmux_core::McpServerConfig;

    fn descriptor(name: &str) -> McpServerDescriptor {
        McpServerDescriptor::new(
            name,
            ServerSource::Global,
            McpServerConfig::subprocess("echo", vec![]),
        )
    }

    #[test]
    fn test_placeholder_has_no_session() {
        let connection = McpConnection::placeholder(descriptor("a"), ConnectionStatus::Connecting);
        assert!(connection.session.is_none());
        assert!(connection.errors.is_empty());
        assert!(!connection.is_aggregatable());
    }

    #[test]
    fn test_record_error_flips_status() {
        let mut connection =
            McpConnection::placeholder(descriptor("a"), ConnectionStatus::Connecting);
        connection.record_error("spawn failed");
        assert_eq!(connection.status, ConnectionStatus::Error);
        assert_eq!(connection.errors, vec!["spawn failed".to_string()]);
    }

    #[test]
    fn test_info_snapshot_serializes() {
        let connection = McpConnection::placeholder(descriptor("a"), ConnectionStatus::Error);
        let json = serde_json::to_value(connection.info()).unwrap();
        assert_eq!(json["name"], "a");
        assert_eq!(json["status"], "error");
        assert_eq!(json["transport"], "subprocess");
    }
}
