//! MCP server domain types.
//!
//! A server entry is identified by its name together with the configuration
//! scope it came from. The transport half of its configuration is a closed
//! union: either the hub spawns the server as a subprocess and talks over
//! its standard streams, or it connects to an already-running server over a
//! network event stream.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Default per-server request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Minimum accepted per-server timeout in seconds.
pub const MIN_TIMEOUT_SECS: u64 = 1;

/// Maximum accepted per-server timeout in seconds.
pub const MAX_TIMEOUT_SECS: u64 = 3600;

/// Configuration scope of a server entry.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ServerSource {
    /// Entry from the application-wide settings file.
    #[default]
    Global,
    /// Entry from a project-level settings file.
    Project,
}

impl fmt::Display for ServerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global => write!(f, "global"),
            Self::Project => write!(f, "project"),
        }
    }
}

/// Unique identity of a server connection: (name, source).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ServerKey {
    /// Server name as it appears in the settings file.
    pub name: String,
    /// Configuration scope the entry came from.
    pub source: ServerSource,
}

impl ServerKey {
    /// Create a new server key.
    pub fn new(name: impl Into<String>, source: ServerSource) -> Self {
        Self {
            name: name.into(),
            source,
        }
    }
}

impl fmt::Display for ServerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.source)
    }
}

/// Transport configuration: exactly one of the two supported kinds.
///
/// Adding a third transport is an explicit variant addition here, not an
/// open-ended hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportConfig {
    /// Server spawned by the hub, spoken to over stdin/stdout pipes.
    Subprocess {
        /// Executable to launch (e.g. "npx").
        command: String,
        /// Arguments passed to the executable.
        args: Vec<String>,
        /// Working directory for the child process.
        cwd: Option<String>,
        /// Environment values layered under the ambient process environment.
        env: BTreeMap<String, String>,
    },
    /// Externally-running server reached over a network event stream.
    Stream {
        /// Event-stream endpoint URL.
        url: String,
        /// Custom headers sent when opening the stream.
        headers: BTreeMap<String, String>,
    },
}

impl TransportConfig {
    /// Short kind label used in logs and UI payloads.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Subprocess { .. } => "subprocess",
            Self::Stream { .. } => "stream",
        }
    }
}

/// Full configuration of one server entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct McpServerConfig {
    /// Transport kind and its parameters.
    pub transport: TransportConfig,
    /// When true, the entry is listed but never connected.
    pub disabled: bool,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Tool ids the embedding host may invoke without confirmation.
    pub always_allow: Vec<String>,
    /// Paths whose changes are surfaced as notices while connected.
    pub watch_paths: Vec<String>,
}

impl McpServerConfig {
    /// Create a subprocess configuration with defaults for shared fields.
    #[must_use]
    pub fn subprocess(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            transport: TransportConfig::Subprocess {
                command: command.into(),
                args,
                cwd: None,
                env: BTreeMap::new(),
            },
            disabled: false,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            always_allow: Vec::new(),
            watch_paths: Vec::new(),
        }
    }

    /// Create a stream configuration with defaults for shared fields.
    #[must_use]
    pub fn stream(url: impl Into<String>) -> Self {
        Self {
            transport: TransportConfig::Stream {
                url: url.into(),
                headers: BTreeMap::new(),
            },
            disabled: false,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            always_allow: Vec::new(),
            watch_paths: Vec::new(),
        }
    }

    /// Set the disabled flag.
    #[must_use]
    pub const fn with_disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    /// Set the per-request timeout.
    #[must_use]
    pub const fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Set the always-allow tool id list.
    #[must_use]
    pub fn with_always_allow(mut self, ids: Vec<String>) -> Self {
        self.always_allow = ids;
        self
    }
}

/// A named server entry bound to its configuration scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct McpServerDescriptor {
    /// Server name as it appears in the settings file.
    pub name: String,
    /// Configuration scope the entry came from.
    pub source: ServerSource,
    /// Parsed configuration.
    pub config: McpServerConfig,
}

impl McpServerDescriptor {
    /// Create a descriptor.
    pub fn new(name: impl Into<String>, source: ServerSource, config: McpServerConfig) -> Self {
        Self {
            name: name.into(),
            source,
            config,
        }
    }

    /// Connection identity of this descriptor.
    #[must_use]
    pub fn key(&self) -> ServerKey {
        ServerKey::new(self.name.clone(), self.source)
    }
}

/// Runtime status of a server connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// Handshake in progress.
    #[default]
    Connecting,
    /// Handshake completed; the session is usable.
    Connected,
    /// Explicitly removed or disabled; never entered automatically.
    Disconnected,
    /// Connect or handshake failed.
    Error,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Disconnected => write!(f, "disconnected"),
            Self::Error => write!(f, "error"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subprocess_config_defaults() {
        let config = McpServerConfig::subprocess("npx", vec!["-y".to_string()]);
        assert_eq!(config.timeout_secs, DEFAULT_TIMEOUT_SECS);
        assert!(!config.disabled);
        assert!(config.always_allow.is_empty());
        assert_eq!(config.transport.kind(), "subprocess");
    }

    #[test]
    fn test_stream_config_kind() {
        let config = McpServerConfig::stream("http://localhost:3001/sse");
        assert_eq!(config.transport.kind(), "stream");
    }

    #[test]
    fn test_server_key_identity() {
        let a = ServerKey::new("files", ServerSource::Global);
        let b = ServerKey::new("files", ServerSource::Project);
        assert_ne!(a, b);
        assert_eq!(a, ServerKey::new("files", ServerSource::Global));
        assert_eq!(a.to_string(), "files (global)");
    }

    #[test]
    fn test_structural_equality_detects_changes() {
        let a = McpServerConfig::subprocess("echo", vec!["x".to_string()]);
        let mut b = a.clone();
        assert_eq!(a, b);
        b.timeout_secs = 30;
        assert_ne!(a, b);
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&ConnectionStatus::Connected).unwrap();
        assert_eq!(json, "\"connected\"");
    }
}
