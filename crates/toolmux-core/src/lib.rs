//! Core domain types and port definitions for toolmux.
//!
//! This crate is pure domain: server descriptors and transport configs, the
//! capability types discovered from servers, the settings-file model with
//! its schema validation, and the ports the hub crate plugs into. No
//! network or process machinery lives here.

#![deny(unsafe_code)]
#![deny(unused_crate_dependencies)]

pub mod domain;
pub mod ports;
pub mod settings;

// Re-export commonly used types for convenience
pub use domain::{
    CallToolResult, ConnectionStatus, DEFAULT_TIMEOUT_SECS, MAX_TIMEOUT_SECS, McpPrompt,
    McpPromptParameter, McpResource, McpServerConfig, McpServerDescriptor, McpTool,
    MIN_TIMEOUT_SECS, ReadResourceResult, ServerKey, ServerSource, TransportConfig,
};
pub use ports::{FsHostProvider, HostError, HostProvider, McpHubError};
pub use settings::{
    DEFAULT_SETTINGS_CONTENT, FieldError, ParsedSettings, RawServerConfig, SettingsError,
    parse_settings, validate_entry,
};
