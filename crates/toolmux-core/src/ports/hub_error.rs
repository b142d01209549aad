//! Hub error taxonomy.

use thiserror::Error;

use super::HostError;
use crate::settings::SettingsError;

/// Failure modes surfaced by hub operations.
///
/// Query and call operations prefer returning result-or-error values
/// ([`crate::domain::CallToolResult`]); this enum covers the paths that do
/// raise, notably settings handling and first-time hub construction.
#[derive(Debug, Error)]
pub enum McpHubError {
    /// Settings file was malformed or failed schema validation.
    #[error("Configuration error: {0}")]
    ConfigParse(String),

    /// A transport failed to establish.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Unknown server, tool, resource, or prompt reference.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Arguments failed a tool's input schema.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A transport round trip exceeded the configured timeout.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// The remote tool explicitly reported failure.
    #[error("Tool execution error: {0}")]
    ToolExecution(String),
}

impl From<HostError> for McpHubError {
    fn from(e: HostError) -> Self {
        Self::ConfigParse(e.to_string())
    }
}

impl From<SettingsError> for McpHubError {
    fn from(e: SettingsError) -> Self {
        Self::ConfigParse(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_error_converts_to_config_parse() {
        let err: McpHubError = SettingsError::Parse("bad token".to_string()).into();
        assert!(matches!(err, McpHubError::ConfigParse(_)));
        assert!(err.to_string().contains("bad token"));
    }
}
