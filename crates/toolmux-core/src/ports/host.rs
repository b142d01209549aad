//! Host application port.
//!
//! The hub is embedded in a larger application that owns the UI, the data
//! directory, and the settings file location. Everything the hub needs from
//! that application goes through this port so the hub stays testable without
//! a running host.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::settings::DEFAULT_SETTINGS_CONTENT;

/// Errors raised by host-side file operations.
#[derive(Debug, Error)]
pub enum HostError {
    /// The settings file or its directory could not be created or read.
    #[error("Settings file unavailable at '{path}': {message}")]
    SettingsUnavailable {
        /// Path that failed.
        path: String,
        /// Underlying error message.
        message: String,
    },
}

/// Capabilities provided by the embedding application.
#[async_trait]
pub trait HostProvider: Send + Sync {
    /// Application name, used in the protocol handshake.
    fn app_name(&self) -> &str;

    /// Application version, used in the protocol handshake.
    fn app_version(&self) -> &str;

    /// Resolve the settings file path, creating the file (and its parent
    /// directories) with default empty content if it does not exist.
    async fn ensure_settings_file(&self) -> Result<PathBuf, HostError>;

    /// Whether a file exists at the given path.
    async fn file_exists(&self, path: &Path) -> bool;

    /// Push a message to the host UI.
    fn post_message(&self, message: Value);
}

/// Filesystem-backed host provider.
///
/// Suitable for hosts without a message channel; [`HostProvider::post_message`]
/// payloads are logged at debug level and dropped.
pub struct FsHostProvider {
    name: String,
    version: String,
    settings_path: PathBuf,
}

impl FsHostProvider {
    /// Create a provider that keeps settings at the given path.
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        settings_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            settings_path: settings_path.into(),
        }
    }
}

#[async_trait]
impl HostProvider for FsHostProvider {
    fn app_name(&self) -> &str {
        &self.name
    }

    fn app_version(&self) -> &str {
        &self.version
    }

    async fn ensure_settings_file(&self) -> Result<PathBuf, HostError> {
        let unavailable = |e: std::io::Error| HostError::SettingsUnavailable {
            path: self.settings_path.display().to_string(),
            message: e.to_string(),
        };

        if let Some(parent) = self.settings_path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(unavailable)?;
        }

        match tokio::fs::try_exists(&self.settings_path).await {
            Ok(true) => {}
            Ok(false) => {
                tokio::fs::write(&self.settings_path, DEFAULT_SETTINGS_CONTENT)
                    .await
                    .map_err(unavailable)?;
                tracing::info!(
                    path = %self.settings_path.display(),
                    "Created default settings file"
                );
            }
            Err(e) => return Err(unavailable(e)),
        }

        Ok(self.settings_path.clone())
    }

    async fn file_exists(&self, path: &Path) -> bool {
        tokio::fs::try_exists(path).await.unwrap_or(false)
    }

    fn post_message(&self, message: Value) {
        tracing::debug!(%message, "Host message dropped (no UI channel)");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ensure_creates_default_settings_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings").join("mcp_settings.json");
        let provider = FsHostProvider::new("test-host", "0.0.0", &path);

        let resolved = provider.ensure_settings_file().await.unwrap();
        assert_eq!(resolved, path);

        let content = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(content, DEFAULT_SETTINGS_CONTENT);
        assert!(provider.file_exists(&path).await);
    }

    #[tokio::test]
    async fn test_ensure_keeps_existing_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mcp_settings.json");
        tokio::fs::write(&path, r#"{"mcpServers":{"a":{"command":"echo"}}}"#)
            .await
            .unwrap();

        let provider = FsHostProvider::new("test-host", "0.0.0", &path);
        provider.ensure_settings_file().await.unwrap();

        let content = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(content.contains("\"a\""));
    }

    #[tokio::test]
    async fn test_file_exists_for_missing_path() {
        let provider = FsHostProvider::new("test-host", "0.0.0", "/tmp/none.json");
        assert!(!provider.file_exists(Path::new("/nonexistent/x.json")).await);
    }
}
