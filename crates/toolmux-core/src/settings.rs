//! Settings-file model and schema validation.
//!
//! The settings file is JSON of the shape `{ "mcpServers": { <name>: entry } }`
//! where each entry is either a subprocess shape (`command`, `args`, `cwd`,
//! `env`) or a stream shape (`url`, `headers`), plus shared fields
//! (`disabled`, `timeout`, `alwaysAllow`, `watchPaths`). Mixing the two
//! shapes in one entry is a schema error.
//!
//! Validation reports every failing field rather than stopping at the first,
//! and conversion to runtime configs is deliberately lenient: a validated-
//! but-suspect entry (say, an out-of-range timeout) still produces a config
//! so the watcher can reconcile best-effort after logging the errors.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::domain::{
    DEFAULT_TIMEOUT_SECS, MAX_TIMEOUT_SECS, McpServerConfig, MIN_TIMEOUT_SECS, TransportConfig,
};

/// Content written when the settings file does not exist yet.
pub const DEFAULT_SETTINGS_CONTENT: &str = "{\n  \"mcpServers\": {}\n}\n";

/// Errors raised while reading or parsing the settings file.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The file could not be read.
    #[error("Failed to read settings '{path}': {message}")]
    Read {
        /// Settings file path.
        path: String,
        /// Underlying I/O error message.
        message: String,
    },

    /// The file is not valid JSON.
    #[error("Failed to parse settings: {0}")]
    Parse(String),

    /// The root is not an object or `mcpServers` is not an object.
    #[error("Settings root must be a JSON object with an \"mcpServers\" object")]
    InvalidRoot,
}

/// A single schema-validation failure, addressed by field path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// Dotted path of the failing field (e.g. `mcpServers.files.timeout`).
    pub path: String,
    /// What is wrong with it.
    pub message: String,
}

impl FieldError {
    /// Create a field error.
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Raw wire shape of one server entry, before shape checks.
///
/// Every field is optional so a single struct covers both transport shapes;
/// [`validate_entry`] enforces that exactly one shape is present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawServerConfig {
    /// Subprocess shape: executable to launch.
    pub command: Option<String>,
    /// Subprocess shape: arguments.
    pub args: Option<Vec<String>>,
    /// Subprocess shape: working directory.
    pub cwd: Option<String>,
    /// Subprocess shape: environment values.
    pub env: Option<BTreeMap<String, String>>,
    /// Stream shape: event-stream endpoint URL.
    pub url: Option<String>,
    /// Stream shape: custom request headers.
    pub headers: Option<BTreeMap<String, String>>,
    /// Shared: listed but never connected when true.
    pub disabled: Option<bool>,
    /// Shared: per-request timeout in seconds (1-3600).
    pub timeout: Option<u64>,
    /// Shared: tool ids invocable without confirmation.
    pub always_allow: Option<Vec<String>>,
    /// Shared: paths whose changes are surfaced as notices.
    pub watch_paths: Option<Vec<String>>,
}

/// Parsed settings file: readable entries plus a record of unreadable ones.
#[derive(Debug, Clone, Default)]
pub struct ParsedSettings {
    /// Entries whose shape could be read, keyed by server name.
    ///
    /// A `BTreeMap` keeps iteration deterministic; reconciliation order
    /// follows it.
    pub servers: BTreeMap<String, RawServerConfig>,

    /// Entries dropped because their JSON shape could not be read at all
    /// (wrong field types, entry not an object).
    pub unreadable: Vec<FieldError>,
}

impl ParsedSettings {
    /// Validate every readable entry, returning all failing fields.
    ///
    /// Unreadable entries are included so callers can log one combined
    /// report.
    #[must_use]
    pub fn validate(&self) -> Vec<FieldError> {
        let mut errors: Vec<FieldError> = self.unreadable.clone();
        for (name, raw) in &self.servers {
            errors.extend(validate_entry(name, raw));
        }
        errors
    }

    /// Convert readable entries into runtime configs, best-effort.
    ///
    /// Entries with neither `command` nor `url` cannot be connected and are
    /// skipped; everything else converts, keeping suspect values as written.
    #[must_use]
    pub fn server_configs(&self) -> BTreeMap<String, McpServerConfig> {
        self.servers
            .iter()
            .filter_map(|(name, raw)| raw.to_config().map(|config| (name.clone(), config)))
            .collect()
    }
}

impl RawServerConfig {
    /// Lenient conversion to a runtime config.
    ///
    /// When both shapes are present the subprocess shape wins; when neither
    /// is, there is nothing to connect and `None` is returned.
    #[must_use]
    pub fn to_config(&self) -> Option<McpServerConfig> {
        let transport = if let Some(command) = &self.command {
            TransportConfig::Subprocess {
                command: command.clone(),
                args: self.args.clone().unwrap_or_default(),
                cwd: self.cwd.clone(),
                env: self.env.clone().unwrap_or_default(),
            }
        } else if let Some(url) = &self.url {
            TransportConfig::Stream {
                url: url.clone(),
                headers: self.headers.clone().unwrap_or_default(),
            }
        } else {
            return None;
        };

        Some(McpServerConfig {
            transport,
            disabled: self.disabled.unwrap_or(false),
            timeout_secs: self.timeout.unwrap_or(DEFAULT_TIMEOUT_SECS),
            always_allow: self.always_allow.clone().unwrap_or_default(),
            watch_paths: self.watch_paths.clone().unwrap_or_default(),
        })
    }
}

/// Parse settings text into readable entries.
///
/// Invalid JSON and a malformed root are hard errors; a malformed
/// individual entry is recorded in [`ParsedSettings::unreadable`] and the
/// rest of the file still parses.
pub fn parse_settings(text: &str) -> Result<ParsedSettings, SettingsError> {
    let root: Value = serde_json::from_str(text).map_err(|e| SettingsError::Parse(e.to_string()))?;

    let Value::Object(root_map) = root else {
        return Err(SettingsError::InvalidRoot);
    };

    let servers_value = match root_map.get("mcpServers") {
        None => return Ok(ParsedSettings::default()),
        Some(Value::Object(map)) => map.clone(),
        Some(_) => return Err(SettingsError::InvalidRoot),
    };

    let mut parsed = ParsedSettings::default();
    for (name, entry) in servers_value {
        match serde_json::from_value::<RawServerConfig>(entry) {
            Ok(raw) => {
                parsed.servers.insert(name, raw);
            }
            Err(e) => {
                parsed
                    .unreadable
                    .push(FieldError::new(format!("mcpServers.{name}"), e.to_string()));
            }
        }
    }

    Ok(parsed)
}

/// Validate one entry's shape and field constraints.
#[must_use]
pub fn validate_entry(name: &str, raw: &RawServerConfig) -> Vec<FieldError> {
    let base = format!("mcpServers.{name}");
    let mut errors = Vec::new();

    match (&raw.command, &raw.url) {
        (Some(_), Some(_)) => {
            errors.push(FieldError::new(
                &base,
                "entry mixes subprocess fields (command) with stream fields (url)",
            ));
        }
        (None, None) => {
            errors.push(FieldError::new(
                &base,
                "entry requires either a command (subprocess) or a url (stream)",
            ));
        }
        _ => {}
    }

    if let Some(command) = &raw.command {
        if command.trim().is_empty() {
            errors.push(FieldError::new(
                format!("{base}.command"),
                "must not be empty",
            ));
        }
        if raw.headers.is_some() {
            errors.push(FieldError::new(
                format!("{base}.headers"),
                "not allowed for subprocess entries",
            ));
        }
    }

    if let Some(url) = &raw.url {
        if let Err(e) = url::Url::parse(url) {
            errors.push(FieldError::new(
                format!("{base}.url"),
                format!("not a valid URL: {e}"),
            ));
        }
        for (field, present) in [
            ("args", raw.args.is_some()),
            ("cwd", raw.cwd.is_some()),
            ("env", raw.env.is_some()),
        ] {
            if present {
                errors.push(FieldError::new(
                    format!("{base}.{field}"),
                    "not allowed for stream entries",
                ));
            }
        }
    }

    if let Some(timeout) = raw.timeout {
        if !(MIN_TIMEOUT_SECS..=MAX_TIMEOUT_SECS).contains(&timeout) {
            errors.push(FieldError::new(
                format!("{base}.timeout"),
                format!("must be between {MIN_TIMEOUT_SECS} and {MAX_TIMEOUT_SECS} seconds"),
            ));
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_default_content() {
        let parsed = parse_settings(DEFAULT_SETTINGS_CONTENT).unwrap();
        assert!(parsed.servers.is_empty());
        assert!(parsed.unreadable.is_empty());
        assert!(parsed.validate().is_empty());
    }

    #[test]
    fn test_parse_subprocess_entry() {
        let parsed = parse_settings(
            r#"{"mcpServers":{"files":{"command":"npx","args":["-y","server-files"],"timeout":30}}}"#,
        )
        .unwrap();
        let raw = parsed.servers.get("files").unwrap();
        assert_eq!(raw.command.as_deref(), Some("npx"));
        assert_eq!(raw.timeout, Some(30));
        assert!(parsed.validate().is_empty());

        let configs = parsed.server_configs();
        let config = configs.get("files").unwrap();
        assert_eq!(config.timeout_secs, 30);
        assert_eq!(config.transport.kind(), "subprocess");
    }

    #[test]
    fn test_parse_stream_entry_with_headers() {
        let parsed = parse_settings(
            r#"{"mcpServers":{"remote":{"url":"http://localhost:3001/sse","headers":{"Authorization":"Bearer x"},"alwaysAllow":["ping"]}}}"#,
        )
        .unwrap();
        assert!(parsed.validate().is_empty());
        let config = parsed.server_configs().remove("remote").unwrap();
        assert_eq!(config.transport.kind(), "stream");
        assert_eq!(config.always_allow, vec!["ping".to_string()]);
    }

    #[test]
    fn test_mixed_entry_rejected() {
        let parsed = parse_settings(
            r#"{"mcpServers":{"bad":{"command":"npx","url":"http://localhost/sse"}}}"#,
        )
        .unwrap();
        let errors = parsed.validate();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].path, "mcpServers.bad");
        assert!(errors[0].message.contains("mixes"));
    }

    #[test]
    fn test_entry_with_neither_shape_rejected() {
        let parsed = parse_settings(r#"{"mcpServers":{"empty":{"disabled":true}}}"#).unwrap();
        let errors = parsed.validate();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("requires either"));
        // Nothing to connect: lenient conversion drops the entry.
        assert!(parsed.server_configs().is_empty());
    }

    #[test]
    fn test_stream_entry_with_subprocess_fields_rejected() {
        let parsed = parse_settings(
            r#"{"mcpServers":{"s":{"url":"http://localhost/sse","args":["x"],"env":{"A":"1"}}}}"#,
        )
        .unwrap();
        let errors = parsed.validate();
        let paths: Vec<&str> = errors.iter().map(|e| e.path.as_str()).collect();
        assert!(paths.contains(&"mcpServers.s.args"));
        assert!(paths.contains(&"mcpServers.s.env"));
    }

    #[test]
    fn test_timeout_range_enforced() {
        for bad in [0_u64, 3601] {
            let raw = RawServerConfig {
                command: Some("echo".to_string()),
                timeout: Some(bad),
                ..RawServerConfig::default()
            };
            let errors = validate_entry("t", &raw);
            assert_eq!(errors.len(), 1, "timeout {bad} should fail");
            assert_eq!(errors[0].path, "mcpServers.t.timeout");
        }
    }

    #[test]
    fn test_invalid_url_reported() {
        let raw = RawServerConfig {
            url: Some("not a url".to_string()),
            ..RawServerConfig::default()
        };
        let errors = validate_entry("r", &raw);
        assert_eq!(errors[0].path, "mcpServers.r.url");
    }

    #[test]
    fn test_out_of_range_timeout_still_converts() {
        // Best-effort reconciliation keeps the value as written.
        let raw = RawServerConfig {
            command: Some("echo".to_string()),
            timeout: Some(9999),
            ..RawServerConfig::default()
        };
        let config = raw.to_config().unwrap();
        assert_eq!(config.timeout_secs, 9999);
    }

    #[test]
    fn test_unreadable_entry_skipped_but_recorded() {
        let parsed = parse_settings(
            r#"{"mcpServers":{"good":{"command":"echo"},"bad":{"command":42}}}"#,
        )
        .unwrap();
        assert_eq!(parsed.servers.len(), 1);
        assert_eq!(parsed.unreadable.len(), 1);
        assert_eq!(parsed.unreadable[0].path, "mcpServers.bad");
        assert_eq!(parsed.server_configs().len(), 1);
    }

    #[test]
    fn test_missing_mcp_servers_key_is_empty() {
        let parsed = parse_settings("{}").unwrap();
        assert!(parsed.servers.is_empty());
    }

    #[test]
    fn test_invalid_json_is_parse_error() {
        let result = parse_settings("{not json");
        assert!(matches!(result, Err(SettingsError::Parse(_))));
    }

    #[test]
    fn test_non_object_root_rejected() {
        assert!(matches!(
            parse_settings("[1,2]"),
            Err(SettingsError::InvalidRoot)
        ));
        assert!(matches!(
            parse_settings(r#"{"mcpServers": 3}"#),
            Err(SettingsError::InvalidRoot)
        ));
    }
}
