//! The hub: connection registry, capability aggregation, and reconciliation.
//!
//! One [`McpHub`] owns every server connection. It diffs desired settings
//! against live connections, aggregates tools/resources/prompts across
//! connected servers behind a TTL cache, and dispatches tool calls and
//! resource reads with a no-throw result contract.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Value, json};
use tokio::sync::Mutex;

use toolmux_core::settings::{ParsedSettings, parse_settings};
use toolmux_core::{
    CallToolResult, ConnectionStatus, HostProvider, McpHubError, McpPrompt, McpPromptParameter,
    McpResource, McpServerConfig, McpServerDescriptor, McpTool, ReadResourceResult, ServerKey,
    ServerSource, SettingsError,
};

use crate::client::{McpClient, McpSession};
use crate::connection::{McpConnection, McpServerInfo};
use crate::protocol::{WirePrompt, WireResource, WireTool};
use crate::schema;
use crate::transport::McpClientError;
use crate::watcher::{SettingsWatcher, watch_server_paths};

/// How long aggregated capability lists stay valid without invalidation.
pub const CACHE_TTL: Duration = Duration::from_secs(60);

/// Session factory: how the hub turns a descriptor into a live session.
///
/// The production connector spawns real transports; tests plug in stubs.
#[async_trait]
pub trait McpConnector: Send + Sync {
    /// Connect and initialize a session for the descriptor.
    async fn connect(
        &self,
        descriptor: &McpServerDescriptor,
    ) -> Result<Arc<dyn McpSession>, McpClientError>;
}

/// Production connector building [`McpClient`] sessions.
pub struct DefaultConnector {
    client_name: String,
    client_version: String,
}

impl DefaultConnector {
    /// Create a connector identifying itself with the given client info.
    pub fn new(client_name: impl Into<String>, client_version: impl Into<String>) -> Self {
        Self {
            client_name: client_name.into(),
            client_version: client_version.into(),
        }
    }
}

#[async_trait]
impl McpConnector for DefaultConnector {
    async fn connect(
        &self,
        descriptor: &McpServerDescriptor,
    ) -> Result<Arc<dyn McpSession>, McpClientError> {
        let client = McpClient::connect(
            &descriptor.name,
            &descriptor.config,
            &self.client_name,
            &self.client_version,
        )
        .await?;
        Ok(Arc::new(client))
    }
}

/// One cached capability list with its computation instant.
struct CachedList<T> {
    items: Option<Vec<T>>,
    computed_at: Option<Instant>,
}

impl<T: Clone> CachedList<T> {
    const fn unset() -> Self {
        Self {
            items: None,
            computed_at: None,
        }
    }

    fn fresh(&self, ttl: Duration) -> Option<Vec<T>> {
        let items = self.items.as_ref()?;
        let computed_at = self.computed_at?;
        (computed_at.elapsed() < ttl).then(|| items.clone())
    }

    fn store(&mut self, items: Vec<T>) {
        self.items = Some(items);
        self.computed_at = Some(Instant::now());
    }

    fn clear(&mut self) {
        self.items = None;
        self.computed_at = None;
    }
}

struct CapabilityCache {
    tools: CachedList<McpTool>,
    resources: CachedList<McpResource>,
    prompts: CachedList<McpPrompt>,
}

impl CapabilityCache {
    const fn unset() -> Self {
        Self {
            tools: CachedList::unset(),
            resources: CachedList::unset(),
            prompts: CachedList::unset(),
        }
    }

    fn clear(&mut self) {
        self.tools.clear();
        self.resources.clear();
        self.prompts.clear();
    }
}

/// The connection registry and capability aggregator.
pub struct McpHub {
    host: Arc<dyn HostProvider>,
    connector: Arc<dyn McpConnector>,
    /// Live connections in insertion order. Order is the aggregation
    /// tie-break: on duplicate (server, id) pairs the first wins.
    connections: Mutex<Vec<McpConnection>>,
    cache: StdMutex<CapabilityCache>,
    watcher: StdMutex<Option<SettingsWatcher>>,
}

impl McpHub {
    /// Create a hub with no connections.
    pub fn new(host: Arc<dyn HostProvider>, connector: Arc<dyn McpConnector>) -> Self {
        Self {
            host,
            connector,
            connections: Mutex::new(Vec::new()),
            cache: StdMutex::new(CapabilityCache::unset()),
            watcher: StdMutex::new(None),
        }
    }

    /// Load the settings file, connect its servers, and start watching it.
    ///
    /// Unlike watcher-driven reloads, a parse failure here propagates: this
    /// runs during first construction and the caller needs to know.
    pub async fn initialize(self: &Arc<Self>) -> Result<(), McpHubError> {
        let path = self.host.ensure_settings_file().await?;

        let text = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| SettingsError::Read {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
        let parsed = parse_settings(&text)?;
        self.apply_settings(parsed).await;

        let watcher = SettingsWatcher::spawn(path.clone(), Arc::downgrade(self)).map_err(|e| {
            McpHubError::ConfigParse(format!(
                "Failed to watch settings file '{}': {e}",
                path.display()
            ))
        })?;
        *lock(&self.watcher) = Some(watcher);

        tracing::info!(path = %path.display(), "MCP hub initialized");
        Ok(())
    }

    /// Re-read the settings file and reconcile: read, parse, apply.
    ///
    /// This is the watcher's entry point, also callable by hosts that want
    /// to force a reload. Never propagates; failures are logged and
    /// surfaced to the host UI.
    pub async fn reload_settings(&self, path: &Path) {
        let text = match tokio::fs::read_to_string(path).await {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "Failed to read settings file");
                return;
            }
        };

        match parse_settings(&text) {
            Ok(parsed) => self.apply_settings(parsed).await,
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "Failed to parse settings file");
                self.host.post_message(json!({
                    "type": "mcpSettingsError",
                    "message": e.to_string(),
                }));
            }
        }
    }

    /// Validate, log field errors, and reconcile best-effort.
    async fn apply_settings(&self, parsed: ParsedSettings) {
        let errors = parsed.validate();
        if !errors.is_empty() {
            for error in &errors {
                tracing::warn!(field = %error.path, message = %error.message, "Invalid settings field");
            }
            self.host.post_message(json!({
                "type": "mcpSettingsError",
                "errors": errors,
            }));
            // Known limitation, kept deliberately: reconciliation proceeds
            // with whatever deserialized, malformed values included.
        }

        self.update_server_connections(parsed.server_configs(), ServerSource::Global)
            .await;
    }

    /// Reconcile desired configs for one source against live connections.
    ///
    /// Servers absent from `desired` are deleted; entries with structurally
    /// equal configs are left untouched; everything else is (re)connected.
    /// One server's failure never aborts the others.
    pub async fn update_server_connections(
        &self,
        desired: BTreeMap<String, McpServerConfig>,
        source: ServerSource,
    ) {
        let mut connections = self.connections.lock().await;

        let stale: Vec<String> = connections
            .iter()
            .filter(|c| c.descriptor.source == source && !desired.contains_key(&c.descriptor.name))
            .map(|c| c.descriptor.name.clone())
            .collect();
        for name in stale {
            let key = ServerKey::new(name, source);
            if Self::remove_connection(&mut connections, &key).await {
                self.invalidate_cache();
                tracing::info!(server_name = %key.name, source = %key.source, "Deleted MCP server");
            }
        }

        for (name, config) in desired {
            let key = ServerKey::new(name.clone(), source);
            if let Some(existing) = connections.iter().find(|c| c.key() == key) {
                if existing.descriptor.config == config {
                    // Unchanged entry: no reconnect.
                    continue;
                }
            }
            self.connect_server(
                &mut connections,
                McpServerDescriptor::new(name, source, config),
            )
            .await;
        }

        let snapshot = Self::snapshot(&connections);
        drop(connections);
        self.notify_ui(snapshot);
    }

    /// Connect (or reconnect) one server, replacing any existing connection
    /// for its key. A failed connect records an errored placeholder so the
    /// server stays visible in listings.
    async fn connect_server(
        &self,
        connections: &mut Vec<McpConnection>,
        descriptor: McpServerDescriptor,
    ) {
        let key = descriptor.key();
        if Self::remove_connection(connections, &key).await {
            self.invalidate_cache();
        }

        if descriptor.config.disabled {
            tracing::info!(server_name = %descriptor.name, "MCP server disabled; not connecting");
            connections.push(McpConnection::placeholder(
                descriptor,
                ConnectionStatus::Disconnected,
            ));
            self.invalidate_cache();
            return;
        }

        let mut connection =
            McpConnection::placeholder(descriptor, ConnectionStatus::Connecting);

        match self.connector.connect(&connection.descriptor).await {
            Ok(session) => {
                connection.status = ConnectionStatus::Connected;
                connection.connected_at = Some(Utc::now());

                // Discover tools up front so call_tool can resolve
                // definitions without a round trip.
                match session.list_tools().await {
                    Ok(wire) => connection.tools = map_tools(&connection.descriptor, wire),
                    Err(e) => {
                        tracing::warn!(
                            server_name = %connection.descriptor.name,
                            error = %e,
                            "Failed to list tools after connect"
                        );
                        connection.errors.push(format!("Failed to list tools: {e}"));
                    }
                }

                connection.path_watchers = watch_server_paths(
                    &connection.descriptor.name,
                    &connection.descriptor.config.watch_paths,
                );

                tracing::info!(
                    server_name = %connection.descriptor.name,
                    transport = connection.descriptor.config.transport.kind(),
                    tool_count = connection.tools.len(),
                    "MCP server connected"
                );
                connection.session = Some(session);
            }
            Err(e) => {
                tracing::warn!(
                    server_name = %connection.descriptor.name,
                    error = %e,
                    "Failed to connect MCP server"
                );
                connection.record_error(e.to_string());
            }
        }

        connections.push(connection);
        self.invalidate_cache();
    }

    /// Remove a connection and shut its session down. Returns whether one
    /// existed.
    async fn remove_connection(connections: &mut Vec<McpConnection>, key: &ServerKey) -> bool {
        if let Some(position) = connections.iter().position(|c| &c.key() == key) {
            let connection = connections.remove(position);
            if let Some(session) = connection.session {
                session.shutdown().await;
            }
            true
        } else {
            false
        }
    }

    /// Drop every cached capability list.
    ///
    /// Called synchronously on every connection mutation so the next query
    /// recomputes from live connections.
    pub fn invalidate_cache(&self) {
        lock(&self.cache).clear();
    }

    // =========================================================================
    // Capability aggregation
    // =========================================================================

    /// Aggregated tools across enabled, connected servers.
    pub async fn tools(&self) -> Vec<McpTool> {
        if let Some(cached) = lock(&self.cache).tools.fresh(CACHE_TTL) {
            return cached;
        }

        let mut merged = Vec::new();
        let mut seen: HashSet<(String, String)> = HashSet::new();

        for (descriptor, session) in self.aggregation_targets().await {
            match session.list_tools().await {
                Ok(wire) => {
                    let tools = map_tools(&descriptor, wire);
                    self.store_connection_tools(&descriptor.key(), &tools).await;
                    for tool in tools {
                        if seen.insert((tool.server_name.clone(), tool.id.clone())) {
                            merged.push(tool);
                        }
                    }
                }
                Err(e) => self.record_discovery_failure(&descriptor, "tools", &e).await,
            }
        }

        lock(&self.cache).tools.store(merged.clone());
        merged
    }

    /// Aggregated resources across enabled, connected servers.
    pub async fn resources(&self) -> Vec<McpResource> {
        if let Some(cached) = lock(&self.cache).resources.fresh(CACHE_TTL) {
            return cached;
        }

        let mut merged = Vec::new();
        let mut seen: HashSet<(String, String)> = HashSet::new();

        for (descriptor, session) in self.aggregation_targets().await {
            match session.list_resources().await {
                Ok(wire) => {
                    for resource in map_resources(&descriptor, wire) {
                        if seen.insert((resource.server_name.clone(), resource.uri.clone())) {
                            merged.push(resource);
                        }
                    }
                }
                Err(e) => {
                    self.record_discovery_failure(&descriptor, "resources", &e)
                        .await;
                }
            }
        }

        lock(&self.cache).resources.store(merged.clone());
        merged
    }

    /// Aggregated prompts across enabled, connected servers.
    pub async fn prompts(&self) -> Vec<McpPrompt> {
        if let Some(cached) = lock(&self.cache).prompts.fresh(CACHE_TTL) {
            return cached;
        }

        let mut merged = Vec::new();
        let mut seen: HashSet<(String, String)> = HashSet::new();

        for (descriptor, session) in self.aggregation_targets().await {
            match session.list_prompts().await {
                Ok(wire) => {
                    for prompt in map_prompts(&descriptor, wire) {
                        if seen.insert((prompt.server_name.clone(), prompt.id.clone())) {
                            merged.push(prompt);
                        }
                    }
                }
                Err(e) => {
                    self.record_discovery_failure(&descriptor, "prompts", &e)
                        .await;
                }
            }
        }

        lock(&self.cache).prompts.store(merged.clone());
        merged
    }

    /// Query one server's tools directly, bypassing the aggregate cache.
    pub async fn server_tools(&self, server_name: &str) -> Result<Vec<McpTool>, McpHubError> {
        let (descriptor, session) = self.session_for(server_name).await?;
        let wire = session.list_tools().await.map_err(hub_error)?;
        let tools = map_tools(&descriptor, wire);
        self.store_connection_tools(&descriptor.key(), &tools).await;
        Ok(tools)
    }

    /// Query one server's resources directly.
    pub async fn server_resources(
        &self,
        server_name: &str,
    ) -> Result<Vec<McpResource>, McpHubError> {
        let (descriptor, session) = self.session_for(server_name).await?;
        let wire = session.list_resources().await.map_err(hub_error)?;
        Ok(map_resources(&descriptor, wire))
    }

    /// Query one server's prompts directly.
    pub async fn server_prompts(&self, server_name: &str) -> Result<Vec<McpPrompt>, McpHubError> {
        let (descriptor, session) = self.session_for(server_name).await?;
        let wire = session.list_prompts().await.map_err(hub_error)?;
        Ok(map_prompts(&descriptor, wire))
    }

    async fn aggregation_targets(&self) -> Vec<(McpServerDescriptor, Arc<dyn McpSession>)> {
        self.connections
            .lock()
            .await
            .iter()
            .filter(|c| c.is_aggregatable())
            .filter_map(|c| {
                c.session
                    .as_ref()
                    .map(|session| (c.descriptor.clone(), Arc::clone(session)))
            })
            .collect()
    }

    async fn session_for(
        &self,
        server_name: &str,
    ) -> Result<(McpServerDescriptor, Arc<dyn McpSession>), McpHubError> {
        let connections = self.connections.lock().await;
        let connection = connections
            .iter()
            .find(|c| c.descriptor.name == server_name)
            .ok_or_else(|| McpHubError::NotFound(format!("Server {server_name} not found")))?;
        let session = connection
            .session
            .as_ref()
            .ok_or_else(|| McpHubError::Connection(format!("Server {server_name} not connected")))?;
        Ok((connection.descriptor.clone(), Arc::clone(session)))
    }

    async fn store_connection_tools(&self, key: &ServerKey, tools: &[McpTool]) {
        let mut connections = self.connections.lock().await;
        if let Some(connection) = connections.iter_mut().find(|c| &c.key() == key) {
            connection.tools = tools.to_vec();
        }
    }

    async fn record_discovery_failure(
        &self,
        descriptor: &McpServerDescriptor,
        what: &str,
        error: &McpClientError,
    ) {
        tracing::warn!(
            server_name = %descriptor.name,
            error = %error,
            "Failed to list {what}"
        );
        let mut connections = self.connections.lock().await;
        if let Some(connection) = connections
            .iter_mut()
            .find(|c| c.key() == descriptor.key())
        {
            connection.errors.push(format!("Failed to list {what}: {error}"));
        }
    }

    // =========================================================================
    // Invocation
    // =========================================================================

    /// Invoke a tool. Never panics or returns `Err`: every failure mode is
    /// folded into the result's error string.
    pub async fn call_tool(&self, server_name: &str, tool_id: &str, args: Value) -> CallToolResult {
        let (session, tool) = {
            let connections = self.connections.lock().await;
            let Some(connection) = connections.iter().find(|c| c.descriptor.name == server_name)
            else {
                return CallToolResult::error(format!("Server {server_name} not found"));
            };
            let Some(session) = connection.session.as_ref().map(Arc::clone) else {
                return CallToolResult::error(format!("Server {server_name} not connected"));
            };
            let Some(tool) = connection.tools.iter().find(|t| t.id == tool_id).cloned() else {
                return CallToolResult::error(format!(
                    "Tool {tool_id} not found on server {server_name}"
                ));
            };
            (session, tool)
        };

        let issues = schema::validate_args(&tool.input_schema, &args);
        if !issues.is_empty() {
            let detail: Vec<String> = issues.iter().map(ToString::to_string).collect();
            return CallToolResult::error(format!("Invalid arguments: {}", detail.join(", ")));
        }

        match session.call_tool(tool_id, args).await {
            Ok(wire) if wire.is_error => {
                CallToolResult::error(wire.first_text().unwrap_or("Unknown error"))
            }
            Ok(wire) => CallToolResult::ok(json!({ "content": wire.content })),
            Err(e) => CallToolResult::error(e.to_string()),
        }
    }

    /// Read a resource. Same no-throw contract as [`Self::call_tool`].
    pub async fn read_resource(&self, server_name: &str, uri: &str) -> ReadResourceResult {
        let session = {
            let connections = self.connections.lock().await;
            let Some(connection) = connections.iter().find(|c| c.descriptor.name == server_name)
            else {
                return ReadResourceResult::error(format!("Server {server_name} not found"));
            };
            match connection.session.as_ref().map(Arc::clone) {
                Some(session) => session,
                None => {
                    return ReadResourceResult::error(format!(
                        "Server {server_name} not connected"
                    ));
                }
            }
        };

        match session.read_resource(uri).await {
            Ok(wire) => wire.contents.into_iter().next().map_or_else(
                || ReadResourceResult::error(format!("Resource {uri} returned no content")),
                |content| {
                    let text = content.text.or(content.blob).unwrap_or_default();
                    ReadResourceResult::ok(text, content.mime_type)
                },
            ),
            Err(e) => ReadResourceResult::error(e.to_string()),
        }
    }

    // =========================================================================
    // Listings and teardown
    // =========================================================================

    /// Enabled servers with their connection state.
    pub async fn servers(&self) -> Vec<McpServerInfo> {
        self.connections
            .lock()
            .await
            .iter()
            .filter(|c| !c.descriptor.config.disabled)
            .map(McpConnection::info)
            .collect()
    }

    /// Every configured server, disabled entries included.
    pub async fn all_servers(&self) -> Vec<McpServerInfo> {
        Self::snapshot(&self.connections.lock().await)
    }

    /// Close every connection and stop the settings watcher.
    pub async fn dispose(&self) {
        if let Some(watcher) = lock(&self.watcher).take() {
            watcher.close();
        }

        let mut connections = self.connections.lock().await;
        for connection in connections.drain(..) {
            if let Some(session) = connection.session {
                session.shutdown().await;
            }
        }
        drop(connections);

        self.invalidate_cache();
        tracing::info!("MCP hub disposed");
    }

    fn snapshot(connections: &[McpConnection]) -> Vec<McpServerInfo> {
        connections.iter().map(McpConnection::info).collect()
    }

    fn notify_ui(&self, servers: Vec<McpServerInfo>) {
        self.host.post_message(json!({
            "type": "mcpServers",
            "servers": servers,
        }));
    }
}

fn lock<T>(mutex: &StdMutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Fold a client failure into the hub taxonomy.
fn hub_error(e: McpClientError) -> McpHubError {
    match e {
        McpClientError::Timeout => McpHubError::Timeout(e.to_string()),
        McpClientError::ServerError { .. } => McpHubError::ToolExecution(e.to_string()),
        _ => McpHubError::Connection(e.to_string()),
    }
}

fn map_tools(descriptor: &McpServerDescriptor, wire: Vec<WireTool>) -> Vec<McpTool> {
    wire.into_iter()
        .map(|tool| McpTool {
            always_allow: descriptor.config.always_allow.contains(&tool.name),
            id: tool.name.clone(),
            name: tool.title.unwrap_or_else(|| tool.name.clone()),
            description: tool.description.unwrap_or_default(),
            input_schema: tool.input_schema,
            output_schema: tool.output_schema,
            server_name: descriptor.name.clone(),
        })
        .collect()
}

fn map_resources(descriptor: &McpServerDescriptor, wire: Vec<WireResource>) -> Vec<McpResource> {
    wire.into_iter()
        .map(|resource| McpResource {
            uri: resource.uri,
            name: resource.name.unwrap_or_default(),
            description: resource.description.unwrap_or_default(),
            server_name: descriptor.name.clone(),
        })
        .collect()
}

fn map_prompts(descriptor: &McpServerDescriptor, wire: Vec<WirePrompt>) -> Vec<McpPrompt> {
    wire.into_iter()
        .map(|prompt| McpPrompt {
            id: prompt.name.clone(),
            name: prompt.title.unwrap_or_else(|| prompt.name.clone()),
            description: prompt.description.unwrap_or_default(),
            template: prompt.template.unwrap_or_default(),
            parameters: prompt
                .arguments
                .into_iter()
                .map(|argument| McpPromptParameter {
                    name: argument.name,
                    description: argument.description.unwrap_or_default(),
                    required: argument.required.unwrap_or(false),
                })
                .collect(),
            server_name: descriptor.name.clone(),
        })
        .collect()
}
