//! Transports for speaking JSON-RPC to MCP servers.
//!
//! [`Transport`] is a closed union with exactly two variants: a subprocess
//! spoken to over stdin/stdout pipes, and a long-lived server-sent-event
//! stream with a POST endpoint for outbound requests. Both route responses
//! to waiting requests through a pending map keyed by request id, so
//! interleaved calls on one connection resolve correctly.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::StreamExt;
use serde_json::{Value, json};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use url::Url;

use toolmux_core::TransportConfig;

use crate::protocol::{JsonRpcRequest, JsonRpcResponse};

/// Errors that can occur while talking to an MCP server.
#[derive(Debug, Error)]
pub enum McpClientError {
    #[error("Failed to spawn MCP server process: {0}")]
    SpawnFailed(String),

    #[error("Failed to communicate with MCP server: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("MCP protocol error: {0}")]
    Protocol(String),

    #[error("Timeout waiting for MCP server response")]
    Timeout,

    #[error("MCP server returned error: code={code}, message={message}")]
    ServerError { code: i64, message: String },
}

/// In-flight requests awaiting a response, keyed by request id.
type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<JsonRpcResponse>>>>;

/// Parse a line as a JSON-RPC response and hand it to its waiting request.
///
/// Lines that are not JSON-RPC (startup chatter on stdio, keep-alives on a
/// stream) are skipped with a debug log. Responses with no id are server
/// notifications; nothing waits on those.
async fn route_response(pending: &PendingMap, line: &str) {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return;
    }
    match serde_json::from_str::<JsonRpcResponse>(trimmed) {
        Ok(response) => {
            if let Some(id) = response.id {
                if let Some(tx) = pending.lock().await.remove(&id) {
                    let _ = tx.send(response);
                } else {
                    tracing::debug!(id, "Response for unknown request id");
                }
            }
        }
        Err(e) => {
            tracing::debug!(line = trimmed, error = %e, "Skipping non-JSON-RPC output");
        }
    }
}

/// A server-sent event: name plus joined data lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SseEvent {
    pub name: String,
    pub data: String,
}

/// Incremental decoder for `text/event-stream` payloads.
///
/// Frames are separated by a blank line; `event:` sets the event name for
/// the frame, `data:` lines accumulate, comment (`:`) and `id:` lines are
/// ignored.
#[derive(Debug, Default)]
pub(crate) struct SseDecoder {
    buf: String,
}

impl SseDecoder {
    pub fn push(&mut self, chunk: &str) -> Vec<SseEvent> {
        self.buf.push_str(&chunk.replace("\r\n", "\n"));

        let mut events = Vec::new();
        while let Some(pos) = self.buf.find("\n\n") {
            let frame: String = self.buf.drain(..pos + 2).collect();
            if let Some(event) = Self::parse_frame(&frame) {
                events.push(event);
            }
        }
        events
    }

    fn parse_frame(frame: &str) -> Option<SseEvent> {
        let mut name = "message".to_string();
        let mut data_lines = Vec::new();

        for line in frame.lines() {
            if let Some(value) = line.strip_prefix("event:") {
                name = value.trim().to_string();
            } else if let Some(value) = line.strip_prefix("data:") {
                data_lines.push(value.strip_prefix(' ').unwrap_or(value));
            }
            // "id:" and comment lines are ignored
        }

        if data_lines.is_empty() {
            return None;
        }
        Some(SseEvent {
            name,
            data: data_lines.join("\n"),
        })
    }
}

/// Transport over a child process's standard streams.
pub struct StdioTransport {
    stdin: Mutex<ChildStdin>,
    child: Mutex<Option<Child>>,
    pending: PendingMap,
    next_id: AtomicU64,
    request_timeout: Duration,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl StdioTransport {
    /// Spawn the configured command and wire up its pipes.
    ///
    /// Server-provided environment values are layered over the ambient
    /// process environment the child inherits.
    pub async fn connect(
        command: &str,
        args: &[String],
        cwd: Option<&str>,
        env: &BTreeMap<String, String>,
        request_timeout: Duration,
    ) -> Result<Self, McpClientError> {
        let mut cmd = Command::new(command);
        cmd.args(args)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true);

        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }
        cmd.envs(env);

        let mut child = cmd.spawn().map_err(|e| {
            McpClientError::SpawnFailed(format!(
                "Failed to spawn '{command}': {e}\nArgs: {args:?}\nCwd: {cwd:?}"
            ))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| McpClientError::SpawnFailed("Failed to get stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| McpClientError::SpawnFailed("Failed to get stdout".to_string()))?;

        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));

        let reader_pending = pending.clone();
        let reader = tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => route_response(&reader_pending, &line).await,
                    Ok(None) => {
                        tracing::debug!("MCP server stdout closed");
                        break;
                    }
                    Err(e) => {
                        tracing::debug!(error = %e, "Error reading MCP server stdout");
                        break;
                    }
                }
            }
            // Dropping the senders fails waiting requests immediately
            // instead of letting them ride out their timeout.
            reader_pending.lock().await.clear();
        });

        Ok(Self {
            stdin: Mutex::new(stdin),
            child: Mutex::new(Some(child)),
            pending,
            next_id: AtomicU64::new(1),
            request_timeout,
            reader: Mutex::new(Some(reader)),
        })
    }

    async fn write_line(&self, payload: &str) -> Result<(), McpClientError> {
        let mut stdin = self.stdin.lock().await;
        stdin.write_all(payload.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;
        Ok(())
    }

    async fn request(&self, method: &str, params: Option<Value>) -> Result<JsonRpcResponse, McpClientError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = JsonRpcRequest::new(id, method, params);
        let payload = serde_json::to_string(&request)?;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        if let Err(e) = self.write_line(&payload).await {
            self.pending.lock().await.remove(&id);
            return Err(e);
        }

        match timeout(self.request_timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(McpClientError::Protocol(
                "Server closed connection".to_string(),
            )),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(McpClientError::Timeout)
            }
        }
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), McpClientError> {
        let notification = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params.unwrap_or_else(|| json!({})),
        });
        self.write_line(&serde_json::to_string(&notification)?).await
    }

    async fn shutdown(&self) {
        if let Some(reader) = self.reader.lock().await.take() {
            reader.abort();
        }
        if let Some(mut child) = self.child.lock().await.take() {
            let _ = child.start_kill();
            let _ = child.wait().await;
        }
    }
}

/// Transport over a long-lived server-sent-event stream.
///
/// The stream's first `endpoint` event names the URL that outbound requests
/// are POSTed to; responses arrive back as `message` events on the stream.
pub struct StreamTransport {
    http: reqwest::Client,
    post_url: Url,
    pending: PendingMap,
    next_id: AtomicU64,
    request_timeout: Duration,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl StreamTransport {
    /// Open the event stream and wait for the server's endpoint event.
    pub async fn connect(
        url: &str,
        headers: &BTreeMap<String, String>,
        request_timeout: Duration,
    ) -> Result<Self, McpClientError> {
        let base = Url::parse(url)
            .map_err(|e| McpClientError::Protocol(format!("Invalid stream URL '{url}': {e}")))?;

        // Custom headers ride on every request: the stream GET and the
        // POST back-channel both (auth headers in particular).
        let mut default_headers = reqwest::header::HeaderMap::new();
        for (key, value) in headers {
            let name = reqwest::header::HeaderName::from_bytes(key.as_bytes());
            let parsed = value.parse::<reqwest::header::HeaderValue>();
            match (name, parsed) {
                (Ok(name), Ok(value)) => {
                    default_headers.insert(name, value);
                }
                _ => {
                    tracing::warn!(header = %key, "Skipping invalid stream header");
                }
            }
        }

        let http = reqwest::Client::builder()
            .default_headers(default_headers)
            .build()?;

        let response = http
            .get(base.clone())
            .header("Accept", "text/event-stream")
            .send()
            .await?
            .error_for_status()?;
        let stream = Box::pin(response.bytes_stream());

        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let (endpoint_tx, endpoint_rx) = oneshot::channel();

        let reader_pending = pending.clone();
        let reader = tokio::spawn(read_event_stream(stream, reader_pending, endpoint_tx));

        let endpoint = match timeout(request_timeout, endpoint_rx).await {
            Ok(Ok(endpoint)) => endpoint,
            Ok(Err(_)) => {
                reader.abort();
                return Err(McpClientError::Protocol(
                    "Event stream closed before endpoint event".to_string(),
                ));
            }
            Err(_) => {
                reader.abort();
                return Err(McpClientError::Timeout);
            }
        };

        let post_url = base.join(&endpoint).map_err(|e| {
            McpClientError::Protocol(format!("Invalid endpoint '{endpoint}': {e}"))
        })?;

        Ok(Self {
            http,
            post_url,
            pending,
            next_id: AtomicU64::new(1),
            request_timeout,
            reader: Mutex::new(Some(reader)),
        })
    }

    async fn post(&self, payload: &Value) -> Result<(), McpClientError> {
        self.http
            .post(self.post_url.clone())
            .json(payload)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn request(&self, method: &str, params: Option<Value>) -> Result<JsonRpcResponse, McpClientError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = JsonRpcRequest::new(id, method, params);
        let payload = serde_json::to_value(&request)?;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        if let Err(e) = self.post(&payload).await {
            self.pending.lock().await.remove(&id);
            return Err(e);
        }

        match timeout(self.request_timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(McpClientError::Protocol(
                "Event stream closed".to_string(),
            )),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(McpClientError::Timeout)
            }
        }
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), McpClientError> {
        let notification = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params.unwrap_or_else(|| json!({})),
        });
        self.post(&notification).await
    }

    async fn shutdown(&self) {
        if let Some(reader) = self.reader.lock().await.take() {
            reader.abort();
        }
    }
}

/// Consume the SSE byte stream, surfacing the endpoint event once and
/// routing every message event through the pending map.
async fn read_event_stream<S, B>(
    mut stream: S,
    pending: PendingMap,
    endpoint_tx: oneshot::Sender<String>,
) where
    S: futures_util::Stream<Item = Result<B, reqwest::Error>> + Unpin,
    B: AsRef<[u8]>,
{
    let mut decoder = SseDecoder::default();
    let mut endpoint_tx = Some(endpoint_tx);

    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::debug!(error = %e, "Event stream read failed");
                break;
            }
        };

        for event in decoder.push(&String::from_utf8_lossy(chunk.as_ref())) {
            if event.name == "endpoint" {
                if let Some(tx) = endpoint_tx.take() {
                    let _ = tx.send(event.data);
                }
            } else {
                route_response(&pending, &event.data).await;
            }
        }
    }

    pending.lock().await.clear();
    tracing::debug!("Event stream closed");
}

/// The closed transport union.
pub enum Transport {
    /// Subprocess spoken to over stdio pipes.
    Stdio(StdioTransport),
    /// Server-sent-event stream with a POST back-channel.
    Stream(StreamTransport),
}

impl Transport {
    /// Connect the transport described by the configuration.
    pub async fn connect(
        config: &TransportConfig,
        request_timeout: Duration,
    ) -> Result<Self, McpClientError> {
        match config {
            TransportConfig::Subprocess {
                command,
                args,
                cwd,
                env,
            } => Ok(Self::Stdio(
                StdioTransport::connect(command, args, cwd.as_deref(), env, request_timeout)
                    .await?,
            )),
            TransportConfig::Stream { url, headers } => Ok(Self::Stream(
                StreamTransport::connect(url, headers, request_timeout).await?,
            )),
        }
    }

    /// Send a request and return its result payload.
    ///
    /// JSON-RPC error responses become [`McpClientError::ServerError`]; a
    /// response with neither result nor error is a protocol error.
    pub async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, McpClientError> {
        let response = match self {
            Self::Stdio(t) => t.request(method, params).await?,
            Self::Stream(t) => t.request(method, params).await?,
        };

        if let Some(error) = response.error {
            return Err(McpClientError::ServerError {
                code: error.code,
                message: error.message,
            });
        }

        response
            .result
            .ok_or_else(|| McpClientError::Protocol("Missing result in response".to_string()))
    }

    /// Send a notification (no response expected).
    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), McpClientError> {
        match self {
            Self::Stdio(t) => t.notify(method, params).await,
            Self::Stream(t) => t.notify(method, params).await,
        }
    }

    /// Tear the transport down: kill the child or drop the stream.
    pub async fn shutdown(&self) {
        match self {
            Self::Stdio(t) => t.shutdown().await,
            Self::Stream(t) => t.shutdown().await,
        }
    }

    /// Short kind label for logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Stdio(_) => "subprocess",
            Self::Stream(_) => "stream",
        }
    }
}
