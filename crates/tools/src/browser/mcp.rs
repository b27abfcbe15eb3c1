//! Browser automation host spoken to over MCP (JSON-RPC 2.0, newline
//! delimited, on the child process's stdio).
//!
//! Requests are strictly sequential: the session holds its stdio behind one
//! lock for the full write-then-read exchange, and skips any line that is not
//! the response to the request in flight (server notifications, log noise).

use async_trait::async_trait;
use escapist_config::BrowserConfig;
use escapist_core::error::ToolError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{BrowserCallResult, BrowserLauncher, BrowserSession, BrowserToolSpec};

const PROTOCOL_VERSION: &str = "2024-11-05";

#[derive(Debug, Serialize)]
struct McpRequest<'a> {
    jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<u64>,
    method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct McpResponse {
    #[serde(default)]
    id: Option<serde_json::Value>,
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<McpRpcError>,
}

#[derive(Debug, Deserialize)]
struct McpRpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct ToolsListResult {
    #[serde(default)]
    tools: Vec<BrowserToolSpec>,
    #[serde(default, rename = "nextCursor")]
    next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ToolCallResult {
    #[serde(default)]
    content: Vec<McpContent>,
    #[serde(default, rename = "isError")]
    is_error: bool,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum McpContent {
    Text {
        text: String,
    },
    Image {
        #[serde(default, rename = "mimeType")]
        mime_type: String,
    },
    Resource {
        resource: serde_json::Value,
    },
    #[serde(other)]
    Unknown,
}

impl McpContent {
    fn render(&self) -> String {
        match self {
            McpContent::Text { text } => text.clone(),
            McpContent::Image { mime_type } => format!("[image {mime_type}]"),
            McpContent::Resource { resource } => resource
                .get("text")
                .and_then(|t| t.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| resource.to_string()),
            McpContent::Unknown => "[unsupported content]".into(),
        }
    }
}

fn transport(reason: impl Into<String>) -> ToolError {
    ToolError::Upstream {
        service: "browser".into(),
        reason: reason.into(),
    }
}

struct McpIo {
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
}

/// A live MCP connection to a spawned host process.
pub struct McpSession {
    io: Mutex<Option<McpIo>>,
    child: Mutex<Option<Child>>,
    next_id: AtomicU64,
    timeout: Duration,
}

impl McpSession {
    /// Spawn `command args..` and complete the MCP handshake.
    pub async fn spawn(command: &str, args: &[String], timeout: Duration) -> Result<Self, ToolError> {
        info!(command, ?args, "Starting browser host");

        let mut child = Command::new(command)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| transport(format!("failed to start '{command}': {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| transport("host stdin unavailable"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| transport("host stdout unavailable"))?;

        let session = Self {
            io: Mutex::new(Some(McpIo {
                stdin,
                stdout: BufReader::new(stdout).lines(),
            })),
            child: Mutex::new(Some(child)),
            next_id: AtomicU64::new(1),
            timeout,
        };

        if let Err(e) = session.initialize().await {
            session.shutdown().await;
            return Err(e);
        }
        Ok(session)
    }

    async fn initialize(&self) -> Result<(), ToolError> {
        let result = self
            .request(
                "initialize",
                Some(serde_json::json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {},
                    "clientInfo": {
                        "name": "escapist",
                        "version": env!("CARGO_PKG_VERSION"),
                    }
                })),
            )
            .await?;
        debug!(server = %result["serverInfo"], "Browser host initialized");
        self.notify("notifications/initialized").await
    }

    async fn write_line(io: &mut McpIo, request: &McpRequest<'_>) -> Result<(), ToolError> {
        let mut line = serde_json::to_string(request)
            .map_err(|e| transport(format!("failed to encode request: {e}")))?;
        line.push('\n');
        io.stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| transport(format!("failed to write to host: {e}")))?;
        io.stdin
            .flush()
            .await
            .map_err(|e| transport(format!("failed to flush host stdin: {e}")))
    }

    async fn notify(&self, method: &str) -> Result<(), ToolError> {
        let mut guard = self.io.lock().await;
        let io = guard.as_mut().ok_or_else(|| transport("session closed"))?;
        Self::write_line(
            io,
            &McpRequest {
                jsonrpc: "2.0",
                id: None,
                method,
                params: None,
            },
        )
        .await
    }

    async fn request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, ToolError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut guard = self.io.lock().await;
        let io = guard.as_mut().ok_or_else(|| transport("session closed"))?;

        Self::write_line(
            io,
            &McpRequest {
                jsonrpc: "2.0",
                id: Some(id),
                method,
                params,
            },
        )
        .await?;

        let expected = serde_json::Value::from(id);
        let read = async {
            loop {
                let line = io
                    .stdout
                    .next_line()
                    .await
                    .map_err(|e| transport(format!("failed to read from host: {e}")))?
                    .ok_or_else(|| transport("host closed its output"))?;
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<McpResponse>(&line) {
                    Ok(resp) if resp.id.as_ref() == Some(&expected) => return Ok::<_, ToolError>(resp),
                    Ok(_) => debug!(method, "Skipping unrelated host message"),
                    Err(_) => debug!(method, line = %line, "Skipping non-JSON host output"),
                }
            }
        };

        let response = tokio::time::timeout(self.timeout, read)
            .await
            .map_err(|_| ToolError::Timeout {
                tool_name: method.to_string(),
                timeout_secs: self.timeout.as_secs(),
            })??;

        if let Some(err) = response.error {
            return Err(transport(format!("{method} failed ({}): {}", err.code, err.message)));
        }
        Ok(response.result.unwrap_or(serde_json::Value::Null))
    }
}

fn parse_call_result(result: serde_json::Value) -> Result<BrowserCallResult, ToolError> {
    let parsed: ToolCallResult = serde_json::from_value(result)
        .map_err(|e| transport(format!("malformed tools/call result: {e}")))?;
    Ok(BrowserCallResult {
        text: parsed
            .content
            .iter()
            .map(McpContent::render)
            .collect::<Vec<_>>()
            .join("\n"),
        is_error: parsed.is_error,
    })
}

/// Upper bound on `tools/list` pages fetched for one listing.
const MAX_TOOL_PAGES: usize = 32;

/// Follow `nextCursor` through `tools/list` pages. Stops at the last page,
/// on a cursor the host already returned, or after [`MAX_TOOL_PAGES`].
async fn collect_tool_pages<F, Fut>(mut fetch: F) -> Result<Vec<BrowserToolSpec>, ToolError>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<serde_json::Value, ToolError>>,
{
    let mut tools = Vec::new();
    let mut seen = HashSet::new();
    let mut cursor: Option<String> = None;

    for _ in 0..MAX_TOOL_PAGES {
        let page: ToolsListResult = serde_json::from_value(fetch(cursor.take()).await?)
            .map_err(|e| transport(format!("malformed tools/list result: {e}")))?;
        tools.extend(page.tools);

        match page.next_cursor {
            Some(next) if !next.is_empty() => {
                if !seen.insert(next.clone()) {
                    warn!(cursor = %next, "Browser host repeated a tools/list cursor, stopping");
                    return Ok(tools);
                }
                cursor = Some(next);
            }
            _ => return Ok(tools),
        }
    }

    warn!(pages = MAX_TOOL_PAGES, "Browser host tool listing did not end, stopping");
    Ok(tools)
}

#[async_trait]
impl BrowserSession for McpSession {
    async fn list_tools(&self) -> Result<Vec<BrowserToolSpec>, ToolError> {
        collect_tool_pages(|cursor| async move {
            let params = cursor.map(|c| serde_json::json!({ "cursor": c }));
            self.request("tools/list", params).await
        })
        .await
    }

    async fn call(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<BrowserCallResult, ToolError> {
        let result = self
            .request(
                "tools/call",
                Some(serde_json::json!({ "name": name, "arguments": arguments })),
            )
            .await?;
        parse_call_result(result)
    }

    async fn shutdown(&self) {
        self.io.lock().await.take();
        if let Some(mut child) = self.child.lock().await.take() {
            if let Err(e) = child.kill().await {
                warn!(error = %e, "Failed to stop browser host");
            } else {
                info!("Browser host stopped");
            }
        }
    }
}

/// Launches one `npx @playwright/mcp` (or configured) host per session.
pub struct McpBrowserHost {
    command: String,
    args: Vec<String>,
    timeout: Duration,
}

impl McpBrowserHost {
    pub fn new(config: &BrowserConfig) -> Self {
        Self {
            command: config.command.clone(),
            args: config.args.clone(),
            timeout: Duration::from_secs(config.request_timeout_secs),
        }
    }
}

#[async_trait]
impl BrowserLauncher for McpBrowserHost {
    async fn launch(&self) -> Result<Arc<dyn BrowserSession>, ToolError> {
        let session = McpSession::spawn(&self.command, &self.args, self.timeout).await?;
        Ok(Arc::new(session))
    }
}
