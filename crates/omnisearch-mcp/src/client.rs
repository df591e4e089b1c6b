//! MCP client: owns one server child, serializes concurrent requests, and
//! correlates responses by id.
//!
//! A single reader task drains the server's stdout line by line and completes
//! the matching awaiter for each response frame. The client is single-use:
//! initialize once, then `list_tools` / `call_tool`, then `disconnect`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use omnisearch_core::{OmniError, OmniResult, Tool, ToolResult};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::protocol::{CallToolResult, InitializeResult, JsonRpcRequest, JsonRpcResponse, ServerCapabilities};
use crate::transport::ChildTransport;

/// MCP protocol revision spoken during the handshake.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Default wait for one RPC round-trip.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

type Pending = Arc<Mutex<HashMap<i64, oneshot::Sender<JsonRpcResponse>>>>;

pub struct McpClient {
    name: String,
    /// Taken on disconnect; dropping it delivers EOF to the child.
    writer: Mutex<Option<Box<dyn AsyncWrite + Send + Unpin>>>,
    pending: Pending,
    next_id: AtomicI64,
    handshake_started: AtomicBool,
    ready: AtomicBool,
    /// Set by `disconnect` and by the reader on EOF.
    closed: Arc<AtomicBool>,
    request_timeout: Duration,
    transport: Option<ChildTransport>,
    reader: JoinHandle<()>,
}

impl McpClient {
    /// Spawn the server child and wire a client over its stdio.
    ///
    /// The client is not ready until [`McpClient::initialize`] succeeds.
    pub fn spawn(
        name: &str,
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
    ) -> OmniResult<Self> {
        let (transport, stdin, stdout) = ChildTransport::spawn(name, command, args, env)?;
        let mut client = Self::over_stream(name, stdout, stdin);
        client.transport = Some(transport);
        Ok(client)
    }

    /// Wire a client over arbitrary read/write halves.
    ///
    /// Used by [`McpClient::spawn`] with the child's pipes, and by tests with
    /// in-memory pipes standing in for a server.
    pub fn over_stream<R, W>(name: &str, stdout: R, stdin: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let reader = tokio::spawn(read_loop(
            name.to_string(),
            stdout,
            pending.clone(),
            closed.clone(),
        ));

        Self {
            name: name.to_string(),
            writer: Mutex::new(Some(Box::new(stdin))),
            pending,
            next_id: AtomicI64::new(1),
            handshake_started: AtomicBool::new(false),
            ready: AtomicBool::new(false),
            closed,
            request_timeout: REQUEST_TIMEOUT,
            transport: None,
            reader,
        }
    }

    /// Override the per-RPC timeout (tests use short ones).
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Perform the MCP handshake. Exactly once per client; a failed client
    /// is discarded, not retried.
    pub async fn initialize(&self) -> OmniResult<ServerCapabilities> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(OmniError::NotConnected);
        }
        if self.handshake_started.swap(true, Ordering::SeqCst) {
            return Err(OmniError::Process("initialize already attempted".into()));
        }

        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": "omnisearch",
                "version": env!("CARGO_PKG_VERSION"),
            },
        });

        let resp = self.request("initialize", Some(params)).await?;
        let result = expect_result(resp)?;
        let init: InitializeResult = serde_json::from_value(result)
            .map_err(|e| OmniError::ResponseParse(format!("initialize result: {e}")))?;

        info!(
            source = %self.name,
            protocol = %init.protocol_version,
            "server initialized"
        );

        self.notify("notifications/initialized", None).await?;
        self.ready.store(true, Ordering::SeqCst);

        Ok(init.capabilities)
    }

    /// Fetch the server's tool catalog. Empty if the result has no `tools`.
    pub async fn list_tools(&self) -> OmniResult<Vec<Tool>> {
        self.ensure_ready()?;

        let resp = self.request("tools/list", None).await?;
        let result = expect_result(resp)?;
        let tools = result.get("tools").cloned().unwrap_or_else(|| json!([]));

        serde_json::from_value(tools)
            .map_err(|e| OmniError::ResponseParse(format!("tools/list result: {e}")))
    }

    /// Invoke one tool and flatten its content blocks into a [`ToolResult`].
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: HashMap<String, Value>,
    ) -> OmniResult<ToolResult> {
        self.ensure_ready()?;

        let params = json!({ "name": name, "arguments": arguments });
        let resp = self.request("tools/call", Some(params)).await?;

        if let Some(err) = resp.error {
            return Err(OmniError::Server {
                code: err.code,
                message: err.message,
            });
        }

        let Some(result) = resp.result else {
            // A reply carrying neither result nor error counts as a failed call.
            return Ok(ToolResult::error(""));
        };

        let call: CallToolResult = serde_json::from_value(result)
            .map_err(|e| OmniError::ResponseParse(format!("tools/call result: {e}")))?;

        Ok(call.flatten())
    }

    /// Terminate the child and fail any in-flight awaiters. Idempotent;
    /// every RPC after this returns `NotConnected`.
    pub async fn disconnect(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        // EOF on stdin is the terminate signal for stdio servers.
        self.writer.lock().await.take();

        if let Some(transport) = &self.transport {
            transport.shutdown().await;
        }

        self.reader.abort();
        self.pending.lock().await.clear();
    }

    fn ensure_ready(&self) -> OmniResult<()> {
        if self.ready.load(Ordering::SeqCst) && !self.closed.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(OmniError::NotConnected)
        }
    }

    /// Allocate an id, park an awaiter, write one frame, await the reply.
    async fn request(&self, method: &str, params: Option<Value>) -> OmniResult<JsonRpcResponse> {
        let (tx, rx) = oneshot::channel();

        // Id allocation shares the writer critical section, so frames reach
        // the wire in id order.
        let id = {
            let mut guard = self.writer.lock().await;
            let writer = guard.as_mut().ok_or(OmniError::NotConnected)?;

            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            let mut frame = serde_json::to_string(&JsonRpcRequest::new(id, method, params))?;
            frame.push('\n');

            self.pending.lock().await.insert(id, tx);

            if let Err(e) = write_line(writer, &frame).await {
                self.pending.lock().await.remove(&id);
                return Err(OmniError::ConnectionFailed(format!("stdin write failed: {e}")));
            }
            id
        };

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(resp)) => Ok(resp),
            // The reader dropped our sender: stdout closed underneath us.
            Ok(Err(_)) => Err(OmniError::ConnectionFailed("stream closed".into())),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(OmniError::ConnectionFailed(format!(
                    "request '{method}' timed out after {}s",
                    self.request_timeout.as_secs()
                )))
            }
        }
    }

    /// Fire a notification; no id, no awaiter, no reply.
    async fn notify(&self, method: &str, params: Option<Value>) -> OmniResult<()> {
        let mut msg = json!({ "jsonrpc": "2.0", "method": method });
        if let Some(params) = params {
            msg["params"] = params;
        }
        let mut frame = serde_json::to_string(&msg)?;
        frame.push('\n');

        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(OmniError::NotConnected)?;
        write_line(writer, &frame)
            .await
            .map_err(|e| OmniError::ConnectionFailed(format!("stdin write failed: {e}")))
    }
}

/// One newline-terminated frame per write, flushed immediately.
async fn write_line(
    writer: &mut Box<dyn AsyncWrite + Send + Unpin>,
    frame: &str,
) -> std::io::Result<()> {
    writer.write_all(frame.as_bytes()).await?;
    writer.flush().await
}

impl Drop for McpClient {
    fn drop(&mut self) {
        // The child itself dies via kill_on_drop when the transport goes.
        self.reader.abort();
    }
}

/// Map a response to its result, surfacing JSON-RPC errors.
fn expect_result(resp: JsonRpcResponse) -> OmniResult<Value> {
    if let Some(err) = resp.error {
        return Err(OmniError::Server {
            code: err.code,
            message: err.message,
        });
    }
    resp.result
        .ok_or_else(|| OmniError::ResponseParse("response carried neither result nor error".into()))
}

/// Drain stdout line by line, dispatching response frames by id.
///
/// Never terminates on a parse error. On EOF the pending table is cleared,
/// which wakes every in-flight awaiter with a closed-stream failure.
async fn read_loop<R>(source: String, stdout: R, pending: Pending, closed: Arc<AtomicBool>)
where
    R: AsyncRead + Send + Unpin + 'static,
{
    let mut lines = BufReader::new(stdout).lines();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                match serde_json::from_str::<JsonRpcResponse>(trimmed) {
                    Ok(resp) => match resp.id {
                        Some(id) => {
                            let mut map = pending.lock().await;
                            match map.remove(&id) {
                                Some(tx) => {
                                    let _ = tx.send(resp);
                                }
                                None => {
                                    debug!(source = %source, id, "response for unknown id, dropping");
                                }
                            }
                        }
                        // Server-initiated notifications are ignored.
                        None => {
                            debug!(source = %source, "notification frame from server, ignoring");
                        }
                    },
                    Err(e) => {
                        debug!(source = %source, line = %trimmed, error = %e, "undecodable frame, skipping");
                    }
                }
            }
            Ok(None) => {
                debug!(source = %source, "server stdout closed");
                break;
            }
            Err(e) => {
                warn!(source = %source, error = %e, "error reading server stdout");
                break;
            }
        }
    }

    // Mark the client unusable first so callers racing with the close see
    // NotConnected rather than parking a fresh awaiter forever.
    closed.store(true, Ordering::SeqCst);
    pending.lock().await.clear();
}
