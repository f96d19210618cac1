//! stdio inbound transport (spec §4.7, §6: "`stdio`: stdin/stdout NDJSON").
//!
//! Structurally the same read-loop as the teacher's `mcp-hub-bridge` binary
//! (`BufReader::lines()` + `tokio::select!` against ctrl-c), but dispatching
//! in-process through the [`crate::lazy::LazyOrchestrator`] instead of
//! forwarding each line over HTTP to a separate server process.
//!
//! Also the one client this transport ever has answers for reverse fan-out
//! (`roots/list`, `sampling/createMessage`): outgoing server-initiated
//! requests share the same stdout as responses, and their replies come back
//! as ordinary lines on stdin, so [`StdioClientCallback`] correlates them by
//! JSON-RPC id against the normal request loop.

use crate::error::{ProxyError, ProxyResult};
use crate::lazy::LazyOrchestrator;
use crate::router::pagination::PaginationMode;
use crate::router::reverse::ClientCallback;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{oneshot, Mutex};

const STDIO_SESSION_ID: &str = "stdio";
const REVERSE_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Forwards server-initiated requests to the one client on the other end of
/// stdout, and correlates their replies (read back off stdin by the main
/// loop) by request id.
struct StdioClientCallback {
    next_id: AtomicI64,
    pending: DashMap<i64, oneshot::Sender<serde_json::Value>>,
    stdout: Arc<Mutex<tokio::io::Stdout>>,
}

impl StdioClientCallback {
    fn new(stdout: Arc<Mutex<tokio::io::Stdout>>) -> Self {
        Self { next_id: AtomicI64::new(1), pending: DashMap::new(), stdout }
    }

    /// Called from the main read loop when a line looks like a response
    /// (has `id` plus `result` or `error`, no `method`) rather than a new
    /// request.
    fn resolve(&self, id: i64, payload: serde_json::Value) {
        if let Some((_, tx)) = self.pending.remove(&id) {
            let _ = tx.send(payload);
        }
    }
}

#[async_trait]
impl ClientCallback for StdioClientCallback {
    async fn forward(&self, method: &str, params: serde_json::Value) -> ProxyResult<serde_json::Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);

        let request = serde_json::json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params });
        let mut line = serde_json::to_vec(&request).map_err(|e| ProxyError::Fatal(e.to_string()))?;
        line.push(b'\n');

        {
            let mut stdout = self.stdout.lock().await;
            stdout.write_all(&line).await.map_err(|e| ProxyError::Transient("stdio-client".to_string(), e.to_string()))?;
            stdout.flush().await.map_err(|e| ProxyError::Transient("stdio-client".to_string(), e.to_string()))?;
        }

        let response = tokio::time::timeout(REVERSE_CALL_TIMEOUT, rx).await.map_err(|_| {
            self.pending.remove(&id);
            ProxyError::Timeout { upstream: "stdio-client".to_string(), deadline_ms: REVERSE_CALL_TIMEOUT.as_millis() as u64 }
        })?;
        let response = response.map_err(|_| ProxyError::Disconnected("stdio-client".to_string()))?;

        if let Some(error) = response.get("error") {
            return Err(ProxyError::UpstreamProtocol { upstream: "stdio-client".to_string(), message: error.to_string() });
        }
        Ok(response.get("result").cloned().unwrap_or(serde_json::Value::Null))
    }
}

pub async fn run(lazy: Arc<LazyOrchestrator>) {
    lazy.router()
        .create_session(
            STDIO_SESSION_ID.to_string(),
            None,
            None,
            PaginationMode::Disabled,
            crate::config::template::SessionContext::default(),
            now_ms(),
        )
        .await;

    let stdin = BufReader::new(tokio::io::stdin());
    let stdout = Arc::new(Mutex::new(tokio::io::stdout()));
    let mut lines = stdin.lines();

    let callback = Arc::new(StdioClientCallback::new(stdout.clone()));
    lazy.router().upstreams.reverse.register(STDIO_SESSION_ID.to_string(), callback.clone());

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        if let Err(e) = handle_line(&lazy, &callback, &line, &stdout).await {
                            tracing::warn!("stdio transport: {}", e);
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        tracing::error!("stdio transport: stdin read error: {}", e);
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("stdio transport: interrupted");
                break;
            }
        }
    }

    lazy.router().upstreams.reverse.unregister(STDIO_SESSION_ID);
}

async fn handle_line(
    lazy: &Arc<LazyOrchestrator>,
    callback: &Arc<StdioClientCallback>,
    line: &str,
    stdout: &Arc<Mutex<tokio::io::Stdout>>,
) -> std::io::Result<()> {
    let request: serde_json::Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!("stdio transport: malformed JSON-RPC line: {}", e);
            return Ok(());
        }
    };

    let method = request.get("method").and_then(|v| v.as_str());

    // No `method` but has `id` and a `result`/`error`: this is a reply to a
    // reverse fan-out request we sent, not a new inbound request.
    if method.is_none() {
        if let Some(id) = request.get("id").and_then(|v| v.as_i64()) {
            if request.get("result").is_some() || request.get("error").is_some() {
                callback.resolve(id, request);
            }
        }
        return Ok(());
    }
    let method = method.unwrap();

    let params = request.get("params").cloned().unwrap_or(serde_json::Value::Null);
    let Some(id) = request.get("id").cloned() else {
        return Ok(()); // notification, no response expected
    };

    let response = match lazy.dispatch(STDIO_SESSION_ID, method, params, now_ms()).await {
        Ok(result) => serde_json::json!({ "jsonrpc": "2.0", "id": id, "result": result }),
        Err(e) => e.to_json_rpc_error(id),
    };

    let mut out = serde_json::to_vec(&response)?;
    out.push(b'\n');
    let mut stdout = stdout.lock().await;
    stdout.write_all(&out).await?;
    stdout.flush().await?;
    Ok(())
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
