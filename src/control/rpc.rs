// src/control/rpc.rs

//! Remote control endpoint.
//!
//! ## Protocol
//!
//! JSON-RPC 2.0 over TCP, one JSON object per line in each direction.
//!
//! ## Methods
//!
//! - `Stop`: request shutdown and stop the running workflow. Params are
//!   ignored; the result is `null`.
//!
//! ```text
//! -> {"jsonrpc":"2.0","id":1,"method":"Stop"}
//! <- {"jsonrpc":"2.0","id":1,"result":null}
//! ```
//!
//! Notifications (requests without an `id`) are executed but not answered.
//! Lines longer than [`MAX_REQUEST_BYTES`] are rejected and the connection
//! is closed.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use crate::control::ControlContext;
use crate::errors::{Result, RunnerError};

/// Default control address.
pub const DEFAULT_RPC_ADDR: &str = "127.0.0.1:1234";

pub const METHOD_STOP: &str = "Stop";

/// Upper bound for one request line, newline included.
pub const MAX_REQUEST_BYTES: u64 = 64 * 1024;

const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

const PARSE_ERROR: i32 = -32700;
const INVALID_REQUEST: i32 = -32600;
const METHOD_NOT_FOUND: i32 = -32601;

#[derive(Debug, Serialize, Deserialize)]
struct RpcRequest {
    jsonrpc: String,
    #[serde(default)]
    id: Option<Value>,
    method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RpcResponse {
    jsonrpc: String,
    id: Option<Value>,
    // `Some(Value::Null)` still serializes, as `"result":null`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<RpcError>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RpcError {
    code: i32,
    message: String,
}

impl RpcResponse {
    fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    fn failure(id: Option<Value>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
            }),
        }
    }
}

/// TCP listener answering control requests.
#[derive(Debug)]
pub struct RpcServer {
    listener: TcpListener,
    ctx: Arc<ControlContext>,
}

impl RpcServer {
    pub async fn bind(addr: &str, ctx: Arc<ControlContext>) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| RunnerError::Rpc(format!("failed to bind {addr}: {e}")))?;
        Ok(Self { listener, ctx })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections forever, one task per client.
    pub async fn serve(self) -> Result<()> {
        info!(addr = %self.local_addr()?, "control server listening");

        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(pair) => pair,
                Err(e) => {
                    // EMFILE and friends persist for a while; don't spin on them.
                    error!(error = %e, "control server accept error");
                    tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                    continue;
                }
            };
            debug!(%peer, "control client connected");

            let ctx = Arc::clone(&self.ctx);
            tokio::spawn(async move {
                if let Err(e) = handle_client(stream, ctx).await {
                    warn!(%peer, error = %e, "control client error");
                }
            });
        }
    }
}

async fn handle_client(stream: TcpStream, ctx: Arc<ControlContext>) -> std::io::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        let n = (&mut reader)
            .take(MAX_REQUEST_BYTES)
            .read_until(b'\n', &mut buf)
            .await?;
        if n == 0 {
            return Ok(());
        }

        if !buf.ends_with(b"\n") && n as u64 == MAX_REQUEST_BYTES {
            warn!(limit = MAX_REQUEST_BYTES, "control request too large; closing connection");
            let response = RpcResponse::failure(None, INVALID_REQUEST, "Request too large");
            write_response(&mut writer, &response).await?;
            return Ok(());
        }

        let line = String::from_utf8_lossy(&buf);
        if line.trim().is_empty() {
            continue;
        }

        if let Some(response) = handle_line(&line, &ctx) {
            write_response(&mut writer, &response).await?;
        }
    }
}

/// Decode and execute one request line. `None` means no reply is due.
fn handle_line(line: &str, ctx: &ControlContext) -> Option<RpcResponse> {
    let value: Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(e) => {
            return Some(RpcResponse::failure(
                None,
                PARSE_ERROR,
                format!("Parse error: {e}"),
            ));
        }
    };

    let is_notification = value.is_object() && value.get("id").is_none();
    let id = value.get("id").cloned();

    let request = match serde_json::from_value::<RpcRequest>(value) {
        Ok(request) => request,
        Err(e) => {
            return Some(RpcResponse::failure(
                id,
                INVALID_REQUEST,
                format!("Invalid request: {e}"),
            ));
        }
    };

    let response = process_request(request, ctx);
    if is_notification {
        debug!("notification handled; no reply");
        None
    } else {
        Some(response)
    }
}

async fn write_response<W>(writer: &mut W, response: &RpcResponse) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut json = serde_json::to_string(response)?;
    json.push('\n');
    writer.write_all(json.as_bytes()).await?;
    writer.flush().await
}

fn process_request(request: RpcRequest, ctx: &ControlContext) -> RpcResponse {
    if request.jsonrpc != "2.0" {
        return RpcResponse::failure(request.id, INVALID_REQUEST, "jsonrpc must be \"2.0\"");
    }

    match request.method.as_str() {
        METHOD_STOP => {
            ctx.request_shutdown("rpc");
            RpcResponse::success(request.id, Value::Null)
        }
        other => RpcResponse::failure(
            request.id,
            METHOD_NOT_FOUND,
            format!("Method not found: {other}"),
        ),
    }
}

/// Call `Stop` on the instance listening at `addr`.
pub async fn send_stop(addr: &str) -> Result<()> {
    let stream = TcpStream::connect(addr)
        .await
        .map_err(|e| RunnerError::Rpc(format!("failed to connect to {addr}: {e}")))?;
    let (reader, mut writer) = stream.into_split();

    let request = RpcRequest {
        jsonrpc: "2.0".to_string(),
        id: Some(Value::from(1)),
        method: METHOD_STOP.to_string(),
        params: None,
    };
    let mut json = serde_json::to_string(&request)
        .map_err(|e| RunnerError::Rpc(format!("encoding request: {e}")))?;
    json.push('\n');
    writer.write_all(json.as_bytes()).await?;
    writer.flush().await?;

    let line = BufReader::new(reader)
        .lines()
        .next_line()
        .await?
        .ok_or_else(|| RunnerError::Rpc("connection closed before a response".to_string()))?;

    let response: RpcResponse = serde_json::from_str(&line)
        .map_err(|e| RunnerError::Rpc(format!("malformed response: {e}")))?;

    match response.error {
        Some(err) => Err(RunnerError::Rpc(format!("{} (code {})", err.message, err.code))),
        None => Ok(()),
    }
}
