// tests/rpc_control.rs

use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use workflow_runner::control::{ControlContext, MAX_REQUEST_BYTES, RpcServer, send_stop};
use workflow_runner::errors::RunnerError;
use workflow_runner_test_utils::{init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

async fn start_server(ctx: Arc<ControlContext>) -> Result<SocketAddr, Box<dyn Error>> {
    let server = RpcServer::bind("127.0.0.1:0", ctx).await?;
    let addr = server.local_addr()?;
    tokio::spawn(server.serve());
    Ok(addr)
}

/// Send raw lines over one connection and collect one response per line.
async fn exchange(addr: SocketAddr, lines: &[&str]) -> Result<Vec<Value>, Box<dyn Error>> {
    let stream = TcpStream::connect(addr).await?;
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader).lines();

    let mut responses = Vec::new();
    for line in lines {
        writer.write_all(format!("{line}\n").as_bytes()).await?;
        let reply = reader.next_line().await?.ok_or("connection closed")?;
        responses.push(serde_json::from_str(&reply)?);
    }
    Ok(responses)
}

/// Send all lines, then read exactly `expected` responses.
async fn exchange_expecting(
    addr: SocketAddr,
    lines: &[&str],
    expected: usize,
) -> Result<Vec<Value>, Box<dyn Error>> {
    let stream = TcpStream::connect(addr).await?;
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader).lines();

    for line in lines {
        writer.write_all(format!("{line}\n").as_bytes()).await?;
    }
    let mut responses = Vec::new();
    for _ in 0..expected {
        let reply = reader.next_line().await?.ok_or("connection closed")?;
        responses.push(serde_json::from_str(&reply)?);
    }
    Ok(responses)
}

#[tokio::test]
async fn stop_method_requests_shutdown() -> TestResult {
    init_tracing();
    let ctx = Arc::new(ControlContext::new());
    let addr = start_server(Arc::clone(&ctx)).await?;

    let responses = with_timeout(exchange(
        addr,
        &[r#"{"jsonrpc":"2.0","id":7,"method":"Stop","params":["ignored"]}"#],
    ))
    .await?;

    let reply = &responses[0];
    assert_eq!(reply["jsonrpc"], "2.0");
    assert_eq!(reply["id"], 7);
    assert!(reply.get("result").is_some_and(Value::is_null));
    assert!(reply.get("error").is_none());
    assert!(ctx.is_shutdown_requested());
    Ok(())
}

#[tokio::test]
async fn unknown_method_and_bad_json_are_rejected() -> TestResult {
    let ctx = Arc::new(ControlContext::new());
    let addr = start_server(Arc::clone(&ctx)).await?;

    let responses = with_timeout(exchange(
        addr,
        &[
            r#"{"jsonrpc":"2.0","id":1,"method":"Restart"}"#,
            "{not json",
            r#"{"jsonrpc":"1.0","id":2,"method":"Stop"}"#,
        ],
    ))
    .await?;

    assert_eq!(responses[0]["error"]["code"], -32601);
    assert_eq!(responses[0]["id"], 1);
    assert_eq!(responses[1]["error"]["code"], -32700);
    assert!(responses[1]["id"].is_null());
    assert_eq!(responses[2]["error"]["code"], -32600);
    assert!(responses.iter().all(|r| r.get("result").is_none()));

    // None of these reached the control context.
    assert!(!ctx.is_shutdown_requested());
    Ok(())
}

#[tokio::test]
async fn valid_json_that_is_not_a_request_is_invalid() -> TestResult {
    let ctx = Arc::new(ControlContext::new());
    let addr = start_server(Arc::clone(&ctx)).await?;

    let responses = with_timeout(exchange(
        addr,
        &[
            r#"{"jsonrpc":"2.0","id":3}"#,
            r#"{"id":4,"method":"Stop"}"#,
            "[1,2,3]",
        ],
    ))
    .await?;

    for (reply, id) in responses.iter().zip([Value::from(3), Value::from(4), Value::Null]) {
        assert_eq!(reply["error"]["code"], -32600, "{reply}");
        assert_eq!(reply["id"], id);
    }
    assert!(!ctx.is_shutdown_requested());
    Ok(())
}

#[tokio::test]
async fn notifications_are_executed_without_a_reply() -> TestResult {
    let ctx = Arc::new(ControlContext::new());
    let addr = start_server(Arc::clone(&ctx)).await?;

    // The only reply on the wire belongs to the second line.
    let responses = with_timeout(exchange_expecting(
        addr,
        &[
            r#"{"jsonrpc":"2.0","method":"Stop"}"#,
            r#"{"jsonrpc":"2.0","id":9,"method":"Restart"}"#,
        ],
        1,
    ))
    .await?;

    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0]["id"], 9);
    assert_eq!(responses[0]["error"]["code"], -32601);
    assert!(ctx.is_shutdown_requested());
    Ok(())
}

#[tokio::test]
async fn oversized_request_is_rejected_and_the_connection_closed() -> TestResult {
    let ctx = Arc::new(ControlContext::new());
    let addr = start_server(Arc::clone(&ctx)).await?;

    let stream = TcpStream::connect(addr).await?;
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader).lines();

    // Exactly the limit with no newline, so the server has read every byte
    // it was sent when it closes.
    let huge = "x".repeat(MAX_REQUEST_BYTES as usize);
    writer.write_all(huge.as_bytes()).await?;

    let reply = with_timeout(reader.next_line()).await?.ok_or("no reply")?;
    let reply: Value = serde_json::from_str(&reply)?;
    assert_eq!(reply["error"]["code"], -32600);
    assert!(with_timeout(reader.next_line()).await?.is_none());
    assert!(!ctx.is_shutdown_requested());
    Ok(())
}

#[tokio::test]
async fn send_stop_client_talks_to_the_server() -> TestResult {
    let ctx = Arc::new(ControlContext::new());
    let addr = start_server(Arc::clone(&ctx)).await?;

    with_timeout(send_stop(&addr.to_string())).await?;
    assert!(ctx.is_shutdown_requested());
    Ok(())
}

#[tokio::test]
async fn send_stop_without_a_server_is_an_rpc_error() -> TestResult {
    // Bind and drop to find a port nobody listens on.
    let addr = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        listener.local_addr()?
    };

    let err = with_timeout(send_stop(&addr.to_string())).await.unwrap_err();
    assert!(matches!(err, RunnerError::Rpc(_)), "got {err:?}");
    Ok(())
}

#[tokio::test]
async fn wait_for_shutdown_wakes_up_on_request() -> TestResult {
    let ctx = Arc::new(ControlContext::new());
    let waiter = {
        let ctx = Arc::clone(&ctx);
        tokio::spawn(async move { ctx.wait_for_shutdown().await })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!waiter.is_finished());

    ctx.request_shutdown("test");
    with_timeout(waiter).await?;

    // Already requested: resolves immediately.
    with_timeout(ctx.wait_for_shutdown()).await;
    Ok(())
}

#[tokio::test]
async fn stop_current_without_a_cycle_is_a_control_error() {
    let ctx = ControlContext::new();
    assert!(matches!(ctx.stop_current(), Err(RunnerError::NoRunningProcess)));
    // request_shutdown swallows it.
    ctx.request_shutdown("test");
    assert!(ctx.is_shutdown_requested());
}
