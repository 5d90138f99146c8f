use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::protocol::{
  CallToolResult, Implementation, Inbound, InitializeResult, ListToolsResult, METHOD_NOT_FOUND,
  PROTOCOL_VERSION, RpcErrorObject, ToolDescriptor, classify, error_line, notification_line,
  request_line, result_line,
};

/// Time a server gets to exit on its own after stdin is closed.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<Value, RpcErrorObject>>>>>;

#[derive(Debug, Error)]
pub enum McpError {
  #[error("failed to start `{program}`: {source}")]
  Spawn {
    program: String,
    #[source]
    source: std::io::Error,
  },
  #[error("server `{0}` did not expose piped stdio")]
  MissingPipe(String),
  #[error("handshake with `{server}` did not finish within {timeout:?}")]
  HandshakeTimeout { server: String, timeout: Duration },
  #[error("server error {code}: {message}")]
  Rpc { code: i64, message: String },
  #[error("connection to server closed")]
  Closed,
  #[error("malformed `{method}` response: {source}")]
  Decode {
    method: String,
    #[source]
    source: serde_json::Error,
  },
}

/// How to launch a capability server as a child process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerCommand {
  pub name: String,
  pub program: String,
  pub args: Vec<String>,
  pub env: BTreeMap<String, String>,
  pub cwd: Option<PathBuf>,
}

/// JSON-RPC client for one capability server.
///
/// Messages are newline-delimited JSON. A writer task owns the outbound half,
/// a reader task routes responses to waiting callers and answers `ping`
/// requests from the server. When the client was created by [`McpClient::spawn`]
/// it also owns the child process; [`McpClient::shutdown`] closes stdin, waits
/// briefly and kills the process if it is still running. The child is spawned
/// with `kill_on_drop` so an unwinding caller does not leak it.
pub struct McpClient {
  name: String,
  outbound: Mutex<Option<mpsc::Sender<String>>>,
  pending: Pending,
  closed: Arc<AtomicBool>,
  next_id: AtomicU64,
  child: tokio::sync::Mutex<Option<Child>>,
  tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for McpClient {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("McpClient")
      .field("name", &self.name)
      .field("closed", &self.closed.load(Ordering::SeqCst))
      .finish()
  }
}

impl McpClient {
  /// Launch the server and complete the `initialize` handshake within
  /// `handshake_timeout`. On any failure the process is stopped before the
  /// error is returned.
  pub async fn spawn(
    command: &ServerCommand,
    client: &Implementation,
    handshake_timeout: Duration,
  ) -> Result<Self, McpError> {
    let mut cmd = Command::new(&command.program);
    cmd
      .args(&command.args)
      .envs(&command.env)
      .stdin(Stdio::piped())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .kill_on_drop(true);
    if let Some(dir) = &command.cwd {
      cmd.current_dir(dir);
    }

    let mut child = cmd.spawn().map_err(|source| McpError::Spawn {
      program: command.program.clone(),
      source,
    })?;
    let pid = child.id();

    let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
      let _ = child.kill().await;
      return Err(McpError::MissingPipe(command.name.clone()));
    };
    let stderr = child.stderr.take();

    let connection = Self::from_parts(command.name.clone(), stdout, stdin, Some(child));
    if let Some(stderr) = stderr {
      let task = tokio::spawn(forward_stderr(command.name.clone(), stderr));
      lock(&connection.tasks).push(task);
    }
    info!(
      event = "mcp_server_spawned",
      server = %command.name,
      program = %command.program,
      pid = ?pid,
      "capability server started"
    );

    match tokio::time::timeout(handshake_timeout, connection.initialize(client)).await {
      Ok(Ok(_)) => Ok(connection),
      Ok(Err(err)) => {
        connection.shutdown().await;
        Err(err)
      }
      Err(_) => {
        connection.shutdown().await;
        Err(McpError::HandshakeTimeout {
          server: command.name.clone(),
          timeout: handshake_timeout,
        })
      }
    }
  }

  /// Wrap an already-connected byte stream. The caller is responsible for
  /// calling [`McpClient::initialize`].
  pub fn from_streams<R, W>(name: impl Into<String>, reader: R, writer: W) -> Self
  where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
  {
    Self::from_parts(name.into(), reader, writer, None)
  }

  fn from_parts<R, W>(name: String, reader: R, writer: W, child: Option<Child>) -> Self
  where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
  {
    let (tx, rx) = mpsc::channel::<String>(64);
    let pending: Pending = Arc::default();
    let closed = Arc::new(AtomicBool::new(false));

    let writer_task = tokio::spawn(write_loop(name.clone(), writer, rx));
    let reader_task = tokio::spawn(read_loop(
      name.clone(),
      reader,
      Arc::clone(&pending),
      Arc::clone(&closed),
      tx.downgrade(),
    ));

    Self {
      name,
      outbound: Mutex::new(Some(tx)),
      pending,
      closed,
      next_id: AtomicU64::new(1),
      child: tokio::sync::Mutex::new(child),
      tasks: Mutex::new(vec![writer_task, reader_task]),
    }
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub async fn initialize(&self, client: &Implementation) -> Result<InitializeResult, McpError> {
    let params = json!({
      "protocolVersion": PROTOCOL_VERSION,
      "capabilities": {},
      "clientInfo": client,
    });
    let result: InitializeResult = decode("initialize", self.request("initialize", params).await?)?;
    self.notify("notifications/initialized", None).await?;
    info!(
      event = "mcp_initialized",
      server = %self.name,
      protocol = %result.protocol_version,
      server_name = ?result.server_info.as_ref().map(|s| s.name.as_str()),
      "handshake complete"
    );
    Ok(result)
  }

  /// Fetch every tool, following `nextCursor` pagination.
  pub async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, McpError> {
    let mut tools = Vec::new();
    let mut cursor: Option<String> = None;
    loop {
      let params = match &cursor {
        Some(cursor) => json!({ "cursor": cursor }),
        None => json!({}),
      };
      let page: ListToolsResult = decode("tools/list", self.request("tools/list", params).await?)?;
      tools.extend(page.tools);
      match page.next_cursor {
        Some(next) if !next.is_empty() && cursor.as_deref() != Some(next.as_str()) => {
          cursor = Some(next);
        }
        _ => break,
      }
    }
    debug!(event = "mcp_tools_listed", server = %self.name, count = tools.len());
    Ok(tools)
  }

  pub async fn call_tool(
    &self,
    name: &str,
    arguments: Map<String, Value>,
  ) -> Result<CallToolResult, McpError> {
    let params = json!({ "name": name, "arguments": arguments });
    decode("tools/call", self.request("tools/call", params).await?)
  }

  /// Send a request and wait for the matching response.
  pub async fn request(&self, method: &str, params: Value) -> Result<Value, McpError> {
    let id = self.next_id.fetch_add(1, Ordering::SeqCst);
    let (tx, rx) = oneshot::channel();
    lock(&self.pending).insert(id, tx);
    let _guard = PendingGuard {
      pending: &self.pending,
      id,
    };
    // The reader marks the connection closed before it drops pending senders,
    // so checking after the insert cannot miss a shutdown.
    if self.closed.load(Ordering::SeqCst) {
      return Err(McpError::Closed);
    }

    let sender = self.sender()?;
    sender
      .send(request_line(id, method, params))
      .await
      .map_err(|_| McpError::Closed)?;

    match rx.await {
      Ok(Ok(value)) => Ok(value),
      Ok(Err(err)) => Err(McpError::Rpc {
        code: err.code,
        message: err.message,
      }),
      Err(_) => Err(McpError::Closed),
    }
  }

  pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), McpError> {
    let sender = self.sender()?;
    sender
      .send(notification_line(method, params))
      .await
      .map_err(|_| McpError::Closed)
  }

  /// Close stdin, give the server a moment to exit, then kill it. Safe to
  /// call more than once.
  pub async fn shutdown(&self) {
    drop(lock(&self.outbound).take());

    if let Some(mut child) = self.child.lock().await.take() {
      match tokio::time::timeout(SHUTDOWN_GRACE, child.wait()).await {
        Ok(Ok(status)) => {
          debug!(event = "mcp_server_exited", server = %self.name, status = %status);
        }
        _ => {
          if let Err(err) = child.kill().await {
            warn!(event = "mcp_server_kill_failed", server = %self.name, error = %err);
          }
        }
      }
    }

    for task in lock(&self.tasks).drain(..) {
      task.abort();
    }
    self.closed.store(true, Ordering::SeqCst);
    lock(&self.pending).clear();
    info!(event = "mcp_server_stopped", server = %self.name, "capability server stopped");
  }

  fn sender(&self) -> Result<mpsc::Sender<String>, McpError> {
    lock(&self.outbound).clone().ok_or(McpError::Closed)
  }
}

struct PendingGuard<'a> {
  pending: &'a Pending,
  id: u64,
}

impl Drop for PendingGuard<'_> {
  fn drop(&mut self) {
    lock(self.pending).remove(&self.id);
  }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
  mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn decode<T: DeserializeOwned>(method: &str, value: Value) -> Result<T, McpError> {
  serde_json::from_value(value).map_err(|source| McpError::Decode {
    method: method.to_string(),
    source,
  })
}

async fn write_loop<W>(server: String, mut writer: W, mut rx: mpsc::Receiver<String>)
where
  W: AsyncWrite + Unpin,
{
  while let Some(line) = rx.recv().await {
    let written: std::io::Result<()> = async {
      writer.write_all(line.as_bytes()).await?;
      writer.write_all(b"\n").await?;
      writer.flush().await
    }
    .await;
    if let Err(err) = written {
      warn!(event = "mcp_write_failed", server = %server, error = %err);
      break;
    }
  }
  let _ = writer.shutdown().await;
}

async fn read_loop<R>(
  server: String,
  reader: R,
  pending: Pending,
  closed: Arc<AtomicBool>,
  outbound: mpsc::WeakSender<String>,
) where
  R: AsyncRead + Unpin,
{
  let mut lines = BufReader::new(reader).lines();
  loop {
    let line = match lines.next_line().await {
      Ok(Some(line)) => line,
      Ok(None) => {
        debug!(event = "mcp_stdout_closed", server = %server);
        break;
      }
      Err(err) => {
        warn!(event = "mcp_read_failed", server = %server, error = %err);
        break;
      }
    };
    let line = line.trim();
    if line.is_empty() {
      continue;
    }

    match classify(line) {
      Some(Inbound::Response { id, outcome }) => {
        let waiter = lock(&pending).remove(&id);
        match waiter {
          Some(waiter) => {
            let _ = waiter.send(outcome);
          }
          None => debug!(event = "mcp_unmatched_response", server = %server, id),
        }
      }
      Some(Inbound::Request { id, method }) => {
        let reply = if method == "ping" {
          result_line(&id, json!({}))
        } else {
          error_line(
            &id,
            METHOD_NOT_FOUND,
            &format!("method `{method}` is not supported by this client"),
          )
        };
        if let Some(tx) = outbound.upgrade() {
          let _ = tx.send(reply).await;
        }
      }
      Some(Inbound::Notification { method }) => {
        debug!(event = "mcp_notification", server = %server, method = %method);
      }
      None => {
        debug!(event = "mcp_non_protocol_line", server = %server, line = %line);
      }
    }
  }

  closed.store(true, Ordering::SeqCst);
  lock(&pending).clear();
}

async fn forward_stderr(server: String, stderr: ChildStderr) {
  let mut lines = BufReader::new(stderr).lines();
  while let Ok(Some(line)) = lines.next_line().await {
    debug!(event = "mcp_server_stderr", server = %server, line = %line);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tokio::io::{DuplexStream, duplex};

  fn page(id: &Value, tools: &[&str], next: Option<&str>) -> Value {
    let tools: Vec<Value> = tools
      .iter()
      .map(|name| json!({ "name": name, "inputSchema": { "type": "object" } }))
      .collect();
    json!({ "jsonrpc": "2.0", "id": id, "result": { "tools": tools, "nextCursor": next } })
  }

  /// Minimal scripted server: answers the handshake, two pages of tools and
  /// `tools/call`, and pings the client once after `initialized`.
  async fn serve(io: DuplexStream, ping_reply: oneshot::Sender<Value>) {
    let (read, mut write) = tokio::io::split(io);
    let mut lines = BufReader::new(read).lines();
    let mut ping_reply = Some(ping_reply);
    write.write_all(b"fake server ready\n").await.unwrap();

    while let Ok(Some(line)) = lines.next_line().await {
      let msg: Value = serde_json::from_str(&line).unwrap();
      let method = msg.get("method").and_then(Value::as_str).map(str::to_string);
      let id = msg.get("id").cloned();
      let reply = match (method.as_deref(), id) {
        (Some("initialize"), Some(id)) => json!({
          "jsonrpc": "2.0",
          "id": id,
          "result": {
            "protocolVersion": PROTOCOL_VERSION,
            "serverInfo": { "name": "fake", "version": "1" },
            "capabilities": {}
          }
        }),
        (Some("notifications/initialized"), None) => {
          json!({ "jsonrpc": "2.0", "id": "srv-1", "method": "ping" })
        }
        (Some("tools/list"), Some(id)) => {
          if msg["params"]["cursor"] == "p2" {
            page(&id, &["git_commit"], None)
          } else {
            page(&id, &["git_status", "git_diff"], Some("p2"))
          }
        }
        (Some("tools/call"), Some(id)) => {
          let name = msg["params"]["name"].as_str().unwrap_or_default();
          json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": {
              "content": [{ "type": "text", "text": format!("called {name}") }],
              "isError": name == "fail"
            }
          })
        }
        (None, Some(_)) => {
          if let Some(tx) = ping_reply.take() {
            let _ = tx.send(msg.clone());
          }
          continue;
        }
        _ => continue,
      };
      write
        .write_all(format!("{reply}\n").as_bytes())
        .await
        .unwrap();
    }
  }

  fn connect() -> (McpClient, oneshot::Receiver<Value>) {
    let (client_io, server_io) = duplex(16 * 1024);
    let (ping_tx, ping_rx) = oneshot::channel();
    tokio::spawn(serve(server_io, ping_tx));
    let (read, write) = tokio::io::split(client_io);
    (McpClient::from_streams("fake", read, write), ping_rx)
  }

  #[tokio::test]
  async fn handshake_and_paginated_discovery() {
    let (client, ping_rx) = connect();
    let info = client
      .initialize(&Implementation::new("test", "0.0.0"))
      .await
      .expect("initialize");
    assert_eq!(info.protocol_version, PROTOCOL_VERSION);

    let tools = client.list_tools().await.expect("list tools");
    let names: Vec<_> = tools.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["git_status", "git_diff", "git_commit"]);

    let ping = ping_rx.await.expect("server saw ping reply");
    assert_eq!(ping["id"], "srv-1");
    assert_eq!(ping["result"], json!({}));

    client.shutdown().await;
  }

  #[tokio::test]
  async fn call_tool_reports_error_flag() {
    let (client, _ping) = connect();
    client
      .initialize(&Implementation::new("test", "0.0.0"))
      .await
      .unwrap();

    let ok = client.call_tool("git_status", Map::new()).await.unwrap();
    assert!(!ok.is_error);
    assert_eq!(ok.text_blocks().collect::<Vec<_>>(), vec!["called git_status"]);

    let failed = client.call_tool("fail", Map::new()).await.unwrap();
    assert!(failed.is_error);
  }

  #[tokio::test]
  async fn requests_fail_once_the_peer_is_gone() {
    let (client_io, server_io) = duplex(1024);
    drop(server_io);
    let (read, write) = tokio::io::split(client_io);
    let client = McpClient::from_streams("gone", read, write);

    let err = client
      .request("tools/list", json!({}))
      .await
      .expect_err("peer closed");
    assert!(matches!(err, McpError::Closed), "unexpected: {err:?}");
  }

  #[tokio::test]
  async fn shutdown_is_idempotent_and_rejects_new_requests() {
    let (client, _ping) = connect();
    client.shutdown().await;
    client.shutdown().await;
    let err = client.request("tools/list", json!({})).await.unwrap_err();
    assert!(matches!(err, McpError::Closed));
  }

  #[tokio::test]
  async fn spawn_reports_missing_program() {
    let command = ServerCommand {
      name: "missing".into(),
      program: "/definitely/not/a/real/binary".into(),
      args: Vec::new(),
      env: BTreeMap::new(),
      cwd: None,
    };
    let err = McpClient::spawn(
      &command,
      &Implementation::new("test", "0.0.0"),
      Duration::from_secs(1),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, McpError::Spawn { .. }), "unexpected: {err:?}");
  }
}
