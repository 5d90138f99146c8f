use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Protocol revision sent in the `initialize` request.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// JSON-RPC error code for methods the client does not serve.
pub const METHOD_NOT_FOUND: i64 = -32601;

/// Name/version pair exchanged during the handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Implementation {
  pub name: String,
  #[serde(default)]
  pub version: String,
}

impl Implementation {
  pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      version: version.into(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
  #[serde(default)]
  pub protocol_version: String,
  #[serde(default)]
  pub server_info: Option<Implementation>,
  #[serde(default)]
  pub capabilities: Value,
}

/// Behavioural hints a server may attach to a tool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolAnnotations {
  #[serde(default)]
  pub read_only_hint: Option<bool>,
  #[serde(default)]
  pub destructive_hint: Option<bool>,
}

/// One entry of a `tools/list` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
  pub name: String,
  #[serde(default)]
  pub description: Option<String>,
  #[serde(default)]
  pub input_schema: Value,
  #[serde(default)]
  pub annotations: Option<ToolAnnotations>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListToolsResult {
  #[serde(default)]
  pub tools: Vec<ToolDescriptor>,
  #[serde(default)]
  pub next_cursor: Option<String>,
}

/// A single block of a `tools/call` result. Only `text` blocks carry `text`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentBlock {
  #[serde(rename = "type")]
  pub kind: String,
  #[serde(default)]
  pub text: Option<String>,
}

impl ContentBlock {
  pub fn text(text: impl Into<String>) -> Self {
    Self {
      kind: "text".to_string(),
      text: Some(text.into()),
    }
  }

  pub fn is_text(&self) -> bool {
    self.kind == "text"
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResult {
  #[serde(default)]
  pub content: Vec<ContentBlock>,
  #[serde(default)]
  pub is_error: bool,
}

impl CallToolResult {
  /// Text blocks in order, skipping everything else.
  pub fn text_blocks(&self) -> impl Iterator<Item = &str> {
    self
      .content
      .iter()
      .filter(|block| block.is_text())
      .filter_map(|block| block.text.as_deref())
  }
}

/// Classification of one inbound line.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Inbound {
  Response {
    id: u64,
    outcome: Result<Value, RpcErrorObject>,
  },
  Request {
    id: Value,
    method: String,
  },
  Notification {
    method: String,
  },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcErrorObject {
  pub code: i64,
  pub message: String,
}

pub(crate) fn request_line(id: u64, method: &str, params: Value) -> String {
  serde_json::json!({
    "jsonrpc": "2.0",
    "id": id,
    "method": method,
    "params": params,
  })
  .to_string()
}

pub(crate) fn notification_line(method: &str, params: Option<Value>) -> String {
  let mut message = Map::new();
  message.insert("jsonrpc".to_string(), Value::from("2.0"));
  message.insert("method".to_string(), Value::from(method));
  if let Some(params) = params {
    message.insert("params".to_string(), params);
  }
  Value::Object(message).to_string()
}

pub(crate) fn result_line(id: &Value, result: Value) -> String {
  serde_json::json!({ "jsonrpc": "2.0", "id": id, "result": result }).to_string()
}

pub(crate) fn error_line(id: &Value, code: i64, message: &str) -> String {
  serde_json::json!({
    "jsonrpc": "2.0",
    "id": id,
    "error": { "code": code, "message": message },
  })
  .to_string()
}

/// Parse one line from the server. Returns `None` for lines that are not
/// JSON-RPC messages (servers sometimes print banners on stdout).
pub(crate) fn classify(line: &str) -> Option<Inbound> {
  let value: Value = serde_json::from_str(line).ok()?;
  let object = value.as_object()?;

  if let Some(method) = object.get("method").and_then(Value::as_str) {
    return Some(match object.get("id") {
      Some(id) if !id.is_null() => Inbound::Request {
        id: id.clone(),
        method: method.to_string(),
      },
      _ => Inbound::Notification {
        method: method.to_string(),
      },
    });
  }

  let id = match object.get("id")? {
    Value::Number(n) => n.as_u64()?,
    Value::String(s) => s.parse().ok()?,
    _ => return None,
  };

  let outcome = match object.get("error") {
    Some(error) => Err(RpcErrorObject {
      code: error.get("code").and_then(Value::as_i64).unwrap_or(-32000),
      message: error
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| error.to_string()),
    }),
    None => Ok(object.get("result").cloned().unwrap_or(Value::Null)),
  };
  Some(Inbound::Response { id, outcome })
}
