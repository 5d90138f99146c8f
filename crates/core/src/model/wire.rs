use serde_json::{Map, Value, json};

use super::{ChatRequest, InvocationMode, ModelError};
use crate::config::ModelConfig;
use crate::domain::message::{Invocation, Message, ModelTurn};

/// Render an OpenAI-style chat-completions request body.
pub(super) fn render_request(settings: &ModelConfig, request: ChatRequest<'_>) -> Value {
  let messages: Vec<Value> = request.messages.iter().map(render_message).collect();
  let mut body = json!({
    "model": settings.model,
    "messages": messages,
    "temperature": settings.temperature,
    "max_tokens": settings.max_tokens,
  });

  if !request.capabilities.is_empty()
    && let Some(object) = body.as_object_mut()
  {
    let tools: Vec<Value> = request
      .capabilities
      .iter()
      .map(|capability| {
        json!({
          "type": "function",
          "function": {
            "name": capability.name,
            "description": capability.description,
            "parameters": capability.input_schema(),
          }
        })
      })
      .collect();
    let choice = match request.mode {
      InvocationMode::Auto => "auto".to_string(),
      InvocationMode::Mandatory => settings.mandatory_tool_choice.clone(),
    };
    object.insert("tools".to_string(), Value::from(tools));
    object.insert("tool_choice".to_string(), Value::from(choice));
  }
  body
}

fn render_message(message: &Message) -> Value {
  match message {
    Message::System(text) => json!({ "role": "system", "content": text }),
    Message::Human(text) => json!({ "role": "user", "content": text }),
    Message::ModelTurn(turn) => {
      let mut rendered = json!({ "role": "assistant", "content": turn.text });
      if !turn.invocations.is_empty()
        && let Some(object) = rendered.as_object_mut()
      {
        let calls: Vec<Value> = turn
          .invocations
          .iter()
          .map(|inv| {
            json!({
              "id": inv.id,
              "type": "function",
              "function": {
                "name": inv.name,
                "arguments": Value::Object(inv.arguments.clone()).to_string(),
              }
            })
          })
          .collect();
        object.insert("tool_calls".to_string(), Value::from(calls));
      }
      rendered
    }
    Message::ToolResult {
      invocation_id,
      name,
      text,
    } => json!({
      "role": "tool",
      "tool_call_id": invocation_id,
      "name": name,
      "content": text,
    }),
  }
}

/// Read `choices[0].message` into a turn.
pub(super) fn parse_completion(body: &Value) -> Result<ModelTurn, ModelError> {
  let message = body
    .get("choices")
    .and_then(|choices| choices.get(0))
    .and_then(|choice| choice.get("message"))
    .ok_or_else(|| ModelError::Decode("response has no choices[0].message".to_string()))?;

  let text = match message.get("content") {
    Some(Value::String(text)) => text.clone(),
    // Some providers return content as a list of typed chunks.
    Some(Value::Array(chunks)) => chunks
      .iter()
      .filter_map(|chunk| chunk.get("text").and_then(Value::as_str))
      .collect::<Vec<_>>()
      .join(""),
    _ => String::new(),
  };

  let invocations = message
    .get("tool_calls")
    .and_then(Value::as_array)
    .map(|calls| calls.iter().filter_map(parse_tool_call).collect())
    .unwrap_or_default();

  Ok(ModelTurn::new(text, invocations))
}

fn parse_tool_call(call: &Value) -> Option<Invocation> {
  let function = call.get("function")?;
  let name = function.get("name").and_then(Value::as_str)?.to_string();
  let id = call
    .get("id")
    .and_then(Value::as_str)
    .unwrap_or_default()
    .to_string();
  let arguments = match function.get("arguments") {
    Some(Value::Object(map)) => map.clone(),
    Some(Value::String(raw)) if raw.trim().is_empty() => Map::new(),
    Some(Value::String(raw)) => match serde_json::from_str::<Value>(raw) {
      Ok(Value::Object(map)) => map,
      _ => raw_arguments(raw),
    },
    Some(other) if !other.is_null() => raw_arguments(&other.to_string()),
    _ => Map::new(),
  };
  Some(Invocation::new(id, name, arguments))
}

// Unparseable arguments are kept verbatim so validation reports them to the model.
fn raw_arguments(raw: &str) -> Map<String, Value> {
  let mut map = Map::new();
  map.insert("raw_arguments".to_string(), Value::from(raw));
  map
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::capability::{ArgKind, Capability, Effect};

  fn settings() -> ModelConfig {
    ModelConfig::default()
  }

  #[test]
  fn renders_messages_and_tools() {
    let mut args = Map::new();
    args.insert("path".into(), json!("a.rs"));
    let messages = vec![
      Message::System("sys".into()),
      Message::Human("Task: x".into()),
      Message::ModelTurn(ModelTurn::new("", vec![Invocation::new("c1", "read_file", args)])),
      Message::ToolResult {
        invocation_id: "c1".into(),
        name: "read_file".into(),
        text: "content".into(),
      },
    ];
    let caps = vec![
      Capability::new("read_file", "Read", Effect::ReadOnly).param("path", ArgKind::String, true, ""),
    ];
    let body = render_request(
      &settings(),
      ChatRequest {
        messages: &messages,
        capabilities: &caps,
        mode: InvocationMode::Mandatory,
      },
    );

    assert_eq!(body["model"], "mistral-small-latest");
    assert_eq!(body["messages"][0], json!({"role": "system", "content": "sys"}));
    assert_eq!(body["messages"][1]["role"], "user");
    let call = &body["messages"][2]["tool_calls"][0];
    assert_eq!(call["id"], "c1");
    assert_eq!(call["function"]["arguments"], "{\"path\":\"a.rs\"}");
    assert_eq!(body["messages"][3]["tool_call_id"], "c1");
    assert_eq!(body["tools"][0]["function"]["name"], "read_file");
    assert_eq!(body["tools"][0]["function"]["parameters"]["required"], json!(["path"]));
    assert_eq!(body["tool_choice"], "any");
  }

  #[test]
  fn plain_requests_carry_no_tools() {
    let messages = vec![Message::Human("hi".into())];
    let body = render_request(&settings(), ChatRequest::plain(&messages));
    assert!(body.get("tools").is_none());
    assert!(body.get("tool_choice").is_none());
  }

  #[test]
  fn auto_mode_uses_auto_choice() {
    let messages = vec![Message::Human("hi".into())];
    let caps = vec![Capability::new("x", "", Effect::ReadOnly)];
    let body = render_request(
      &settings(),
      ChatRequest {
        messages: &messages,
        capabilities: &caps,
        mode: InvocationMode::Auto,
      },
    );
    assert_eq!(body["tool_choice"], "auto");
  }

  #[test]
  fn parses_text_and_tool_calls() {
    let body = json!({
      "choices": [{
        "message": {
          "content": "working",
          "tool_calls": [
            {"id": "a", "function": {"name": "read_file", "arguments": "{\"path\":\"x\"}"}},
            {"id": "b", "function": {"name": "write_to_file", "arguments": "{not json"}},
            {"id": "c", "function": {"name": "git_status", "arguments": {"repo_path": "."}}},
            {"id": "d", "function": {"name": "git_log", "arguments": ""}}
          ]
        }
      }]
    });
    let turn = parse_completion(&body).unwrap();
    assert_eq!(turn.text, "working");
    assert_eq!(turn.invocations.len(), 4);
    assert_eq!(turn.invocations[0].arguments["path"], "x");
    assert_eq!(turn.invocations[1].arguments["raw_arguments"], "{not json");
    assert_eq!(turn.invocations[2].arguments["repo_path"], ".");
    assert!(turn.invocations[3].arguments.is_empty());
  }

  #[test]
  fn parses_chunked_and_null_content() {
    let chunked = json!({"choices": [{"message": {"content": [
      {"type": "text", "text": "ANA"}, {"type": "text", "text": "LYST"}
    ]}}]});
    assert_eq!(parse_completion(&chunked).unwrap().text, "ANALYST");

    let null = json!({"choices": [{"message": {"content": null}}]});
    assert!(parse_completion(&null).unwrap().is_degenerate());

    assert!(matches!(
      parse_completion(&json!({"error": "x"})),
      Err(ModelError::Decode(_))
    ));
  }
}
