use std::collections::HashSet;

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// A model-requested invocation of a named capability.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Invocation {
  pub id: String,
  pub name: String,
  pub arguments: Map<String, Value>,
}

impl Invocation {
  pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Map<String, Value>) -> Self {
    Self {
      id: id.into(),
      name: name.into(),
      arguments,
    }
  }
}

/// One model reply: free text plus zero or more invocations with unique ids.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ModelTurn {
  pub text: String,
  pub invocations: Vec<Invocation>,
}

impl ModelTurn {
  /// Build a turn, replacing empty or repeated invocation ids with fresh ones.
  pub fn new(text: impl Into<String>, invocations: Vec<Invocation>) -> Self {
    let mut seen = HashSet::new();
    let invocations = invocations
      .into_iter()
      .map(|mut invocation| {
        if invocation.id.is_empty() || !seen.insert(invocation.id.clone()) {
          invocation.id = fresh_invocation_id();
          seen.insert(invocation.id.clone());
        }
        invocation
      })
      .collect();
    Self {
      text: text.into(),
      invocations,
    }
  }

  pub fn text(text: impl Into<String>) -> Self {
    Self::new(text, Vec::new())
  }

  pub fn has_text(&self) -> bool {
    !self.text.trim().is_empty()
  }

  /// No text and no invocations.
  pub fn is_degenerate(&self) -> bool {
    !self.has_text() && self.invocations.is_empty()
  }
}

pub fn fresh_invocation_id() -> String {
  format!("call_{}", uuid::Uuid::new_v4().simple())
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
  System(String),
  Human(String),
  ModelTurn(ModelTurn),
  ToolResult {
    invocation_id: String,
    name: String,
    text: String,
  },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConversationError {
  #[error("tool result `{0}` does not answer an invocation of the latest model turn")]
  UnmatchedToolResult(String),
  #[error("tool result `{0}` was already recorded")]
  DuplicateToolResult(String),
}

/// Append-only transcript of one agent run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Conversation {
  messages: Vec<Message>,
}

impl Conversation {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn messages(&self) -> &[Message] {
    &self.messages
  }

  pub fn len(&self) -> usize {
    self.messages.len()
  }

  pub fn is_empty(&self) -> bool {
    self.messages.is_empty()
  }

  pub fn push_human(&mut self, text: impl Into<String>) {
    self.messages.push(Message::Human(text.into()));
  }

  pub fn push_turn(&mut self, turn: ModelTurn) {
    self.messages.push(Message::ModelTurn(turn));
  }

  /// Record the result of one invocation. The id must belong to the latest
  /// model turn and nothing but tool results may follow that turn.
  pub fn push_tool_result(
    &mut self,
    invocation_id: impl Into<String>,
    name: impl Into<String>,
    text: impl Into<String>,
  ) -> Result<(), ConversationError> {
    let invocation_id = invocation_id.into();
    let mut answered = HashSet::new();
    let mut owner = None;
    for message in self.messages.iter().rev() {
      match message {
        Message::ToolResult { invocation_id, .. } => {
          answered.insert(invocation_id.as_str());
        }
        Message::ModelTurn(turn) => {
          owner = Some(turn);
          break;
        }
        _ => break,
      }
    }

    let Some(turn) = owner else {
      return Err(ConversationError::UnmatchedToolResult(invocation_id));
    };
    if !turn.invocations.iter().any(|inv| inv.id == invocation_id) {
      return Err(ConversationError::UnmatchedToolResult(invocation_id));
    }
    if answered.contains(invocation_id.as_str()) {
      return Err(ConversationError::DuplicateToolResult(invocation_id));
    }

    self.messages.push(Message::ToolResult {
      invocation_id,
      name: name.into(),
      text: text.into(),
    });
    Ok(())
  }

  /// The most recent model turn, wherever it sits.
  pub fn last_turn(&self) -> Option<&ModelTurn> {
    self.messages.iter().rev().find_map(|message| match message {
      Message::ModelTurn(turn) => Some(turn),
      _ => None,
    })
  }

  /// First human message, i.e. the task prompt.
  pub fn opening_request(&self) -> Option<&str> {
    self.messages.iter().find_map(|message| match message {
      Message::Human(text) => Some(text.as_str()),
      _ => None,
    })
  }

  /// Serializable form used for transcripts.
  pub fn to_wire(&self) -> Vec<WireMessage> {
    self.messages.iter().map(WireMessage::from).collect()
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WireInvocation {
  pub id: String,
  pub name: String,
  pub args: Map<String, Value>,
}

/// `{role, content, invocations: [{id, name, args}]}`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WireMessage {
  pub role: &'static str,
  pub content: String,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub invocations: Vec<WireInvocation>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub invocation_id: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
}

impl From<&Message> for WireMessage {
  fn from(message: &Message) -> Self {
    let plain = |role, content: &str| WireMessage {
      role,
      content: content.to_string(),
      invocations: Vec::new(),
      invocation_id: None,
      name: None,
    };
    match message {
      Message::System(text) => plain("system", text),
      Message::Human(text) => plain("human", text),
      Message::ModelTurn(turn) => WireMessage {
        invocations: turn
          .invocations
          .iter()
          .map(|inv| WireInvocation {
            id: inv.id.clone(),
            name: inv.name.clone(),
            args: inv.arguments.clone(),
          })
          .collect(),
        ..plain("model", &turn.text)
      },
      Message::ToolResult {
        invocation_id,
        name,
        text,
      } => WireMessage {
        invocation_id: Some(invocation_id.clone()),
        name: Some(name.clone()),
        ..plain("tool", text)
      },
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn call(id: &str, name: &str) -> Invocation {
    Invocation::new(id, name, Map::new())
  }

  #[test]
  fn duplicate_and_empty_ids_are_replaced() {
    let turn = ModelTurn::new("", vec![call("a", "x"), call("a", "y"), call("", "z")]);
    let ids: Vec<&str> = turn.invocations.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(ids[0], "a");
    assert_ne!(ids[1], "a");
    assert!(ids[2].starts_with("call_"));
    let unique: HashSet<&str> = ids.iter().copied().collect();
    assert_eq!(unique.len(), 3);
  }

  #[test]
  fn degenerate_means_blank_text_and_no_invocations() {
    assert!(ModelTurn::text("  \n").is_degenerate());
    assert!(!ModelTurn::text("hi").is_degenerate());
    assert!(!ModelTurn::new("", vec![call("1", "x")]).is_degenerate());
  }

  #[test]
  fn tool_results_must_match_latest_turn() {
    let mut conv = Conversation::new();
    conv.push_human("Task: t");
    assert_eq!(
      conv.push_tool_result("1", "x", "out"),
      Err(ConversationError::UnmatchedToolResult("1".into()))
    );

    conv.push_turn(ModelTurn::new("", vec![call("1", "x"), call("2", "y")]));
    conv.push_tool_result("1", "x", "out").unwrap();
    assert_eq!(
      conv.push_tool_result("1", "x", "again"),
      Err(ConversationError::DuplicateToolResult("1".into()))
    );
    assert_eq!(
      conv.push_tool_result("9", "z", "out"),
      Err(ConversationError::UnmatchedToolResult("9".into()))
    );
    conv.push_tool_result("2", "y", "out").unwrap();

    conv.push_human("act now");
    assert!(conv.push_tool_result("2", "y", "late").is_err());
    assert_eq!(conv.len(), 5);
  }

  #[test]
  fn wire_shape_carries_invocations() {
    let mut conv = Conversation::new();
    conv.push_human("Task: t");
    let mut args = Map::new();
    args.insert("path".into(), json!("a.txt"));
    conv.push_turn(ModelTurn::new("reading", vec![Invocation::new("c1", "read_file", args)]));
    conv.push_tool_result("c1", "read_file", "hello").unwrap();

    let wire = serde_json::to_value(conv.to_wire()).unwrap();
    assert_eq!(wire[0], json!({"role": "human", "content": "Task: t"}));
    assert_eq!(
      wire[1],
      json!({
        "role": "model",
        "content": "reading",
        "invocations": [{"id": "c1", "name": "read_file", "args": {"path": "a.txt"}}]
      })
    );
    assert_eq!(wire[2]["role"], "tool");
    assert_eq!(wire[2]["invocation_id"], "c1");
    assert_eq!(conv.opening_request(), Some("Task: t"));
    assert_eq!(conv.last_turn().map(|t| t.text.as_str()), Some("reading"));
  }
}
