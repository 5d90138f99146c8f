#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use autopilot_core::capability::{
  BoundCapability, CapabilityHandler, CapabilitySet, InvocationError,
};
use autopilot_core::domain::capability::{ArgKind, Capability, Effect, FINISH_TASK};
use autopilot_core::domain::message::{Invocation, Message, ModelTurn};
use autopilot_core::model::{ChatModel, ChatRequest, InvocationMode, ModelError};
use mcp::{CallToolResult, ContentBlock};
use serde_json::{Map, Value, json};

pub const READ_NOTES: &str = "read_notes";
pub const WRITE_NOTES: &str = "write_notes";

/// One scripted answer of the fake model.
pub enum Reply {
  Turn(ModelTurn),
  Fail,
}

#[derive(Debug, Clone)]
pub struct RecordedCall {
  pub mode: InvocationMode,
  pub offered: Vec<String>,
  pub messages: Vec<Message>,
}

impl RecordedCall {
  /// Router calls offer no capabilities.
  pub fn is_router(&self) -> bool {
    self.offered.is_empty()
  }
}

/// Chat model answering from a script, then repeating `fallback` forever.
pub struct ScriptedModel {
  replies: Mutex<VecDeque<Reply>>,
  fallback: ModelTurn,
  calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedModel {
  pub fn new(replies: Vec<Reply>) -> Arc<Self> {
    Self::with_fallback(replies, finish("fallback finish"))
  }

  pub fn with_fallback(replies: Vec<Reply>, fallback: ModelTurn) -> Arc<Self> {
    Arc::new(Self {
      replies: Mutex::new(replies.into()),
      fallback,
      calls: Mutex::new(Vec::new()),
    })
  }

  pub fn calls(&self) -> Vec<RecordedCall> {
    self.calls.lock().unwrap().clone()
  }

  pub fn specialist_calls(&self) -> Vec<RecordedCall> {
    self.calls().into_iter().filter(|c| !c.is_router()).collect()
  }
}

#[async_trait]
impl ChatModel for ScriptedModel {
  async fn complete(&self, request: ChatRequest<'_>) -> Result<ModelTurn, ModelError> {
    self.calls.lock().unwrap().push(RecordedCall {
      mode: request.mode,
      offered: request.capabilities.iter().map(|c| c.name.clone()).collect(),
      messages: request.messages.to_vec(),
    });
    match self.replies.lock().unwrap().pop_front() {
      Some(Reply::Turn(turn)) => Ok(turn),
      Some(Reply::Fail) => Err(ModelError::Status {
        status: 503,
        body: "overloaded".to_string(),
      }),
      None => Ok(self.fallback.clone()),
    }
  }
}

/// Handler that records every call and answers `ok <name>`.
#[derive(Default)]
pub struct RecordingHandler {
  calls: Mutex<Vec<(String, Map<String, Value>)>>,
}

impl RecordingHandler {
  pub fn calls(&self) -> Vec<(String, Map<String, Value>)> {
    self.calls.lock().unwrap().clone()
  }

  pub fn names(&self) -> Vec<String> {
    self.calls().into_iter().map(|(name, _)| name).collect()
  }
}

#[async_trait]
impl CapabilityHandler for RecordingHandler {
  async fn call(
    &self,
    capability: &str,
    arguments: Map<String, Value>,
  ) -> Result<CallToolResult, InvocationError> {
    self
      .calls
      .lock()
      .unwrap()
      .push((capability.to_string(), arguments));
    Ok(CallToolResult {
      content: vec![ContentBlock::text(format!("ok {capability}"))],
      is_error: false,
    })
  }
}

/// `finish_task`, a read-only `read_notes(path)` and a mutating
/// `write_notes(path, content)`, all answered by `handler`.
pub fn capabilities(handler: &Arc<RecordingHandler>) -> CapabilitySet {
  let catalog = vec![
    Capability::new(FINISH_TASK, "Finish the task.", Effect::ReadOnly).param(
      "summary",
      ArgKind::String,
      true,
      "What was done.",
    ),
    Capability::new(READ_NOTES, "Read notes.", Effect::ReadOnly).param(
      "path",
      ArgKind::String,
      true,
      "Note path.",
    ),
    Capability::new(WRITE_NOTES, "Write notes.", Effect::Mutating)
      .param("path", ArgKind::String, true, "Note path.")
      .param("content", ArgKind::String, true, "New content."),
  ];
  let mut set = CapabilitySet::new();
  for capability in catalog {
    set.insert(BoundCapability::new(
      capability,
      Arc::clone(handler) as Arc<dyn CapabilityHandler>,
      Duration::from_secs(5),
    ));
  }
  set
}

pub fn call(id: &str, name: &str, arguments: Value) -> Invocation {
  let arguments = match arguments {
    Value::Object(map) => map,
    _ => Map::new(),
  };
  Invocation::new(id, name, arguments)
}

pub fn invoking(invocations: Vec<Invocation>) -> ModelTurn {
  ModelTurn::new("", invocations)
}

pub fn finish(summary: &str) -> ModelTurn {
  invoking(vec![call("call_finish", FINISH_TASK, json!({ "summary": summary }))])
}

pub fn text(text: &str) -> Reply {
  Reply::Turn(ModelTurn::text(text))
}

pub fn turn(turn: ModelTurn) -> Reply {
  Reply::Turn(turn)
}

/// Tool results in conversation order as `(invocation id, text)`.
pub fn tool_results(messages: &[Message]) -> Vec<(String, String)> {
  messages
    .iter()
    .filter_map(|message| match message {
      Message::ToolResult {
        invocation_id,
        text,
        ..
      } => Some((invocation_id.clone(), text.clone())),
      _ => None,
    })
    .collect()
}
