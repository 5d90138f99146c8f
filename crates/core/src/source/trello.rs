use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{debug, info};

use super::parse::{Shape, parse_tasks};
use super::{SourceError, TaskSource, non_empty};
use crate::capability::CapabilitySet;
use crate::config::TrelloConfig;
use crate::domain::task::{Task, TaskStatus};

const SHAPE: Shape = Shape {
  items: &["cards", "items"],
  groups: &["lists", "groups"],
  id: &["id"],
  title: &["name", "title"],
  description: &["desc", "description"],
  status: &["status"],
  group_label: &["name"],
};

/// Board access through a capability server's tools (read, comment, move).
pub struct TrelloSource {
  config: TrelloConfig,
  capabilities: CapabilitySet,
}

impl TrelloSource {
  pub fn new(config: TrelloConfig, capabilities: CapabilitySet) -> Self {
    Self {
      config,
      capabilities,
    }
  }

  async fn call(&self, capability: &str, arguments: Map<String, Value>) -> Result<String, SourceError> {
    let bound = self
      .capabilities
      .get(capability)
      .ok_or_else(|| SourceError::MissingCapability(capability.to_string()))?;
    Ok(bound.invoke(&arguments).await?)
  }

  fn list_for(&self, status: TaskStatus) -> Option<&str> {
    match status {
      TaskStatus::Open => Some(self.config.todo_list_id.as_str()),
      TaskStatus::InProgress => self.config.in_progress_list_id.as_deref(),
      TaskStatus::Review => self.config.review_list_id.as_deref(),
      TaskStatus::Done => self.config.done_list_id.as_deref(),
      TaskStatus::Failed => self.config.failed_list_id.as_deref(),
    }
  }
}

fn args(pairs: &[(&str, &str)]) -> Map<String, Value> {
  pairs
    .iter()
    .map(|(k, v)| (k.to_string(), Value::from(*v)))
    .collect()
}

#[async_trait]
impl TaskSource for TrelloSource {
  fn name(&self) -> &str {
    "trello"
  }

  async fn poll(&self) -> Result<Option<Value>, SourceError> {
    let text = self
      .call(
        &self.config.polling_tool,
        args(&[("boardId", self.config.todo_list_id.as_str())]),
      )
      .await?;
    let raw: Value = serde_json::from_str(&text)
      .map_err(|err| SourceError::Parse(format!("{}: {err}", self.config.polling_tool)))?;
    debug!(event = "trello_polled", bytes = text.len());
    Ok(non_empty(raw))
  }

  fn parse(&self, raw: &Value) -> Result<Vec<Task>, SourceError> {
    parse_tasks(raw, &SHAPE)
  }

  async fn comment(&self, task_id: &str, text: &str) -> Result<(), SourceError> {
    self
      .call(&self.config.comment_tool, args(&[("cardId", task_id), ("text", text)]))
      .await?;
    Ok(())
  }

  async fn transition(&self, task_id: &str, status: TaskStatus) -> Result<(), SourceError> {
    let Some(list_id) = self.list_for(status) else {
      info!(
        event = "transition_skipped",
        task_id,
        status = %status,
        "no list configured for status"
      );
      return Ok(());
    };
    self
      .call(&self.config.move_tool, args(&[("cardId", task_id), ("listId", list_id)]))
      .await?;
    info!(event = "task_moved", task_id, status = %status, list_id);
    Ok(())
  }
}
