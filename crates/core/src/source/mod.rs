//! Task sources: where work comes from and where results are written back.

pub mod parse;
pub mod task_app;
pub mod trello;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::capability::InvocationError;
use crate::domain::task::{Task, TaskStatus};

pub use task_app::TaskAppSource;
pub use trello::TrelloSource;

#[derive(Debug, Error)]
pub enum SourceError {
  #[error("task source capability `{0}` is not offered by the server")]
  MissingCapability(String),
  #[error(transparent)]
  Capability(#[from] InvocationError),
  #[error("task source request failed: {0}")]
  Http(String),
  #[error("task source rejected credentials: {0}")]
  Auth(String),
  #[error("task source payload: {0}")]
  Parse(String),
}

/// A backend holding tasks. Implementations must not retry write-backs.
#[async_trait]
pub trait TaskSource: Send + Sync {
  fn name(&self) -> &str;

  /// Fetch the raw list of candidate tasks; `None` when there is nothing to do.
  async fn poll(&self) -> Result<Option<Value>, SourceError>;

  /// Flatten a raw payload into tasks.
  fn parse(&self, raw: &Value) -> Result<Vec<Task>, SourceError>;

  async fn comment(&self, task_id: &str, text: &str) -> Result<(), SourceError>;

  async fn transition(&self, task_id: &str, status: TaskStatus) -> Result<(), SourceError>;
}

/// `None` for payloads that obviously hold no work.
pub(crate) fn non_empty(raw: Value) -> Option<Value> {
  match &raw {
    Value::Null => None,
    Value::Array(items) if items.is_empty() => None,
    Value::Object(object) if object.is_empty() => None,
    _ => Some(raw),
  }
}
