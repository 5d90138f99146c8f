//! Chat model abstraction used by the router and the specialists.

mod http;
mod wire;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::capability::Capability;
use crate::domain::message::{Message, ModelTurn};

pub use http::HttpChatModel;

/// Whether the model may answer in prose or must invoke a capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationMode {
  Auto,
  Mandatory,
}

/// One completion request. `capabilities` empty means plain chat.
#[derive(Debug, Clone, Copy)]
pub struct ChatRequest<'a> {
  pub messages: &'a [Message],
  pub capabilities: &'a [Capability],
  pub mode: InvocationMode,
}

impl<'a> ChatRequest<'a> {
  pub fn plain(messages: &'a [Message]) -> Self {
    Self {
      messages,
      capabilities: &[],
      mode: InvocationMode::Auto,
    }
  }
}

#[derive(Debug, Error)]
pub enum ModelError {
  #[error("no API key configured for the model endpoint")]
  MissingApiKey,
  #[error("model request failed: {0}")]
  Transport(String),
  #[error("model endpoint returned {status}: {body}")]
  Status { status: u16, body: String },
  #[error("model did not answer within {0:?}")]
  TimedOut(Duration),
  #[error("could not decode model response: {0}")]
  Decode(String),
}

impl ModelError {
  /// Transport errors, timeouts, 429 and 5xx are worth another attempt.
  pub fn is_retryable(&self) -> bool {
    match self {
      ModelError::Transport(_) | ModelError::TimedOut(_) => true,
      ModelError::Status { status, .. } => *status == 429 || *status >= 500,
      ModelError::MissingApiKey | ModelError::Decode(_) => false,
    }
  }
}

#[async_trait]
pub trait ChatModel: Send + Sync {
  async fn complete(&self, request: ChatRequest<'_>) -> Result<ModelTurn, ModelError>;
}
