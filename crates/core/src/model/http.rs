use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use super::wire::{parse_completion, render_request};
use super::{ChatModel, ChatRequest, ModelError};
use crate::config::ModelConfig;
use crate::domain::message::ModelTurn;

const RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// Chat-completions client for OpenAI-compatible endpoints (Mistral, OpenAI, vLLM, ...).
pub struct HttpChatModel {
  http: reqwest::Client,
  settings: ModelConfig,
  api_key: String,
}

impl HttpChatModel {
  pub fn new(settings: ModelConfig, api_key: Option<&str>) -> Result<Self, ModelError> {
    let api_key = api_key
      .filter(|key| !key.is_empty())
      .ok_or(ModelError::MissingApiKey)?
      .to_string();
    let http = reqwest::Client::builder()
      .timeout(settings.timeout())
      .build()
      .map_err(|err| ModelError::Transport(err.to_string()))?;
    Ok(Self {
      http,
      settings,
      api_key,
    })
  }

  async fn send_once(&self, body: &Value) -> Result<ModelTurn, ModelError> {
    let timeout = self.settings.timeout();
    let send = self
      .http
      .post(&self.settings.endpoint)
      .bearer_auth(&self.api_key)
      .json(body)
      .send();
    let response = tokio::time::timeout(timeout, send)
      .await
      .map_err(|_| ModelError::TimedOut(timeout))?
      .map_err(|err| {
        if err.is_timeout() {
          ModelError::TimedOut(timeout)
        } else {
          ModelError::Transport(err.to_string())
        }
      })?;

    let status = response.status();
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      return Err(ModelError::Status {
        status: status.as_u16(),
        body: truncate(&body, 500),
      });
    }

    let payload: Value = response
      .json()
      .await
      .map_err(|err| ModelError::Decode(err.to_string()))?;
    parse_completion(&payload)
  }
}

#[async_trait]
impl ChatModel for HttpChatModel {
  async fn complete(&self, request: ChatRequest<'_>) -> Result<ModelTurn, ModelError> {
    let body = render_request(&self.settings, request);
    let mut attempt = 0;
    loop {
      match self.send_once(&body).await {
        Ok(turn) => {
          debug!(
            event = "model_completion",
            model = %self.settings.model,
            invocations = turn.invocations.len(),
            text_len = turn.text.len(),
          );
          return Ok(turn);
        }
        Err(err) if err.is_retryable() && attempt < self.settings.max_retries => {
          attempt += 1;
          warn!(
            event = "model_retry",
            attempt,
            error = %err,
            "retrying model request"
          );
          tokio::time::sleep(RETRY_BACKOFF * attempt).await;
        }
        Err(err) => return Err(err),
      }
    }
  }
}

fn truncate(text: &str, limit: usize) -> String {
  match text.char_indices().nth(limit) {
    Some((idx, _)) => format!("{}...", &text[..idx]),
    None => text.to_string(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn requires_an_api_key() {
    assert!(matches!(
      HttpChatModel::new(ModelConfig::default(), None),
      Err(ModelError::MissingApiKey)
    ));
    assert!(matches!(
      HttpChatModel::new(ModelConfig::default(), Some("")),
      Err(ModelError::MissingApiKey)
    ));
    assert!(HttpChatModel::new(ModelConfig::default(), Some("k")).is_ok());
  }

  #[tokio::test]
  async fn unreachable_endpoint_is_a_transport_error_after_retries() {
    let settings = ModelConfig {
      endpoint: "http://127.0.0.1:9/v1/chat/completions".to_string(),
      max_retries: 1,
      timeout_secs: 5,
      ..ModelConfig::default()
    };
    let model = HttpChatModel::new(settings, Some("k")).unwrap();
    let messages = vec![crate::domain::message::Message::Human("hi".into())];
    let err = model.complete(ChatRequest::plain(&messages)).await.unwrap_err();
    assert!(matches!(err, ModelError::Transport(_) | ModelError::TimedOut(_)));
  }

  #[test]
  fn truncates_long_error_bodies() {
    assert_eq!(truncate("abcdef", 3), "abc...");
    assert_eq!(truncate("abc", 3), "abc");
  }
}
