use std::sync::Arc;

use tracing::{info, warn};

use super::prompts::ROUTER_SYSTEM;
use crate::domain::message::{Conversation, Message};
use crate::domain::role::Role;
use crate::model::{ChatModel, ChatRequest};

/// Fallback when the classification is missing, ambiguous or the model fails.
pub const DEFAULT_SPECIALIST: Role = Role::Coder;

/// Picks the specialist for a task from its opening request.
pub struct Router {
  model: Arc<dyn ChatModel>,
}

impl Router {
  pub fn new(model: Arc<dyn ChatModel>) -> Self {
    Self { model }
  }

  /// Never fails: any problem resolves to [`DEFAULT_SPECIALIST`].
  pub async fn classify(&self, conversation: &Conversation) -> Role {
    let request = conversation.opening_request().unwrap_or_default();
    let messages = [
      Message::System(ROUTER_SYSTEM.to_string()),
      Message::Human(request.to_string()),
    ];
    match self.model.complete(ChatRequest::plain(&messages)).await {
      Ok(turn) => match parse_classification(&turn.text) {
        Some(role) => {
          info!(event = "task_routed", role = %role);
          role
        }
        None => {
          warn!(
            event = "router_unrecognized",
            answer = %turn.text.chars().take(200).collect::<String>(),
            "falling back to default specialist"
          );
          DEFAULT_SPECIALIST
        }
      },
      Err(err) => {
        warn!(event = "router_model_error", error = %err, "falling back to default specialist");
        DEFAULT_SPECIALIST
      }
    }
  }
}

/// The answer names exactly one distinct specialist keyword, case-insensitively.
pub fn parse_classification(text: &str) -> Option<Role> {
  let mut found: Option<Role> = None;
  for word in text.split(|c: char| !c.is_ascii_alphanumeric()) {
    if let Some(role) = Role::specialist_from_keyword(word) {
      match found {
        Some(existing) if existing != role => return None,
        _ => found = Some(role),
      }
    }
  }
  found
}
