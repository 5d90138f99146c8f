use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{error, info, warn};

use super::prompts::{forcing_directive, specialist_system};
use super::sanitize::sanitize_turn;
use crate::capability::CapabilitySet;
use crate::domain::capability::{Capability, FINISH_TASK};
use crate::domain::message::{Conversation, Invocation, Message, ModelTurn};
use crate::domain::role::Role;
use crate::model::{ChatModel, ChatRequest, InvocationMode};

/// Model calls per turn before giving up.
pub const MAX_ATTEMPTS: usize = 3;
pub const EMERGENCY_INVOCATION_ID: &str = "call_emergency";
pub const STUCK_SUMMARY: &str = "Agent stuck: no actionable answer after 3 attempts.";

/// A role-specific model caller with its own prompt and capability scope.
pub struct Specialist {
  role: Role,
  model: Arc<dyn ChatModel>,
  capabilities: CapabilitySet,
  offered: Vec<Capability>,
  system_prompt: String,
}

impl Specialist {
  /// ANALYST is restricted to read-only capabilities.
  pub fn new(
    role: Role,
    model: Arc<dyn ChatModel>,
    available: &CapabilitySet,
    repo_url: Option<&str>,
  ) -> Self {
    let capabilities = if role == Role::Analyst {
      available.read_only()
    } else {
      available.clone()
    };
    let offered = capabilities.capabilities().cloned().collect();
    Self {
      role,
      model,
      capabilities,
      offered,
      system_prompt: specialist_system(role, repo_url),
    }
  }

  pub fn role(&self) -> Role {
    self.role
  }

  pub fn capabilities(&self) -> &CapabilitySet {
    &self.capabilities
  }

  /// Produce one actionable turn. The returned turn is sanitized; forcing
  /// directives stay local to this call and never reach the conversation.
  pub async fn take_turn(&self, conversation: &Conversation) -> ModelTurn {
    let mut messages = Vec::with_capacity(conversation.len() + MAX_ATTEMPTS);
    messages.push(Message::System(self.system_prompt.clone()));
    messages.extend(conversation.messages().iter().cloned());

    for attempt in 1..=MAX_ATTEMPTS {
      let mode = if attempt == MAX_ATTEMPTS {
        InvocationMode::Mandatory
      } else {
        InvocationMode::Auto
      };
      let request = ChatRequest {
        messages: &messages,
        capabilities: &self.offered,
        mode,
      };
      match self.model.complete(request).await {
        Ok(turn) if !turn.is_degenerate() => {
          info!(
            event = "specialist_turn",
            role = %self.role,
            attempt,
            invocations = turn.invocations.len(),
            has_text = turn.has_text(),
          );
          return sanitize_turn(turn);
        }
        Ok(_) => warn!(event = "specialist_empty_turn", role = %self.role, attempt),
        Err(err) => warn!(event = "specialist_model_error", role = %self.role, attempt, error = %err),
      }
      if attempt < MAX_ATTEMPTS {
        messages.push(Message::Human(forcing_directive(self.role)));
      }
    }

    error!(event = "specialist_stuck", role = %self.role, "no actionable turn, finishing");
    stuck_turn()
  }
}

/// Synthesized terminal turn used when the model never produces anything actionable.
pub fn stuck_turn() -> ModelTurn {
  let mut arguments = Map::new();
  arguments.insert("summary".to_string(), Value::from(STUCK_SUMMARY));
  ModelTurn::new(
    "Stuck.",
    vec![Invocation::new(EMERGENCY_INVOCATION_ID, FINISH_TASK, arguments)],
  )
}
