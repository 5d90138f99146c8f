use tracing::{info, warn};

use crate::capability::{CapabilitySet, InvocationError};
use crate::domain::message::{Conversation, ConversationError};

/// Execute every invocation of the latest model turn, in order, against the
/// originating specialist's capabilities. Exactly one result is appended per
/// invocation; failures become `ERROR: ...` text. Returns the number executed.
pub async fn execute_pending(
  conversation: &mut Conversation,
  capabilities: &CapabilitySet,
) -> Result<usize, ConversationError> {
  let invocations = conversation
    .last_turn()
    .map(|turn| turn.invocations.clone())
    .unwrap_or_default();

  for invocation in &invocations {
    let outcome = match capabilities.get(&invocation.name) {
      Some(bound) => bound.invoke(&invocation.arguments).await,
      None => Err(InvocationError::UnknownCapability(invocation.name.clone())),
    };
    let text = match outcome {
      Ok(text) => {
        info!(
          event = "capability_invoked",
          capability = %invocation.name,
          invocation_id = %invocation.id,
          output_len = text.len(),
        );
        text
      }
      Err(err) => {
        warn!(
          event = "capability_failed",
          capability = %invocation.name,
          invocation_id = %invocation.id,
          error = %err,
        );
        err.to_model_text()
      }
    };
    conversation.push_tool_result(&invocation.id, &invocation.name, text)?;
  }
  Ok(invocations.len())
}
