use tracing::info;

use super::prompts::CORRECTION_DIRECTIVE;
use crate::domain::message::Conversation;
use crate::domain::role::Role;

/// Push the specialist back to action after a text-only or empty turn.
pub fn apply(conversation: &mut Conversation, origin: Role) {
  info!(event = "correction_applied", role = %origin);
  conversation.push_human(CORRECTION_DIRECTIVE);
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::message::{Message, ModelTurn};

  #[test]
  fn appends_exactly_one_directive() {
    let mut conv = Conversation::new();
    conv.push_human("Task: t");
    conv.push_turn(ModelTurn::text("I will now think about it."));
    apply(&mut conv, Role::Coder);
    assert_eq!(conv.len(), 3);
    assert_eq!(conv.messages()[2], Message::Human(CORRECTION_DIRECTIVE.to_string()));
  }
}
