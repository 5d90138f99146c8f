use serde_json::Value;

use crate::domain::capability::FINISH_TASK;
use crate::domain::message::{Conversation, Message};

pub const NO_SUMMARY: &str = "Agent finished without a summary.";
pub const DEFAULT_FINISH_SUMMARY: &str = "Task completed.";
pub const TRUNCATION_MARKER: &str = "\n\n[... summary truncated]";

/// Summary of the most recent terminal invocation, if any.
pub fn terminal_summary(conversation: &Conversation) -> Option<String> {
  conversation.messages().iter().rev().find_map(|message| match message {
    Message::ModelTurn(turn) => turn
      .invocations
      .iter()
      .rev()
      .find(|inv| inv.name == FINISH_TASK)
      .map(|inv| match inv.arguments.get("summary") {
        Some(Value::String(text)) if !text.trim().is_empty() => text.clone(),
        _ => DEFAULT_FINISH_SUMMARY.to_string(),
      }),
    _ => None,
  })
}

/// Terminal summary, else the text of a final text-only turn, else the sentinel.
pub fn extract_summary(conversation: &Conversation) -> String {
  if let Some(summary) = terminal_summary(conversation) {
    return summary;
  }
  match conversation.messages().last() {
    Some(Message::ModelTurn(turn)) if turn.has_text() && turn.invocations.is_empty() => {
      turn.text.clone()
    }
    _ => NO_SUMMARY.to_string(),
  }
}

/// Cut to `limit` characters and append [`TRUNCATION_MARKER`] when shortened.
pub fn truncate_summary(text: &str, limit: usize) -> String {
  match text.char_indices().nth(limit) {
    Some((idx, _)) => format!("{}{}", &text[..idx], TRUNCATION_MARKER),
    None => text.to_string(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::message::{Invocation, ModelTurn};
  use serde_json::{Map, json};

  fn finish(summary: Option<&str>) -> ModelTurn {
    let mut args = Map::new();
    if let Some(s) = summary {
      args.insert("summary".into(), json!(s));
    }
    ModelTurn::new("", vec![Invocation::new("f", FINISH_TASK, args)])
  }

  #[test]
  fn finds_latest_terminal_summary() {
    let mut conv = Conversation::new();
    conv.push_human("Task: t");
    conv.push_turn(finish(Some("first")));
    conv.push_turn(finish(Some("second")));
    assert_eq!(extract_summary(&conv), "second");
  }

  #[test]
  fn missing_summary_argument_uses_default() {
    let mut conv = Conversation::new();
    conv.push_turn(finish(None));
    assert_eq!(extract_summary(&conv), DEFAULT_FINISH_SUMMARY);
  }

  #[test]
  fn falls_back_to_text_answer_then_sentinel() {
    let mut conv = Conversation::new();
    conv.push_human("Task: explain");
    assert_eq!(extract_summary(&conv), NO_SUMMARY);
    conv.push_turn(ModelTurn::text("It parses TOML."));
    assert_eq!(extract_summary(&conv), "It parses TOML.");
  }

  #[test]
  fn truncation_is_char_based() {
    let long = "é".repeat(4500);
    let cut = truncate_summary(&long, 4000);
    assert!(cut.ends_with(TRUNCATION_MARKER));
    assert_eq!(cut.chars().count(), 4000 + TRUNCATION_MARKER.chars().count());
    assert_eq!(truncate_summary("short", 4000), "short");
    assert_eq!(truncate_summary(&"a".repeat(4000), 4000), "a".repeat(4000));
  }
}
