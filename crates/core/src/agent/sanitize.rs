use std::sync::OnceLock;

use regex::Regex;
use tracing::warn;

use crate::domain::message::ModelTurn;

pub const MAX_NAME_LEN: usize = 64;

static NAME_RE: OnceLock<Regex> = OnceLock::new();

/// Names the model may legally invoke: `[A-Za-z0-9_-]`, at most 64 characters.
pub fn is_valid_invocation_name(name: &str) -> bool {
  let re = NAME_RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("valid regex"));
  name.len() <= MAX_NAME_LEN && re.is_match(name)
}

/// Drop invocations with malformed names. Text and valid invocations are kept in order.
pub fn sanitize_turn(mut turn: ModelTurn) -> ModelTurn {
  let before = turn.invocations.len();
  turn.invocations.retain(|invocation| {
    let valid = is_valid_invocation_name(&invocation.name);
    if !valid {
      warn!(
        event = "invocation_dropped",
        name = %invocation.name.chars().take(80).collect::<String>(),
        "malformed capability name"
      );
    }
    valid
  });
  if turn.invocations.len() != before {
    warn!(
      event = "turn_sanitized",
      dropped = before - turn.invocations.len(),
      kept = turn.invocations.len()
    );
  }
  turn
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::message::Invocation;
  use proptest::prelude::*;
  use serde_json::Map;

  fn turn(names: &[&str]) -> ModelTurn {
    ModelTurn::new(
      "text",
      names
        .iter()
        .enumerate()
        .map(|(i, n)| Invocation::new(format!("c{i}"), *n, Map::new()))
        .collect(),
    )
  }

  #[test]
  fn keeps_valid_names_in_order() {
    let clean = sanitize_turn(turn(&["read_file", "bad name!", "git-push", "<|call|>"]));
    let names: Vec<&str> = clean.invocations.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names, vec!["read_file", "git-push"]);
    assert_eq!(clean.text, "text");
    assert_eq!(clean.invocations[1].id, "c2");
  }

  #[test]
  fn length_limit_is_inclusive() {
    assert!(is_valid_invocation_name(&"a".repeat(64)));
    assert!(!is_valid_invocation_name(&"a".repeat(65)));
    assert!(!is_valid_invocation_name(""));
  }

  proptest! {
    #[test]
    fn sanitized_names_always_match_the_pattern(names in proptest::collection::vec(".{0,80}", 0..6)) {
      let refs: Vec<&str> = names.iter().map(String::as_str).collect();
      let clean = sanitize_turn(turn(&refs));
      for inv in &clean.invocations {
        prop_assert!(inv.name.len() <= MAX_NAME_LEN);
        prop_assert!(inv.name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-'));
      }
      let expected = names.iter().filter(|n| is_valid_invocation_name(n)).count();
      prop_assert_eq!(clean.invocations.len(), expected);
    }
  }
}
