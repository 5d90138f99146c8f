use mcp::ToolDescriptor;

use crate::domain::capability::Effect;

/// Name fragments that mark a capability as mutating when the server gives no hint.
pub const DEFAULT_MUTATING_MARKERS: &[&str] = &[
  "write", "commit", "push", "add", "create", "delete", "remove", "reset", "checkout", "branch",
  "move", "update", "merge", "tag", "init",
];

/// Decides whether a discovered capability is read-only or mutating.
#[derive(Debug, Clone)]
pub struct EffectClassifier {
  markers: Vec<String>,
}

impl Default for EffectClassifier {
  fn default() -> Self {
    Self::new(DEFAULT_MUTATING_MARKERS.iter().map(|m| m.to_string()))
  }
}

impl EffectClassifier {
  pub fn new(markers: impl IntoIterator<Item = String>) -> Self {
    Self {
      markers: markers.into_iter().map(|m| m.to_ascii_lowercase()).collect(),
    }
  }

  /// Server annotations win; otherwise fall back to name markers.
  pub fn classify(&self, tool: &ToolDescriptor) -> Effect {
    if let Some(annotations) = &tool.annotations {
      if annotations.destructive_hint == Some(true) {
        return Effect::Mutating;
      }
      match annotations.read_only_hint {
        Some(true) => return Effect::ReadOnly,
        Some(false) => return Effect::Mutating,
        None => {}
      }
    }
    self.classify_name(&tool.name)
  }

  pub fn classify_name(&self, name: &str) -> Effect {
    let name = name.to_ascii_lowercase();
    let mutating = word_prefixes(&name).any(|prefix| self.markers.iter().any(|m| m == prefix));
    if mutating { Effect::Mutating } else { Effect::ReadOnly }
  }
}

// camelCase boundaries are gone after lower-casing, so every prefix of each
// alphanumeric run is a candidate ("addcommenttocard" -> "add").
fn word_prefixes(name: &str) -> impl Iterator<Item = &str> {
  name
    .split(|c: char| !c.is_ascii_alphanumeric())
    .filter(|word| !word.is_empty())
    .flat_map(|word| (1..=word.len()).map(move |end| &word[..end]))
}
