use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle of a task as seen by the board it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
  #[default]
  Open,
  InProgress,
  Review,
  Done,
  Failed,
}

impl TaskStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      TaskStatus::Open => "open",
      TaskStatus::InProgress => "in_progress",
      TaskStatus::Review => "review",
      TaskStatus::Done => "done",
      TaskStatus::Failed => "failed",
    }
  }

  /// Map a board label ("To Do", "in-progress", "DONE", ...) onto a status.
  /// Unknown labels count as open work.
  pub fn from_label(label: &str) -> TaskStatus {
    let normalized: String = label
      .trim()
      .to_ascii_lowercase()
      .chars()
      .filter(|c| c.is_ascii_alphanumeric())
      .collect();
    match normalized.as_str() {
      "inprogress" | "doing" | "wip" | "started" => TaskStatus::InProgress,
      "review" | "inreview" | "toreview" => TaskStatus::Review,
      "done" | "closed" | "completed" | "complete" => TaskStatus::Done,
      "failed" | "error" | "blocked" => TaskStatus::Failed,
      _ => TaskStatus::Open,
    }
  }
}

impl fmt::Display for TaskStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A unit of work pulled from a task source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
  pub id: String,
  pub title: String,
  #[serde(default)]
  pub description: String,
  #[serde(default)]
  pub status: TaskStatus,
}

impl Task {
  pub fn new(id: impl Into<String>, title: impl Into<String>, description: impl Into<String>) -> Self {
    Self {
      id: id.into(),
      title: title.into(),
      description: description.into(),
      status: TaskStatus::Open,
    }
  }

  /// The initial human message handed to the agent.
  pub fn prompt(&self) -> String {
    format!("Task: {}\nDescription: {}", self.title, self.description)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn labels_map_to_statuses() {
    assert_eq!(TaskStatus::from_label("To Do"), TaskStatus::Open);
    assert_eq!(TaskStatus::from_label("in-progress"), TaskStatus::InProgress);
    assert_eq!(TaskStatus::from_label("In Progress"), TaskStatus::InProgress);
    assert_eq!(TaskStatus::from_label("review"), TaskStatus::Review);
    assert_eq!(TaskStatus::from_label("DONE"), TaskStatus::Done);
    assert_eq!(TaskStatus::from_label("failed"), TaskStatus::Failed);
    assert_eq!(TaskStatus::from_label("Backlog"), TaskStatus::Open);
  }

  #[test]
  fn prompt_contains_title_and_description() {
    let task = Task::new("1", "Fix login", "Users cannot log in");
    assert_eq!(task.prompt(), "Task: Fix login\nDescription: Users cannot log in");
    assert_eq!(task.status, TaskStatus::Open);
  }

  #[test]
  fn status_wire_names_are_snake_case() {
    let json = serde_json::to_string(&TaskStatus::InProgress).unwrap();
    assert_eq!(json, "\"in_progress\"");
    assert_eq!(TaskStatus::InProgress.to_string(), "in_progress");
  }
}
