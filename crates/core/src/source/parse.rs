use serde_json::Value;

use super::SourceError;
use crate::domain::task::{Task, TaskStatus};

/// Keys a backend uses for its containers and task fields.
#[derive(Debug, Clone, Copy)]
pub struct Shape {
  /// Keys holding task arrays (`cards`, `tasks`, ...).
  pub items: &'static [&'static str],
  /// Keys holding group arrays whose entries contain task arrays (`lists`, ...).
  pub groups: &'static [&'static str],
  pub id: &'static [&'static str],
  pub title: &'static [&'static str],
  pub description: &'static [&'static str],
  pub status: &'static [&'static str],
  /// Group label key; used as status when an item has none.
  pub group_label: &'static [&'static str],
}

/// Flatten a raw payload into tasks. Accepts a bare array, an object with an
/// item key, or an object with groups of items; groups win when present.
pub fn parse_tasks(raw: &Value, shape: &Shape) -> Result<Vec<Task>, SourceError> {
  let mut tasks = Vec::new();
  match raw {
    Value::Array(items) => collect(items, None, shape, &mut tasks),
    Value::Object(object) => {
      let groups = shape
        .groups
        .iter()
        .find_map(|key| object.get(*key).and_then(Value::as_array));
      if let Some(groups) = groups {
        for group in groups {
          let label = first_str(group, shape.group_label);
          if let Some(items) = shape
            .items
            .iter()
            .find_map(|key| group.get(*key).and_then(Value::as_array))
          {
            collect(items, label, shape, &mut tasks);
          }
        }
      } else if let Some(items) = shape
        .items
        .iter()
        .find_map(|key| object.get(*key).and_then(Value::as_array))
      {
        collect(items, None, shape, &mut tasks);
      } else if let Some(task) = to_task(raw, None, shape) {
        tasks.push(task);
      }
    }
    Value::Null => {}
    other => {
      return Err(SourceError::Parse(format!(
        "expected an array or object of tasks, got {}",
        kind(other)
      )));
    }
  }
  Ok(tasks)
}

fn collect(items: &[Value], label: Option<&str>, shape: &Shape, out: &mut Vec<Task>) {
  out.extend(items.iter().filter_map(|item| to_task(item, label, shape)));
}

fn to_task(item: &Value, group_label: Option<&str>, shape: &Shape) -> Option<Task> {
  let id = match shape.id.iter().find_map(|key| item.get(*key))? {
    Value::String(s) if !s.is_empty() => s.clone(),
    Value::Number(n) => n.to_string(),
    _ => return None,
  };
  let status = first_str(item, shape.status)
    .or(group_label)
    .map(TaskStatus::from_label)
    .unwrap_or_default();
  Some(Task {
    id,
    title: first_str(item, shape.title).unwrap_or_default().to_string(),
    description: first_str(item, shape.description)
      .unwrap_or_default()
      .to_string(),
    status,
  })
}

fn first_str<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a str> {
  keys
    .iter()
    .find_map(|key| value.get(*key).and_then(Value::as_str))
}

fn kind(value: &Value) -> &'static str {
  match value {
    Value::Null => "null",
    Value::Bool(_) => "a boolean",
    Value::Number(_) => "a number",
    Value::String(_) => "a string",
    Value::Array(_) => "an array",
    Value::Object(_) => "an object",
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  const SHAPE: Shape = Shape {
    items: &["cards", "tasks"],
    groups: &["lists"],
    id: &["id"],
    title: &["name", "title"],
    description: &["desc", "description"],
    status: &["status"],
    group_label: &["name"],
  };

  #[test]
  fn flattens_grouped_cards() {
    let raw = json!({"lists": [{"cards": [{"id": "1", "name": "A", "desc": "d"}]}]});
    let tasks = parse_tasks(&raw, &SHAPE).unwrap();
    assert_eq!(tasks, vec![Task::new("1", "A", "d")]);
  }

  #[test]
  fn group_name_supplies_missing_status() {
    let raw = json!({"lists": [
      {"name": "To Do", "cards": [{"id": "1", "name": "A"}]},
      {"name": "Doing", "cards": [{"id": "2", "name": "B", "status": "review"}, {"id": 3, "name": "C"}]}
    ]});
    let tasks = parse_tasks(&raw, &SHAPE).unwrap();
    let statuses: Vec<_> = tasks.iter().map(|t| (t.id.as_str(), t.status)).collect();
    assert_eq!(
      statuses,
      vec![
        ("1", TaskStatus::Open),
        ("2", TaskStatus::Review),
        ("3", TaskStatus::InProgress)
      ]
    );
  }

  #[test]
  fn accepts_bare_arrays_item_objects_and_single_tasks() {
    let bare = json!([{"id": 7, "title": "T", "description": "D", "status": "open"}]);
    assert_eq!(parse_tasks(&bare, &SHAPE).unwrap(), vec![Task::new("7", "T", "D")]);

    let wrapped = json!({"tasks": [{"id": "a"}, {"name": "no id"}]});
    let tasks = parse_tasks(&wrapped, &SHAPE).unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].title, "");

    let single = json!({"id": "x", "name": "One"});
    assert_eq!(parse_tasks(&single, &SHAPE).unwrap()[0].title, "One");
    assert!(parse_tasks(&Value::Null, &SHAPE).unwrap().is_empty());
  }

  #[test]
  fn rejects_scalars() {
    assert!(matches!(parse_tasks(&json!("oops"), &SHAPE), Err(SourceError::Parse(_))));
  }
}
