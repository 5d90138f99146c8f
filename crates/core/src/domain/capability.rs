use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// Name of the terminal capability. Invoking it ends the run.
pub const FINISH_TASK: &str = "finish_task";

/// Argument types a capability may declare. Anything else is treated as a string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgKind {
  String,
  Integer,
  Boolean,
  StringArray,
}

impl ArgKind {
  /// Map a JSON-schema property onto a kind.
  pub fn from_schema(property: &Value) -> ArgKind {
    match property.get("type").and_then(Value::as_str) {
      Some("integer") => ArgKind::Integer,
      Some("boolean") => ArgKind::Boolean,
      Some("array") => ArgKind::StringArray,
      _ => ArgKind::String,
    }
  }

  fn schema(self) -> Value {
    match self {
      ArgKind::String => json!({ "type": "string" }),
      ArgKind::Integer => json!({ "type": "integer" }),
      ArgKind::Boolean => json!({ "type": "boolean" }),
      ArgKind::StringArray => json!({ "type": "array", "items": { "type": "string" } }),
    }
  }
}

impl fmt::Display for ArgKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      ArgKind::String => "string",
      ArgKind::Integer => "integer",
      ArgKind::Boolean => "boolean",
      ArgKind::StringArray => "array of strings",
    })
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamSpec {
  pub kind: ArgKind,
  pub required: bool,
  #[serde(default)]
  pub description: String,
}

/// Whether invoking a capability can change external state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Effect {
  ReadOnly,
  Mutating,
}

/// A named operation offered to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capability {
  pub name: String,
  pub description: String,
  pub params: BTreeMap<String, ParamSpec>,
  pub effect: Effect,
}

impl Capability {
  pub fn new(name: impl Into<String>, description: impl Into<String>, effect: Effect) -> Self {
    Self {
      name: name.into(),
      description: description.into(),
      params: BTreeMap::new(),
      effect,
    }
  }

  /// Builder-style parameter declaration.
  pub fn param(mut self, name: &str, kind: ArgKind, required: bool, description: &str) -> Self {
    self.params.insert(
      name.to_string(),
      ParamSpec {
        kind,
        required,
        description: description.to_string(),
      },
    );
    self
  }

  /// Read a capability from a JSON-schema object (`properties` + `required`).
  pub fn from_input_schema(
    name: impl Into<String>,
    description: impl Into<String>,
    schema: &Value,
    effect: Effect,
  ) -> Self {
    let required: Vec<&str> = schema
      .get("required")
      .and_then(Value::as_array)
      .map(|names| names.iter().filter_map(Value::as_str).collect())
      .unwrap_or_default();

    let mut params = BTreeMap::new();
    if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
      for (field, property) in properties {
        params.insert(
          field.clone(),
          ParamSpec {
            kind: ArgKind::from_schema(property),
            required: required.contains(&field.as_str()),
            description: property
              .get("description")
              .and_then(Value::as_str)
              .unwrap_or_default()
              .to_string(),
          },
        );
      }
    }

    Self {
      name: name.into(),
      description: description.into(),
      params,
      effect,
    }
  }

  /// JSON-schema rendering handed to the model.
  pub fn input_schema(&self) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();
    for (field, spec) in &self.params {
      let mut property = spec.kind.schema();
      if !spec.description.is_empty()
        && let Some(object) = property.as_object_mut()
      {
        object.insert("description".to_string(), Value::from(spec.description.clone()));
      }
      properties.insert(field.clone(), property);
      if spec.required {
        required.push(Value::from(field.clone()));
      }
    }
    json!({
      "type": "object",
      "properties": properties,
      "required": required,
    })
  }

  pub fn is_mutating(&self) -> bool {
    self.effect == Effect::Mutating
  }
}
