use serde_json::{Map, Value};
use thiserror::Error;

use crate::domain::capability::{ArgKind, Capability};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
  #[error("unexpected field `{0}`")]
  UnknownField(String),
  #[error("missing required field `{0}`")]
  MissingField(String),
  #[error("field `{field}` must be {expected}")]
  WrongType { field: String, expected: ArgKind },
}

#[derive(Debug, Clone)]
struct FieldRule {
  name: String,
  kind: ArgKind,
  required: bool,
}

/// Argument checker derived once from a capability's parameter declarations.
#[derive(Debug, Clone)]
pub struct ArgumentValidator {
  fields: Vec<FieldRule>,
}

impl ArgumentValidator {
  pub fn for_capability(capability: &Capability) -> Self {
    let fields = capability
      .params
      .iter()
      .map(|(name, spec)| FieldRule {
        name: name.clone(),
        kind: spec.kind,
        required: spec.required,
      })
      .collect();
    Self { fields }
  }

  /// Check `arguments` and return the normalized copy that is sent on.
  /// Null optionals are dropped; numeric and boolean strings are coerced.
  pub fn validate(&self, arguments: &Map<String, Value>) -> Result<Map<String, Value>, ValidationError> {
    if let Some(unknown) = arguments
      .keys()
      .find(|key| !self.fields.iter().any(|rule| &rule.name == *key))
    {
      return Err(ValidationError::UnknownField(unknown.clone()));
    }

    let mut normalized = Map::new();
    for rule in &self.fields {
      match arguments.get(&rule.name) {
        None | Some(Value::Null) => {
          if rule.required {
            return Err(ValidationError::MissingField(rule.name.clone()));
          }
        }
        Some(value) => {
          let value = coerce(rule.kind, value).ok_or_else(|| ValidationError::WrongType {
            field: rule.name.clone(),
            expected: rule.kind,
          })?;
          normalized.insert(rule.name.clone(), value);
        }
      }
    }
    Ok(normalized)
  }
}

fn coerce(kind: ArgKind, value: &Value) -> Option<Value> {
  match (kind, value) {
    (ArgKind::String, Value::String(_)) => Some(value.clone()),
    (ArgKind::Integer, Value::Number(n)) if n.is_i64() || n.is_u64() => Some(value.clone()),
    (ArgKind::Integer, Value::Number(n)) => n
      .as_f64()
      .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
      .map(|f| Value::from(f as i64)),
    (ArgKind::Integer, Value::String(s)) => s.trim().parse::<i64>().ok().map(Value::from),
    (ArgKind::Boolean, Value::Bool(_)) => Some(value.clone()),
    (ArgKind::Boolean, Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
      "true" => Some(Value::Bool(true)),
      "false" => Some(Value::Bool(false)),
      _ => None,
    },
    (ArgKind::StringArray, Value::Array(items)) if items.iter().all(Value::is_string) => {
      Some(value.clone())
    }
    _ => None,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::capability::Effect;
  use serde_json::json;

  fn validator() -> ArgumentValidator {
    let cap = Capability::new("edit", "", Effect::Mutating)
      .param("path", ArgKind::String, true, "")
      .param("line", ArgKind::Integer, false, "")
      .param("force", ArgKind::Boolean, false, "")
      .param("tags", ArgKind::StringArray, false, "");
    ArgumentValidator::for_capability(&cap)
  }

  fn args(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap()
  }

  #[test]
  fn accepts_well_typed_arguments() {
    let out = validator()
      .validate(&args(json!({"path": "a", "line": 3, "force": true, "tags": ["x"]})))
      .unwrap();
    assert_eq!(Value::Object(out), json!({"path": "a", "line": 3, "force": true, "tags": ["x"]}));
  }

  #[test]
  fn rejects_unknown_and_missing_fields() {
    let v = validator();
    assert_eq!(
      v.validate(&args(json!({"path": "a", "colour": "red"}))),
      Err(ValidationError::UnknownField("colour".into()))
    );
    assert_eq!(
      v.validate(&args(json!({"line": 1}))),
      Err(ValidationError::MissingField("path".into()))
    );
    assert_eq!(
      v.validate(&args(json!({"path": null}))),
      Err(ValidationError::MissingField("path".into()))
    );
  }

  #[test]
  fn rejects_wrong_types() {
    let err = validator()
      .validate(&args(json!({"path": 5})))
      .unwrap_err();
    assert_eq!(
      err,
      ValidationError::WrongType {
        field: "path".into(),
        expected: ArgKind::String
      }
    );
    assert!(validator().validate(&args(json!({"path": "a", "tags": [1]}))).is_err());
    assert!(validator().validate(&args(json!({"path": "a", "line": 1.5}))).is_err());
  }

  #[test]
  fn drops_null_optionals_and_coerces_strings() {
    let out = validator()
      .validate(&args(json!({"path": "a", "line": "7", "force": "False", "tags": null})))
      .unwrap();
    assert_eq!(Value::Object(out), json!({"path": "a", "line": 7, "force": false}));
  }

  #[test]
  fn capability_without_params_accepts_only_empty_arguments() {
    let v = ArgumentValidator::for_capability(&Capability::new("ping", "", Effect::ReadOnly));
    assert!(v.validate(&Map::new()).unwrap().is_empty());
    assert!(v.validate(&args(json!({"x": 1}))).is_err());
  }
}
