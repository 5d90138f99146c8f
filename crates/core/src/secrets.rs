//! Credentials read from the environment. Never serialized, never logged.

use std::collections::BTreeMap;
use std::fmt;

pub const MODEL_API_KEY_VARS: &[&str] = &["AUTOPILOT_MODEL_API_KEY", "MISTRAL_API_KEY", "OPENAI_API_KEY"];
pub const GITHUB_TOKEN_VAR: &str = "GITHUB_TOKEN";
pub const TASK_APP_USERNAME_VAR: &str = "AUTOPILOT_TASK_APP_USERNAME";
pub const TASK_APP_PASSWORD_VAR: &str = "AUTOPILOT_TASK_APP_PASSWORD";

#[derive(Clone, Default)]
pub struct Secrets {
  model_api_key: Option<String>,
  github_token: Option<String>,
  task_app_username: Option<String>,
  task_app_password: Option<String>,
  extra: BTreeMap<String, String>,
}

impl fmt::Debug for Secrets {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let mark = |v: &Option<String>| if v.is_some() { "<set>" } else { "<unset>" };
    f.debug_struct("Secrets")
      .field("model_api_key", &mark(&self.model_api_key))
      .field("github_token", &mark(&self.github_token))
      .field("task_app_username", &mark(&self.task_app_username))
      .field("task_app_password", &mark(&self.task_app_password))
      .field("extra", &self.extra.keys().collect::<Vec<_>>())
      .finish()
  }
}

impl Secrets {
  /// Read well-known variables plus `extra_names` from the process environment.
  pub fn from_env(extra_names: &[String]) -> Self {
    Self::from_lookup(extra_names, |name| std::env::var(name).ok())
  }

  pub fn from_lookup(extra_names: &[String], lookup: impl Fn(&str) -> Option<String>) -> Self {
    let read = |name: &str| lookup(name).filter(|value| !value.is_empty());
    let extra = extra_names
      .iter()
      .filter_map(|name| read(name.as_str()).map(|value| (name.clone(), value)))
      .collect();
    Self {
      model_api_key: MODEL_API_KEY_VARS.iter().find_map(|&name| read(name)),
      github_token: read(GITHUB_TOKEN_VAR),
      task_app_username: read(TASK_APP_USERNAME_VAR),
      task_app_password: read(TASK_APP_PASSWORD_VAR),
      extra,
    }
  }

  pub fn model_api_key(&self) -> Option<&str> {
    self.model_api_key.as_deref()
  }

  pub fn github_token(&self) -> Option<&str> {
    self.github_token.as_deref()
  }

  pub fn task_app_credentials(&self) -> Option<(&str, &str)> {
    Some((self.task_app_username.as_deref()?, self.task_app_password.as_deref()?))
  }

  /// Values available as `$NAME` tokens in server commands.
  pub fn tokens(&self) -> impl Iterator<Item = (&str, &str)> {
    self
      .github_token
      .as_deref()
      .map(|token| (GITHUB_TOKEN_VAR, token))
      .into_iter()
      .chain(self.extra.iter().map(|(k, v)| (k.as_str(), v.as_str())))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::HashMap;

  fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = vars
      .iter()
      .map(|(k, v)| (k.to_string(), v.to_string()))
      .collect();
    move |name| vars.get(name).cloned()
  }

  #[test]
  fn reads_known_and_extra_variables() {
    let secrets = Secrets::from_lookup(
      &["TRELLO_API_KEY".to_string(), "UNSET".to_string()],
      lookup(&[
        ("MISTRAL_API_KEY", "m-key"),
        ("GITHUB_TOKEN", "gh"),
        ("TRELLO_API_KEY", "trello"),
        ("AUTOPILOT_TASK_APP_USERNAME", "bot"),
      ]),
    );
    assert_eq!(secrets.model_api_key(), Some("m-key"));
    assert_eq!(secrets.github_token(), Some("gh"));
    assert_eq!(secrets.task_app_credentials(), None);
    let tokens: Vec<_> = secrets.tokens().collect();
    assert_eq!(tokens, vec![("GITHUB_TOKEN", "gh"), ("TRELLO_API_KEY", "trello")]);
  }

  #[test]
  fn autopilot_key_wins_and_empty_values_are_ignored() {
    let secrets = Secrets::from_lookup(
      &[],
      lookup(&[("AUTOPILOT_MODEL_API_KEY", "a"), ("OPENAI_API_KEY", "o"), ("GITHUB_TOKEN", "")]),
    );
    assert_eq!(secrets.model_api_key(), Some("a"));
    assert_eq!(secrets.github_token(), None);
  }

  #[test]
  fn debug_output_redacts_values() {
    let secrets = Secrets::from_lookup(
      &["EXTRA".to_string()],
      lookup(&[("GITHUB_TOKEN", "ghp_secret"), ("EXTRA", "hidden")]),
    );
    let rendered = format!("{secrets:?}");
    assert!(!rendered.contains("ghp_secret"));
    assert!(!rendered.contains("hidden"));
    assert!(rendered.contains("<set>"));
    assert!(rendered.contains("EXTRA"));
  }
}
