use super::types::{Config, ConfigError, Result, TaskSourceConfig};

pub(super) fn validate(cfg: &Config) -> Result<()> {
  validate_servers(cfg)?;
  validate_task_source(cfg)?;
  validate_limits(cfg)
}

fn validate_servers(cfg: &Config) -> Result<()> {
  for (name, server) in &cfg.servers {
    if server.command.first().is_none_or(|program| program.trim().is_empty()) {
      return Err(ConfigError::InvalidServerDefinition {
        server: name.to_string(),
      });
    }
  }
  Ok(())
}

fn validate_task_source(cfg: &Config) -> Result<()> {
  match &cfg.task_source {
    None => Ok(()),
    Some(TaskSourceConfig::Trello(trello)) => {
      if !cfg.servers.contains_key(&trello.server) {
        return Err(ConfigError::MissingServerDefinition {
          server: trello.server.clone(),
        });
      }
      if trello.todo_list_id.trim().is_empty() {
        return Err(ConfigError::InvalidTaskSource(
          "trello.todo_list_id must not be empty".to_string(),
        ));
      }
      Ok(())
    }
    Some(TaskSourceConfig::TaskApp(app)) => {
      if !(app.base_url.starts_with("http://") || app.base_url.starts_with("https://")) {
        return Err(ConfigError::InvalidTaskSource(format!(
          "task_app.base_url must be an http(s) url, got `{}`",
          app.base_url
        )));
      }
      if app.project_id.trim().is_empty() {
        return Err(ConfigError::InvalidTaskSource(
          "task_app.project_id must not be empty".to_string(),
        ));
      }
      Ok(())
    }
  }
}

fn validate_limits(cfg: &Config) -> Result<()> {
  if cfg.step_bound == 0 {
    return Err(ConfigError::ZeroLimit { field: "step_bound" });
  }
  if cfg.summary_limit == 0 {
    return Err(ConfigError::ZeroLimit {
      field: "summary_limit",
    });
  }
  if cfg.timeouts.handshake_secs == 0 || cfg.timeouts.capability_secs == 0 {
    return Err(ConfigError::ZeroLimit { field: "timeouts" });
  }
  if cfg.model.timeout_secs == 0 {
    return Err(ConfigError::ZeroLimit {
      field: "model.timeout_secs",
    });
  }
  Ok(())
}
