use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::paths::{global_config_path, project_config_path};
use super::types::{
  CapabilityConfig, Config, LogLevel, ModelConfig, Result, RolePolicies, RolePolicy, ServerConfig,
  TaskSourceConfig, TimeoutConfig,
};
use super::validate::validate;

/// Load configuration by resolving the default global and project paths.
/// Project config overrides global; both override defaults.
pub fn load(project_root: Option<&Path>) -> Result<Config> {
  let global = global_config_path();
  let project = project_root.map(project_config_path);
  load_from_paths(global.as_deref(), project.as_deref())
}

/// Load configuration from explicit file paths (if present).
pub fn load_from_paths(global: Option<&Path>, project: Option<&Path>) -> Result<Config> {
  let mut cfg = Config::default();

  // Global
  if let Some(g) = global
    && let Ok(s) = fs::read_to_string(g)
  {
    let partial: PartialConfig = toml::from_str(&s)?;
    cfg = partial.merge_over(cfg);
  }

  // Project
  if let Some(p) = project
    && let Ok(s) = fs::read_to_string(p)
  {
    let partial: PartialConfig = toml::from_str(&s)?;
    cfg = partial.merge_over(cfg);
  }

  validate(&cfg)?;

  Ok(cfg)
}

#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
struct PartialModelConfig {
  endpoint: Option<String>,
  model: Option<String>,
  temperature: Option<f32>,
  max_tokens: Option<u32>,
  max_retries: Option<u32>,
  timeout_secs: Option<u64>,
  mandatory_tool_choice: Option<String>,
}

impl PartialModelConfig {
  fn merge_over(self, base: ModelConfig) -> ModelConfig {
    ModelConfig {
      endpoint: self.endpoint.unwrap_or(base.endpoint),
      model: self.model.unwrap_or(base.model),
      temperature: self.temperature.unwrap_or(base.temperature),
      max_tokens: self.max_tokens.unwrap_or(base.max_tokens),
      max_retries: self.max_retries.unwrap_or(base.max_retries),
      timeout_secs: self.timeout_secs.unwrap_or(base.timeout_secs),
      mandatory_tool_choice: self
        .mandatory_tool_choice
        .unwrap_or(base.mandatory_tool_choice),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Default)]
struct PartialTimeoutConfig {
  handshake_secs: Option<u64>,
  capability_secs: Option<u64>,
}

impl PartialTimeoutConfig {
  fn merge_over(self, base: TimeoutConfig) -> TimeoutConfig {
    TimeoutConfig {
      handshake_secs: self.handshake_secs.unwrap_or(base.handshake_secs),
      capability_secs: self.capability_secs.unwrap_or(base.capability_secs),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Default)]
struct PartialRolePolicies {
  coder: Option<RolePolicy>,
  bugfixer: Option<RolePolicy>,
  analyst: Option<RolePolicy>,
}

impl PartialRolePolicies {
  fn merge_over(self, base: RolePolicies) -> RolePolicies {
    RolePolicies {
      coder: self.coder.unwrap_or(base.coder),
      bugfixer: self.bugfixer.unwrap_or(base.bugfixer),
      analyst: self.analyst.unwrap_or(base.analyst),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
struct PartialConfig {
  log_level: Option<LogLevel>,
  work_dir: Option<PathBuf>,
  repo_url: Option<String>,
  step_bound: Option<usize>,
  summary_limit: Option<usize>,
  secret_env: Option<Vec<String>>,
  model: Option<PartialModelConfig>,
  timeouts: Option<PartialTimeoutConfig>,
  roles: Option<PartialRolePolicies>,
  capabilities: Option<CapabilityConfig>,
  servers: Option<BTreeMap<String, ServerConfig>>,
  task_source: Option<TaskSourceConfig>,
}

impl PartialConfig {
  fn merge_over(self, base: Config) -> Config {
    let PartialConfig {
      log_level,
      work_dir,
      repo_url,
      step_bound,
      summary_limit,
      secret_env,
      model,
      timeouts,
      roles,
      capabilities,
      servers,
      task_source,
    } = self;

    let Config {
      log_level: base_log_level,
      work_dir: base_work_dir,
      repo_url: base_repo_url,
      step_bound: base_step_bound,
      summary_limit: base_summary_limit,
      secret_env: base_secret_env,
      model: base_model,
      timeouts: base_timeouts,
      roles: base_roles,
      capabilities: base_capabilities,
      servers: base_servers,
      task_source: base_task_source,
    } = base;

    let mut merged_servers = base_servers;
    if let Some(overrides) = servers {
      for (name, cfg) in overrides {
        merged_servers.insert(name, cfg);
      }
    }

    Config {
      log_level: log_level.unwrap_or(base_log_level),
      work_dir: work_dir.unwrap_or(base_work_dir),
      repo_url: repo_url.or(base_repo_url),
      step_bound: step_bound.unwrap_or(base_step_bound),
      summary_limit: summary_limit.unwrap_or(base_summary_limit),
      secret_env: secret_env.unwrap_or(base_secret_env),
      model: model.unwrap_or_default().merge_over(base_model),
      timeouts: timeouts.unwrap_or_default().merge_over(base_timeouts),
      roles: roles.unwrap_or_default().merge_over(base_roles),
      capabilities: capabilities.unwrap_or(base_capabilities),
      servers: merged_servers,
      task_source: task_source.or(base_task_source),
    }
  }
}
