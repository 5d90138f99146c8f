use std::collections::BTreeMap;
use std::path::PathBuf;

use super::types::{
  CapabilityConfig, Config, LogLevel, ModelConfig, RolePolicies, ServerConfig, TimeoutConfig,
};
use crate::capability::effect::DEFAULT_MUTATING_MARKERS;

impl Default for ModelConfig {
  fn default() -> Self {
    Self {
      endpoint: "https://api.mistral.ai/v1/chat/completions".to_string(),
      model: "mistral-small-latest".to_string(),
      temperature: 0.0,
      max_tokens: 4096,
      max_retries: 2,
      timeout_secs: 120,
      mandatory_tool_choice: "any".to_string(),
    }
  }
}

impl Default for TimeoutConfig {
  fn default() -> Self {
    Self {
      handshake_secs: 60,
      capability_secs: 120,
    }
  }
}

impl Default for CapabilityConfig {
  fn default() -> Self {
    Self {
      mutating_markers: DEFAULT_MUTATING_MARKERS.iter().map(|m| m.to_string()).collect(),
    }
  }
}

impl Default for Config {
  fn default() -> Self {
    Self {
      log_level: LogLevel::Info,
      work_dir: PathBuf::from(".autopilot/workspace"),
      repo_url: None,
      step_bound: 50,
      summary_limit: 4000,
      secret_env: Vec::new(),
      model: ModelConfig::default(),
      timeouts: TimeoutConfig::default(),
      roles: RolePolicies::default(),
      capabilities: CapabilityConfig::default(),
      servers: builtin_servers(),
      task_source: None,
    }
  }
}

pub(crate) fn builtin_servers() -> BTreeMap<String, ServerConfig> {
  let mut servers = BTreeMap::new();
  servers.insert(
    "git".to_string(),
    ServerConfig {
      command: vec![
        "uvx".to_string(),
        "mcp-server-git".to_string(),
        "--repository".to_string(),
        "$AUTOPILOT_WORK_DIR".to_string(),
      ],
      env: BTreeMap::new(),
    },
  );
  servers
}
