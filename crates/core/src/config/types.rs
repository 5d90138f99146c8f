use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::role::Role;

/// Log level for the cycle runner and CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
  Off,
  Warn,
  #[default]
  Info,
  Debug,
  Trace,
}

/// Chat-completions endpoint settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
  pub endpoint: String,
  pub model: String,
  pub temperature: f32,
  pub max_tokens: u32,
  /// Retries after the first attempt on transport errors, 429 and 5xx.
  pub max_retries: u32,
  pub timeout_secs: u64,
  /// `tool_choice` value that forces an invocation ("any" for Mistral, "required" for OpenAI).
  pub mandatory_tool_choice: String,
}

impl ModelConfig {
  pub fn timeout(&self) -> Duration {
    Duration::from_secs(self.timeout_secs)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutConfig {
  /// Process start + initialize + discovery for one capability server.
  pub handshake_secs: u64,
  /// A single capability invocation.
  pub capability_secs: u64,
}

impl TimeoutConfig {
  pub fn handshake(&self) -> Duration {
    Duration::from_secs(self.handshake_secs)
  }

  pub fn capability(&self) -> Duration {
    Duration::from_secs(self.capability_secs)
  }
}

/// A capability server launched as a child process speaking line-delimited JSON-RPC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
  pub command: Vec<String>,
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub env: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrelloConfig {
  /// Key of the capability server in `[servers]` that talks to the board.
  pub server: String,
  pub todo_list_id: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub in_progress_list_id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub review_list_id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub done_list_id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub failed_list_id: Option<String>,
  #[serde(default = "default_polling_tool")]
  pub polling_tool: String,
  #[serde(default = "default_comment_tool")]
  pub comment_tool: String,
  #[serde(default = "default_move_tool")]
  pub move_tool: String,
}

fn default_polling_tool() -> String {
  "read_board".to_string()
}

fn default_comment_tool() -> String {
  "add_comment_to_card".to_string()
}

fn default_move_tool() -> String {
  "move_card_to_list".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskAppConfig {
  pub base_url: String,
  pub project_id: String,
  #[serde(default = "default_task_app_timeout")]
  pub timeout_secs: u64,
}

fn default_task_app_timeout() -> u64 {
  30
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskSourceConfig {
  Trello(TrelloConfig),
  TaskApp(TaskAppConfig),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RolePolicy {
  /// A text-only turn ends the run instead of triggering a correction.
  #[serde(default)]
  pub text_terminates: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolePolicies {
  pub coder: RolePolicy,
  pub bugfixer: RolePolicy,
  pub analyst: RolePolicy,
}

impl Default for RolePolicies {
  fn default() -> Self {
    Self {
      coder: RolePolicy::default(),
      bugfixer: RolePolicy::default(),
      analyst: RolePolicy {
        text_terminates: true,
      },
    }
  }
}

impl RolePolicies {
  pub fn policy(&self, role: Role) -> RolePolicy {
    match role {
      Role::Coder => self.coder,
      Role::Bugfixer => self.bugfixer,
      Role::Analyst => self.analyst,
      _ => RolePolicy::default(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityConfig {
  /// Name fragments marking a capability as mutating when the server gives no hint.
  pub mutating_markers: Vec<String>,
}

/// Effective configuration after merging defaults, global, and project config
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
  pub log_level: LogLevel,
  /// Checkout the agent works in; relative paths resolve against the project root.
  pub work_dir: PathBuf,
  /// Repository cloned into `work_dir` when it is not a repository yet.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub repo_url: Option<String>,
  /// Maximum graph transitions per run.
  pub step_bound: usize,
  /// Maximum characters of the summary written back to the task.
  pub summary_limit: usize,
  /// Extra environment variables exposed as `$NAME` tokens in server commands.
  pub secret_env: Vec<String>,
  pub model: ModelConfig,
  pub timeouts: TimeoutConfig,
  pub roles: RolePolicies,
  pub capabilities: CapabilityConfig,
  pub servers: BTreeMap<String, ServerConfig>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub task_source: Option<TaskSourceConfig>,
}

impl Config {
  pub fn resolve_work_dir(&self, project_root: &Path) -> PathBuf {
    if self.work_dir.is_absolute() {
      self.work_dir.clone()
    } else {
      project_root.join(&self.work_dir)
    }
  }
}

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("io: {0}")]
  Io(#[from] std::io::Error),
  #[error("toml: {0}")]
  Toml(#[from] toml::de::Error),
  #[error("server `{server}` must have a non-empty command")]
  InvalidServerDefinition { server: String },
  #[error("task source refers to server `{server}` which is not configured")]
  MissingServerDefinition { server: String },
  #[error("invalid task source: {0}")]
  InvalidTaskSource(String),
  #[error("{field} must be greater than zero")]
  ZeroLimit { field: &'static str },
}

pub type Result<T> = std::result::Result<T, ConfigError>;
