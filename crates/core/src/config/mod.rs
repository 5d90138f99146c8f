mod defaults;
mod load;
mod paths;
mod types;
mod validate;
mod write;

pub use load::{load, load_from_paths};
pub use paths::{global_config_path, project_config_path};
pub use types::{
  CapabilityConfig, Config, ConfigError, LogLevel, ModelConfig, Result, RolePolicies, RolePolicy,
  ServerConfig, TaskAppConfig, TaskSourceConfig, TimeoutConfig, TrelloConfig,
};
pub use write::write_default_project_config;
