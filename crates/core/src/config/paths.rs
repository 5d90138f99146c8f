use std::path::{Path, PathBuf};

/// Location of the global config file (~/.config/autopilot/config.toml)
pub fn global_config_path() -> Option<PathBuf> {
  dirs::config_dir().map(|p| p.join("autopilot").join("config.toml"))
}

/// Location of the project config file (./.autopilot/config.toml)
pub fn project_config_path(project_root: &Path) -> PathBuf {
  project_root.join(".autopilot").join("config.toml")
}
