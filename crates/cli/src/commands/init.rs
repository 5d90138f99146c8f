use std::path::Path;

use anyhow::{Context, Result};
use autopilot_core::adapters::fs as fsutil;
use autopilot_core::config;
use yansi::Paint;

pub fn run(root: &Path) -> Result<()> {
  fsutil::ensure_layout(root).context("failed to create .autopilot layout")?;
  config::write_default_project_config(root).context("failed to write config")?;
  println!(
    "initialized {} at {}",
    ".autopilot".bold(),
    fsutil::autopilot_dir(root).display()
  );
  println!("edit {} to configure a task source", config::project_config_path(root).display());
  Ok(())
}
