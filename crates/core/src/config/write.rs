use std::path::Path;

use super::paths::project_config_path;
use super::types::Config;

/// Write a default project config if it does not exist yet.
pub fn write_default_project_config(project_root: &Path) -> std::io::Result<()> {
  let path = project_config_path(project_root);
  if let Some(parent) = path.parent() {
    std::fs::create_dir_all(parent)?;
  }
  if !path.exists() {
    let cfg = Config::default();
    let mut s = toml::to_string_pretty(&cfg).unwrap_or_default();
    // Task sources need ids that only the user knows; document both shapes as comments.
    s.push_str(
      "\n# Where tasks come from. Pick one:\n#\n# [task_source]\n# kind = \"trello\"\n# server = \"trello\"            # key under [servers]\n# todo_list_id = \"...\"\n# in_progress_list_id = \"...\"\n# review_list_id = \"...\"\n# failed_list_id = \"...\"\n#\n# [task_source]\n# kind = \"task_app\"\n# base_url = \"http://localhost:3000\"\n# project_id = \"...\"\n",
    );
    std::fs::write(&path, s)?;
  }
  Ok(())
}
