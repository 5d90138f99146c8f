use std::fs;
use std::path::{Component, Path, PathBuf};

/// Return path to the `.autopilot` folder inside the given project root
pub fn autopilot_dir(project_root: &Path) -> PathBuf {
  project_root.join(".autopilot")
}

/// Standard subpaths under `.autopilot`
pub fn logs_path(project_root: &Path) -> PathBuf {
  autopilot_dir(project_root).join("logs.jsonl")
}

pub fn transcripts_dir(project_root: &Path) -> PathBuf {
  autopilot_dir(project_root).join("transcripts")
}

/// Transcript file for one run, as `transcripts/{task-id}-{stamp}.json`
pub fn transcript_path(project_root: &Path, task_id: &str, stamp: &str) -> PathBuf {
  let id: String = task_id
    .chars()
    .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '-' })
    .collect();
  transcripts_dir(project_root).join(format!("{}-{}.json", id, stamp))
}

/// Ensure the `.autopilot` layout exists (directories are created if missing)
pub fn ensure_layout(project_root: &Path) -> std::io::Result<()> {
  fs::create_dir_all(transcripts_dir(project_root))?;
  // logs file lazily created by logging subsystem; ensure parent exists
  fs::create_dir_all(autopilot_dir(project_root))?;
  Ok(())
}

/// Join `relative` onto `root` without leaving it. A leading `/` is
/// stripped; any `..` component is rejected.
pub fn resolve_in_workspace(root: &Path, relative: &str) -> Option<PathBuf> {
  let mut resolved = PathBuf::new();
  for component in Path::new(relative.trim_start_matches('/')).components() {
    match component {
      Component::Normal(part) => resolved.push(part),
      Component::CurDir => {}
      Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
    }
  }
  Some(root.join(resolved))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn layout_paths() {
    let td = tempfile::tempdir().unwrap();
    let root = td.path();
    assert_eq!(autopilot_dir(root), root.join(".autopilot"));
    assert_eq!(logs_path(root), root.join(".autopilot/logs.jsonl"));
    assert_eq!(transcripts_dir(root), root.join(".autopilot/transcripts"));
  }

  #[test]
  fn ensure_layout_creates_dirs() {
    let td = tempfile::tempdir().unwrap();
    let root = td.path();
    ensure_layout(root).unwrap();
    assert!(autopilot_dir(root).exists());
    assert!(transcripts_dir(root).exists());
  }

  #[test]
  fn transcript_path_is_under_transcripts() {
    let td = tempfile::tempdir().unwrap();
    let root = td.path();
    let p = transcript_path(root, "card/42 x", "20250101T000000Z");
    assert_eq!(p, root.join(".autopilot/transcripts/card-42-x-20250101T000000Z.json"));
  }

  #[test]
  fn workspace_paths_cannot_escape() {
    let root = Path::new("/work");
    assert_eq!(resolve_in_workspace(root, "src/main.rs"), Some(PathBuf::from("/work/src/main.rs")));
    assert_eq!(resolve_in_workspace(root, "."), Some(PathBuf::from("/work")));
    assert_eq!(resolve_in_workspace(root, "/etc/passwd"), Some(PathBuf::from("/work/etc/passwd")));
    assert_eq!(resolve_in_workspace(root, "../etc/passwd"), None);
    assert_eq!(resolve_in_workspace(root, "./a/../b"), None);
  }
}
