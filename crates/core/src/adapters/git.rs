use std::path::Path;

use git2::build::CheckoutBuilder;
use git2::{BranchType, Cred, PushOptions, RemoteCallbacks, Repository};
use tracing::{info, warn};

/// How the work directory came to hold a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bootstrap {
  Existing,
  Cloned,
  Initialized,
}

/// Make sure `work_dir` is a repository: keep an existing one, otherwise
/// clone `repo_url`, otherwise (or when cloning fails) init an empty one.
pub fn ensure_repository(work_dir: &Path, repo_url: Option<&str>) -> Result<Bootstrap, git2::Error> {
  if work_dir.join(".git").exists() {
    Repository::open(work_dir)?;
    return Ok(Bootstrap::Existing);
  }

  if let Some(url) = repo_url {
    let empty = std::fs::read_dir(work_dir).map_or(true, |mut entries| entries.next().is_none());
    if empty {
      match Repository::clone(url, work_dir) {
        Ok(_) => {
          info!(event = "workspace_cloned", work_dir = %work_dir.display(), "repository cloned");
          return Ok(Bootstrap::Cloned);
        }
        Err(err) => warn!(
          event = "workspace_clone_failed",
          error = %err.message(),
          "clone failed, initializing an empty repository"
        ),
      }
    } else {
      warn!(
        event = "workspace_not_empty",
        work_dir = %work_dir.display(),
        "work dir is not empty, initializing in place instead of cloning"
      );
    }
  }

  Repository::init(work_dir)?;
  info!(event = "workspace_initialized", work_dir = %work_dir.display());
  Ok(Bootstrap::Initialized)
}

/// Create `name` at HEAD and check it out. An existing branch is checked out as is.
pub fn create_branch(work_dir: &Path, name: &str) -> Result<String, git2::Error> {
  let repo = Repository::open(work_dir)?;
  if !git2::Branch::name_is_valid(name)? {
    return Err(git2::Error::from_str(&format!("invalid branch name `{name}`")));
  }

  let created = match repo.find_branch(name, BranchType::Local) {
    Ok(_) => false,
    Err(_) => {
      let head = repo.head()?.peel_to_commit()?;
      repo.branch(name, &head, false)?;
      true
    }
  };

  repo.set_head(&format!("refs/heads/{name}"))?;
  repo.checkout_head(Some(CheckoutBuilder::new().safe()))?;
  Ok(if created {
    format!("Created and switched to branch '{name}'.")
  } else {
    format!("Switched to existing branch '{name}'.")
  })
}

/// Push the current branch to `origin`, authenticating with `token` when the
/// remote asks for credentials.
pub fn push_head(work_dir: &Path, token: &str) -> Result<String, git2::Error> {
  let repo = Repository::open(work_dir)?;
  let head = repo.head()?;
  if !head.is_branch() {
    return Err(git2::Error::from_str("HEAD is detached; check out a branch before pushing"));
  }
  let branch = head
    .shorthand()
    .ok_or_else(|| git2::Error::from_str("branch name is not valid UTF-8"))?
    .to_string();

  let mut remote = repo.find_remote("origin")?;
  let mut callbacks = RemoteCallbacks::new();
  callbacks.credentials(|_url, _username, _allowed| Cred::userpass_plaintext("x-access-token", token));
  let mut options = PushOptions::new();
  options.remote_callbacks(callbacks);

  let refspec = format!("refs/heads/{branch}:refs/heads/{branch}");
  remote.push(&[refspec.as_str()], Some(&mut options))?;
  Ok(format!("Pushed branch '{branch}' to origin."))
}

#[cfg(test)]
mod tests {
  use super::*;
  use test_support::init_repo_with_initial_commit;

  #[test]
  fn existing_repository_is_kept() {
    let td = tempfile::tempdir().unwrap();
    init_repo_with_initial_commit(td.path());
    assert_eq!(ensure_repository(td.path(), Some("/nope")).unwrap(), Bootstrap::Existing);
  }

  #[test]
  fn clones_when_url_given_and_falls_back_to_init() {
    let upstream = tempfile::tempdir().unwrap();
    init_repo_with_initial_commit(upstream.path());

    let td = tempfile::tempdir().unwrap();
    let work = td.path().join("work");
    std::fs::create_dir_all(&work).unwrap();
    let url = upstream.path().to_string_lossy().into_owned();
    assert_eq!(ensure_repository(&work, Some(&url)).unwrap(), Bootstrap::Cloned);
    assert!(work.join("README.md").exists());

    let other = td.path().join("other");
    std::fs::create_dir_all(&other).unwrap();
    let missing = td.path().join("missing-upstream");
    let bootstrap = ensure_repository(&other, Some(&missing.to_string_lossy())).unwrap();
    assert_eq!(bootstrap, Bootstrap::Initialized);
    assert!(other.join(".git").exists());
  }

  #[test]
  fn create_branch_switches_head() {
    let td = tempfile::tempdir().unwrap();
    let repo = init_repo_with_initial_commit(td.path());

    let msg = create_branch(td.path(), "feature/login").unwrap();
    assert!(msg.contains("Created"));
    assert_eq!(repo.head().unwrap().shorthand(), Some("feature/login"));

    let msg = create_branch(td.path(), "feature/login").unwrap();
    assert!(msg.contains("existing"));
    assert!(create_branch(td.path(), "bad..name").is_err());
  }

  #[test]
  fn push_head_updates_origin() {
    let remote_dir = tempfile::tempdir().unwrap();
    let bare = git2::Repository::init_bare(remote_dir.path()).unwrap();

    let td = tempfile::tempdir().unwrap();
    let repo = init_repo_with_initial_commit(td.path());
    repo
      .remote("origin", &remote_dir.path().to_string_lossy())
      .unwrap();
    create_branch(td.path(), "agent-work").unwrap();

    let msg = push_head(td.path(), "unused-token").unwrap();
    assert_eq!(msg, "Pushed branch 'agent-work' to origin.");
    assert!(bare.find_reference("refs/heads/agent-work").is_ok());
  }
}
