use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mcp::{CallToolResult, ContentBlock};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::info;

use super::{BoundCapability, CapabilityHandler, InvocationError};
use crate::adapters::{fs as fsutil, git};
use crate::domain::capability::{ArgKind, Capability, Effect, FINISH_TASK};

pub const LOG_THOUGHT: &str = "log_thought";
pub const LIST_FILES: &str = "list_files";
pub const READ_FILE: &str = "read_file";
pub const WRITE_TO_FILE: &str = "write_to_file";
pub const GIT_CREATE_BRANCH: &str = "git_create_branch";
pub const GIT_PUSH_ORIGIN: &str = "git_push_origin";

const MAX_LISTED_FILES: usize = 500;

#[derive(Debug, Error)]
pub enum LocalToolError {
  #[error("path `{0}` is outside the workspace")]
  OutsideWorkspace(String),
  #[error("file `{0}` does not exist")]
  NotFound(String),
  #[error("{path}: {source}")]
  Io {
    path: String,
    #[source]
    source: std::io::Error,
  },
  #[error("git: {0}")]
  Git(String),
  #[error("GITHUB_TOKEN is not set; cannot push")]
  MissingToken,
  #[error("background task failed: {0}")]
  Join(String),
}

/// Capabilities executed in-process against the work directory.
pub struct LocalCapabilities {
  work_dir: PathBuf,
  github_token: Option<String>,
}

impl LocalCapabilities {
  pub fn new(work_dir: impl Into<PathBuf>, github_token: Option<String>) -> Self {
    Self {
      work_dir: work_dir.into(),
      github_token,
    }
  }

  pub fn catalog() -> Vec<Capability> {
    vec![
      Capability::new(
        FINISH_TASK,
        "Call this when the task is complete. Provide a summary of what was done.",
        Effect::ReadOnly,
      )
      .param("summary", ArgKind::String, true, "What was done and where to find it."),
      Capability::new(
        LOG_THOUGHT,
        "Record your reasoning before acting. Does not change anything.",
        Effect::ReadOnly,
      )
      .param("thought", ArgKind::String, true, "Your current reasoning."),
      Capability::new(
        LIST_FILES,
        "List files in the workspace, optionally below a sub-directory.",
        Effect::ReadOnly,
      )
      .param("directory", ArgKind::String, false, "Directory relative to the workspace root."),
      Capability::new(READ_FILE, "Read a text file from the workspace.", Effect::ReadOnly).param(
        "filepath",
        ArgKind::String,
        true,
        "File path relative to the workspace root.",
      ),
      Capability::new(
        WRITE_TO_FILE,
        "Create or overwrite a file in the workspace with the given content.",
        Effect::Mutating,
      )
      .param("filepath", ArgKind::String, true, "File path relative to the workspace root.")
      .param("content", ArgKind::String, true, "Full new content of the file."),
      Capability::new(
        GIT_CREATE_BRANCH,
        "Create a git branch at HEAD and switch to it.",
        Effect::Mutating,
      )
      .param("branch_name", ArgKind::String, true, "Name of the branch."),
      Capability::new(
        GIT_PUSH_ORIGIN,
        "Push the current branch to the origin remote.",
        Effect::Mutating,
      ),
    ]
  }

  /// Bind every local capability to this handler.
  pub fn bind_all(self: &Arc<Self>, timeout: Duration) -> Vec<BoundCapability> {
    Self::catalog()
      .into_iter()
      .map(|capability| {
        BoundCapability::new(capability, Arc::clone(self) as Arc<dyn CapabilityHandler>, timeout)
      })
      .collect()
  }

  fn resolve(&self, relative: &str) -> Result<PathBuf, LocalToolError> {
    fsutil::resolve_in_workspace(&self.work_dir, relative)
      .ok_or_else(|| LocalToolError::OutsideWorkspace(relative.to_string()))
  }

  async fn read_file(&self, relative: &str) -> Result<String, LocalToolError> {
    let path = self.resolve(relative)?;
    match tokio::fs::read_to_string(&path).await {
      Ok(content) if content.is_empty() => Ok("(File is empty)".to_string()),
      Ok(content) => Ok(content),
      Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
        Err(LocalToolError::NotFound(relative.to_string()))
      }
      Err(source) => Err(LocalToolError::Io {
        path: relative.to_string(),
        source,
      }),
    }
  }

  async fn write_file(&self, relative: &str, content: &str) -> Result<String, LocalToolError> {
    let path = self.resolve(relative)?;
    let io_err = |source| LocalToolError::Io {
      path: relative.to_string(),
      source,
    };
    if let Some(parent) = path.parent() {
      tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
    }
    tokio::fs::write(&path, content).await.map_err(io_err)?;
    Ok(format!("Wrote {} bytes to {}.", content.len(), relative))
  }

  async fn list_files(&self, relative: Option<&str>) -> Result<String, LocalToolError> {
    let base = self.resolve(relative.unwrap_or("."))?;
    let root = self.work_dir.clone();
    let shown = relative.unwrap_or(".").to_string();
    let files = tokio::task::spawn_blocking(move || walk(&root, &base))
      .await
      .map_err(|err| LocalToolError::Join(err.to_string()))?
      .map_err(|source| LocalToolError::Io { path: shown, source })?;

    if files.is_empty() {
      return Ok("No files found.".to_string());
    }
    let total = files.len();
    let mut listing: Vec<String> = files.into_iter().take(MAX_LISTED_FILES).collect();
    if total > MAX_LISTED_FILES {
      listing.push(format!("... and {} more", total - MAX_LISTED_FILES));
    }
    Ok(listing.join("\n"))
  }

  async fn create_branch(&self, name: &str) -> Result<String, LocalToolError> {
    let dir = self.work_dir.clone();
    let name = name.to_string();
    tokio::task::spawn_blocking(move || git::create_branch(&dir, &name))
      .await
      .map_err(|err| LocalToolError::Join(err.to_string()))?
      .map_err(|err| LocalToolError::Git(err.message().to_string()))
  }

  async fn push_origin(&self) -> Result<String, LocalToolError> {
    let token = self.github_token.clone().ok_or(LocalToolError::MissingToken)?;
    let dir = self.work_dir.clone();
    let secret = token.clone();
    tokio::task::spawn_blocking(move || git::push_head(&dir, &token))
      .await
      .map_err(|err| LocalToolError::Join(err.to_string()))?
      .map_err(|err| LocalToolError::Git(err.message().replace(&secret, "***")))
  }
}

#[async_trait]
impl CapabilityHandler for LocalCapabilities {
  async fn call(
    &self,
    capability: &str,
    arguments: Map<String, Value>,
  ) -> Result<CallToolResult, InvocationError> {
    let arg = |name: &str| arguments.get(name).and_then(Value::as_str);
    let outcome = match capability {
      FINISH_TASK => Ok("Task marked as finished.".to_string()),
      LOG_THOUGHT => {
        info!(event = "agent_thought", thought = arg("thought").unwrap_or_default());
        Ok("Thought recorded. Proceed with the next step.".to_string())
      }
      LIST_FILES => self.list_files(arg("directory")).await,
      READ_FILE => self.read_file(arg("filepath").unwrap_or_default()).await,
      WRITE_TO_FILE => {
        self
          .write_file(arg("filepath").unwrap_or_default(), arg("content").unwrap_or_default())
          .await
      }
      GIT_CREATE_BRANCH => self.create_branch(arg("branch_name").unwrap_or_default()).await,
      GIT_PUSH_ORIGIN => self.push_origin().await,
      other => return Err(InvocationError::UnknownCapability(other.to_string())),
    };

    Ok(match outcome {
      Ok(text) => CallToolResult {
        content: vec![ContentBlock::text(text)],
        is_error: false,
      },
      Err(err) => CallToolResult {
        content: vec![ContentBlock::text(err.to_string())],
        is_error: true,
      },
    })
  }
}

// Relative paths of all files below `dir`, sorted, skipping `.git`.
fn walk(root: &Path, dir: &Path) -> std::io::Result<Vec<String>> {
  let mut files = Vec::new();
  let mut pending = vec![dir.to_path_buf()];
  while let Some(current) = pending.pop() {
    for entry in std::fs::read_dir(&current)? {
      let entry = entry?;
      let path = entry.path();
      if entry.file_name() == ".git" {
        continue;
      }
      if entry.file_type()?.is_dir() {
        pending.push(path);
      } else if let Ok(relative) = path.strip_prefix(root) {
        files.push(relative.to_string_lossy().into_owned());
      }
    }
  }
  files.sort();
  Ok(files)
}
