//! One task cycle: prepare the workspace, start capability servers, take the
//! first open task, run the agent graph on it and report back.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{Instrument, error, info, warn};

use crate::adapters::{fs as fsutil, git};
use crate::agent::{GraphError, Orchestrator, OrchestratorError, OrchestratorSettings, Outcome};
use crate::capability::launch::{build_env, server_command};
use crate::capability::{
  AdapterError, CapabilitySet, EffectClassifier, LocalCapabilities, SessionScope,
};
use crate::config::{Config, TaskSourceConfig};
use crate::domain::capability::Capability;
use crate::domain::message::Conversation;
use crate::domain::task::{Task, TaskStatus};
use crate::logging;
use crate::model::ChatModel;
use crate::secrets::Secrets;
use crate::source::{SourceError, TaskAppSource, TaskSource, TrelloSource};

pub const STARTED_COMMENT: &str = "🤖 Agent processing started...";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
  /// The source had no open task.
  Idle,
  Completed {
    task_id: String,
    summary: String,
    steps: usize,
  },
}

#[derive(Debug, Error)]
pub enum CycleError {
  #[error("no task source configured; add a [task_source] table")]
  NoTaskSource,
  #[error("task source server `{0}` is not configured")]
  MissingSourceServer(String),
  #[error("missing credentials: {0}")]
  MissingCredentials(&'static str),
  #[error("workspace bootstrap failed: {0}")]
  Bootstrap(String),
  #[error(transparent)]
  Adapter(#[from] AdapterError),
  #[error(transparent)]
  Source(#[from] SourceError),
  #[error(transparent)]
  Graph(#[from] GraphError),
  #[error("task {task_id} failed: {reason}")]
  TaskFailed { task_id: String, reason: String },
  #[error("task {task_id} stopped after {steps} steps without finishing")]
  StepBoundExceeded { task_id: String, steps: usize },
}

/// Capability servers opened for one cycle, with their capabilities bound.
pub struct Session {
  scope: SessionScope,
  /// Local capabilities plus everything every server offered.
  pub capabilities: CapabilitySet,
}

impl Session {
  /// Start every configured server. Any startup failure stops the servers
  /// already running and is returned.
  pub async fn open(config: &Config, secrets: &Secrets, work_dir: &Path) -> Result<Self, CycleError> {
    let local = Arc::new(LocalCapabilities::new(
      work_dir,
      secrets.github_token().map(str::to_string),
    ));
    let mut capabilities = CapabilitySet::new();
    capabilities.extend(local.bind_all(config.timeouts.capability()));

    let classifier = EffectClassifier::new(config.capabilities.mutating_markers.iter().cloned());
    let env = build_env(work_dir, config.repo_url.as_deref(), secrets);
    let mut scope = SessionScope::new();
    for (name, server) in &config.servers {
      let command = server_command(name, server, &env, work_dir);
      let connected = scope
        .connect(
          &command,
          &classifier,
          config.timeouts.handshake(),
          config.timeouts.capability(),
        )
        .await;
      match connected {
        Ok(adapter) => capabilities.extend(adapter.bind_all()),
        Err(err) => {
          error!(event = "capability_server_failed", server = %name, error = %err);
          scope.close().await;
          return Err(err.into());
        }
      }
    }

    Ok(Self {
      scope,
      capabilities,
    })
  }

  /// Capabilities of a single server, for task sources driven through one.
  pub fn server_capabilities(&self, server: &str) -> Option<CapabilitySet> {
    let adapter = self
      .scope
      .adapters()
      .iter()
      .find(|adapter| adapter.name() == server)?;
    let mut set = CapabilitySet::new();
    set.extend(adapter.bind_all());
    Some(set)
  }

  pub async fn close(self) {
    self.scope.close().await;
  }
}

/// Run one cycle end to end. Servers are closed on every path.
pub async fn run(
  config: &Config,
  secrets: &Secrets,
  model: Arc<dyn ChatModel>,
  project_root: &Path,
) -> Result<CycleOutcome, CycleError> {
  if config.task_source.is_none() {
    return Err(CycleError::NoTaskSource);
  }
  let work_dir = config.resolve_work_dir(project_root);
  bootstrap(&work_dir, config.repo_url.clone()).await?;

  let session = Session::open(config, secrets, &work_dir).await?;
  let result = run_in_session(config, secrets, model, project_root, &session).await;
  session.close().await;
  result
}

async fn run_in_session(
  config: &Config,
  secrets: &Secrets,
  model: Arc<dyn ChatModel>,
  project_root: &Path,
  session: &Session,
) -> Result<CycleOutcome, CycleError> {
  let source = build_source(config, secrets, session)?;
  let orchestrator = Orchestrator::new(
    model,
    &session.capabilities,
    OrchestratorSettings::from_config(config),
  )?;
  work_on_next(source.as_ref(), &orchestrator, project_root).await
}

async fn bootstrap(work_dir: &Path, repo_url: Option<String>) -> Result<(), CycleError> {
  let dir = work_dir.to_path_buf();
  let outcome = tokio::task::spawn_blocking(move || {
    std::fs::create_dir_all(&dir).map_err(|err| err.to_string())?;
    git::ensure_repository(&dir, repo_url.as_deref()).map_err(|err| err.message().to_string())
  })
  .await
  .map_err(|err| CycleError::Bootstrap(err.to_string()))?
  .map_err(CycleError::Bootstrap)?;
  info!(event = "workspace_ready", work_dir = %work_dir.display(), bootstrap = ?outcome);
  Ok(())
}

fn build_source(
  config: &Config,
  secrets: &Secrets,
  session: &Session,
) -> Result<Box<dyn TaskSource>, CycleError> {
  match config.task_source.as_ref() {
    None => Err(CycleError::NoTaskSource),
    Some(TaskSourceConfig::Trello(trello)) => {
      let capabilities = session
        .server_capabilities(&trello.server)
        .ok_or_else(|| CycleError::MissingSourceServer(trello.server.clone()))?;
      Ok(Box::new(TrelloSource::new(trello.clone(), capabilities)))
    }
    Some(TaskSourceConfig::TaskApp(app)) => {
      let (username, password) = secrets.task_app_credentials().ok_or(
        CycleError::MissingCredentials(
          "AUTOPILOT_TASK_APP_USERNAME and AUTOPILOT_TASK_APP_PASSWORD must be set",
        ),
      )?;
      Ok(Box::new(TaskAppSource::new(app, username, password)?))
    }
  }
}

/// Take the first open task from `source`, run it and write the result back.
pub async fn work_on_next(
  source: &dyn TaskSource,
  orchestrator: &Orchestrator,
  project_root: &Path,
) -> Result<CycleOutcome, CycleError> {
  let Some(raw) = source.poll().await? else {
    info!(event = "no_open_tasks", source = source.name());
    return Ok(CycleOutcome::Idle);
  };
  let tasks = source.parse(&raw)?;
  let Some(task) = tasks.into_iter().find(|task| task.status == TaskStatus::Open) else {
    info!(event = "no_open_tasks", source = source.name());
    return Ok(CycleOutcome::Idle);
  };
  let span = logging::task_span(source.name(), &task.id);
  process(source, orchestrator, project_root, task)
    .instrument(span)
    .await
}

async fn process(
  source: &dyn TaskSource,
  orchestrator: &Orchestrator,
  project_root: &Path,
  task: Task,
) -> Result<CycleOutcome, CycleError> {
  info!(event = "task_picked", title = %task.title);

  source.comment(&task.id, STARTED_COMMENT).await?;
  source.transition(&task.id, TaskStatus::InProgress).await?;

  let result = orchestrator.run(&task).await;
  if let Ok(report) = &result {
    save_transcript(project_root, &task, &report.conversation).await;
  }

  match result {
    Ok(report) if report.outcome == Outcome::Completed => {
      source
        .comment(&task.id, &format!("🤖 Job Done.\n\nSummary:\n{}", report.summary))
        .await?;
      source.transition(&task.id, TaskStatus::Review).await?;
      info!(event = "task_completed", task_id = %task.id, steps = report.steps);
      Ok(CycleOutcome::Completed {
        task_id: task.id,
        summary: report.summary,
        steps: report.steps,
      })
    }
    Ok(report) => {
      let err = CycleError::StepBoundExceeded {
        task_id: task.id.clone(),
        steps: report.steps,
      };
      report_failure(source, &task, &err.to_string()).await;
      Err(err)
    }
    Err(err) => {
      let err = orchestrator_failure(&task, err);
      report_failure(source, &task, &err.to_string()).await;
      Err(err)
    }
  }
}

fn orchestrator_failure(task: &Task, err: OrchestratorError) -> CycleError {
  CycleError::TaskFailed {
    task_id: task.id.clone(),
    reason: err.to_string(),
  }
}

/// Best effort: the original failure is what the caller sees.
async fn report_failure(source: &dyn TaskSource, task: &Task, reason: &str) {
  error!(event = "task_failed", task_id = %task.id, reason);
  if let Err(err) = source.comment(&task.id, &format!("💥 Agent failed: {reason}")).await {
    warn!(event = "write_back_failed", task_id = %task.id, error = %err, "comment");
  }
  if let Err(err) = source.transition(&task.id, TaskStatus::Failed).await {
    warn!(event = "write_back_failed", task_id = %task.id, error = %err, "transition");
  }
}

async fn save_transcript(project_root: &Path, task: &Task, conversation: &Conversation) {
  let stamp = Utc::now().format("%Y%m%dT%H%M%SZ").to_string();
  let path = fsutil::transcript_path(project_root, &task.id, &stamp);
  match write_transcript(&path, conversation).await {
    Ok(()) => info!(event = "transcript_saved", path = %path.display()),
    Err(err) => warn!(event = "transcript_failed", path = %path.display(), error = %err),
  }
}

async fn write_transcript(path: &Path, conversation: &Conversation) -> std::io::Result<()> {
  if let Some(parent) = path.parent() {
    tokio::fs::create_dir_all(parent).await?;
  }
  let body = serde_json::to_vec_pretty(&conversation.to_wire()).map_err(std::io::Error::other)?;
  tokio::fs::write(path, body).await
}

/// Start every server, collect what it offers alongside the local
/// capabilities, and stop them again.
pub async fn list_capabilities(
  config: &Config,
  secrets: &Secrets,
  project_root: &Path,
) -> Result<Vec<Capability>, CycleError> {
  let work_dir = config.resolve_work_dir(project_root);
  bootstrap(&work_dir, config.repo_url.clone()).await?;
  let session = Session::open(config, secrets, &work_dir).await?;
  let capabilities = session.capabilities.capabilities().cloned().collect();
  session.close().await;
  Ok(capabilities)
}
