use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::correction;
use super::graph::{GraphError, Signal, TransitionTable, classify_turn};
use super::router::Router;
use super::specialist::Specialist;
use super::summary::{NO_SUMMARY, extract_summary, truncate_summary};
use super::tools::execute_pending;
use crate::capability::CapabilitySet;
use crate::config::{Config, RolePolicies};
use crate::domain::message::{Conversation, ConversationError};
use crate::domain::role::Role;
use crate::domain::task::Task;
use crate::model::ChatModel;

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
  pub step_bound: usize,
  pub summary_limit: usize,
  pub repo_url: Option<String>,
  pub policies: RolePolicies,
}

impl Default for OrchestratorSettings {
  fn default() -> Self {
    Self::from_config(&Config::default())
  }
}

impl OrchestratorSettings {
  pub fn from_config(config: &Config) -> Self {
    Self {
      step_bound: config.step_bound,
      summary_limit: config.summary_limit,
      repo_url: config.repo_url.clone(),
      policies: config.roles,
    }
  }
}

/// Per-run state. Each run owns its own; nothing is shared between runs.
#[derive(Debug, Clone)]
pub struct AgentState {
  pub conversation: Conversation,
  pub current_role: Role,
  /// Specialist that produced the latest turn.
  pub origin: Option<Role>,
}

impl AgentState {
  pub fn new(task: &Task) -> Self {
    let mut conversation = Conversation::new();
    conversation.push_human(task.prompt());
    Self {
      conversation,
      current_role: Role::Router,
      origin: None,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
  Completed,
  StepBoundExceeded,
}

#[derive(Debug, Clone)]
pub struct ExecutionReport {
  pub outcome: Outcome,
  pub summary: String,
  /// Specialist chosen by the router, if routing happened.
  pub specialist: Option<Role>,
  pub steps: usize,
  pub conversation: Conversation,
}

#[derive(Debug, Error)]
pub enum OrchestratorError {
  #[error(transparent)]
  Graph(#[from] GraphError),
  #[error(transparent)]
  Conversation(#[from] ConversationError),
  #[error("no specialist registered for {0}")]
  MissingSpecialist(Role),
}

/// Drives one task through ROUTER, a specialist, TOOLS and CORRECTION until DONE.
pub struct Orchestrator {
  router: Router,
  specialists: BTreeMap<Role, Specialist>,
  table: TransitionTable,
  settings: OrchestratorSettings,
}

impl Orchestrator {
  /// Builds and validates the transition table; a malformed graph fails here.
  pub fn new(
    model: Arc<dyn ChatModel>,
    capabilities: &CapabilitySet,
    settings: OrchestratorSettings,
  ) -> Result<Self, GraphError> {
    let table = TransitionTable::build(&settings.policies)?;
    let specialists = Role::SPECIALISTS
      .into_iter()
      .map(|role| {
        let specialist = Specialist::new(
          role,
          Arc::clone(&model),
          capabilities,
          settings.repo_url.as_deref(),
        );
        (role, specialist)
      })
      .collect();
    Ok(Self {
      router: Router::new(model),
      specialists,
      table,
      settings,
    })
  }

  pub fn specialist(&self, role: Role) -> Option<&Specialist> {
    self.specialists.get(&role)
  }

  fn require(&self, role: Option<Role>) -> Result<&Specialist, OrchestratorError> {
    let role = role.ok_or(GraphError::MissingOrigin { from: Role::Tools })?;
    self
      .specialists
      .get(&role)
      .ok_or(OrchestratorError::MissingSpecialist(role))
  }

  pub async fn run(&self, task: &Task) -> Result<ExecutionReport, OrchestratorError> {
    let mut state = AgentState::new(task);
    let mut specialist = None;
    let mut steps = 0usize;
    info!(event = "run_started", task_id = %task.id, step_bound = self.settings.step_bound);

    loop {
      let role = state.current_role;
      let signal = match role {
        Role::Router => {
          let chosen = self.router.classify(&state.conversation).await;
          specialist = Some(chosen);
          Signal::Routed(chosen)
        }
        Role::Tools => {
          let scope = self.require(state.origin)?.capabilities();
          execute_pending(&mut state.conversation, scope).await?;
          Signal::Resume
        }
        Role::Correction => {
          let origin = state
            .origin
            .ok_or(GraphError::MissingOrigin { from: Role::Correction })?;
          correction::apply(&mut state.conversation, origin);
          Signal::Resume
        }
        Role::Done => break,
        _ => {
          let turn = self.require(Some(role))?.take_turn(&state.conversation).await;
          let signal = classify_turn(&turn);
          state.conversation.push_turn(turn);
          state.origin = Some(role);
          signal
        }
      };

      let next = self.table.next(role, signal, state.origin)?;
      if next != Role::Done && steps >= self.settings.step_bound {
        warn!(
          event = "step_bound_exceeded",
          task_id = %task.id,
          steps,
          role = %role,
          "halting run"
        );
        return Ok(ExecutionReport {
          outcome: Outcome::StepBoundExceeded,
          summary: NO_SUMMARY.to_string(),
          specialist,
          steps,
          conversation: state.conversation,
        });
      }
      steps += 1;
      debug!(event = "transition", from = %role, to = %next, signal = ?signal, step = steps);
      state.current_role = next;
    }

    let summary = truncate_summary(&extract_summary(&state.conversation), self.settings.summary_limit);
    info!(event = "run_completed", task_id = %task.id, steps, summary_len = summary.len());
    Ok(ExecutionReport {
      outcome: Outcome::Completed,
      summary,
      specialist,
      steps,
      conversation: state.conversation,
    })
  }
}
