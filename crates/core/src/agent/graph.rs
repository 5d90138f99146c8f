//! Declarative transition table of the agent graph, validated at startup.

use thiserror::Error;

use crate::config::RolePolicies;
use crate::domain::capability::FINISH_TASK;
use crate::domain::message::ModelTurn;
use crate::domain::role::Role;

/// What a node reported after running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
  /// Router picked a specialist.
  Routed(Role),
  /// Turn invokes the terminal capability.
  Terminal,
  /// Turn carries non-terminal invocations.
  Invocations,
  /// Turn carries text and nothing else.
  TextOnly,
  /// Turn carries neither text nor invocations.
  Degenerate,
  /// Tools or correction finished; hand back to the specialist.
  Resume,
}

/// Where an edge leads. `Origin` is the specialist that produced the last turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
  To(Role),
  Origin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
  pub from: Role,
  pub on: Signal,
  pub to: Target,
}

impl Edge {
  pub const fn new(from: Role, on: Signal, to: Target) -> Self {
    Self { from, on, to }
  }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
  #[error("no transition from {from} on {on:?}")]
  MissingEdge { from: Role, on: Signal },
  #[error("more than one transition from {from} on {on:?}")]
  AmbiguousEdge { from: Role, on: Signal },
  #[error("{from} cannot emit {on:?}")]
  UnexpectedEdge { from: Role, on: Signal },
  #[error("{to} cannot be entered from {from}")]
  IllegalPredecessor { from: Role, to: Role },
  #[error("{from} cannot resume the originating specialist")]
  IllegalResume { from: Role },
  #[error("{from} resumes the originating specialist but none is recorded")]
  MissingOrigin { from: Role },
}

/// Classify a specialist turn. The terminal capability wins over everything.
pub fn classify_turn(turn: &ModelTurn) -> Signal {
  if turn.invocations.iter().any(|inv| inv.name == FINISH_TASK) {
    Signal::Terminal
  } else if !turn.invocations.is_empty() {
    Signal::Invocations
  } else if turn.has_text() {
    Signal::TextOnly
  } else {
    Signal::Degenerate
  }
}

/// Signals each role may emit. Every one needs exactly one edge.
fn expected_signals(role: Role) -> Vec<Signal> {
  match role {
    Role::Router => Role::SPECIALISTS.into_iter().map(Signal::Routed).collect(),
    r if r.is_specialist() => vec![
      Signal::Terminal,
      Signal::Invocations,
      Signal::TextOnly,
      Signal::Degenerate,
    ],
    Role::Tools | Role::Correction => vec![Signal::Resume],
    _ => Vec::new(),
  }
}

fn allowed_predecessor(from: Role, to: Role) -> bool {
  match to {
    Role::Router => false,
    r if r.is_specialist() => from == Role::Router,
    Role::Tools | Role::Correction => from.is_specialist(),
    Role::Done => from.is_specialist(),
    _ => false,
  }
}

#[derive(Debug, Clone)]
pub struct TransitionTable {
  edges: Vec<Edge>,
}

impl TransitionTable {
  /// The standard graph, with text-only handling taken from role policies.
  pub fn build(policies: &RolePolicies) -> Result<Self, GraphError> {
    let mut edges: Vec<Edge> = Role::SPECIALISTS
      .into_iter()
      .map(|role| Edge::new(Role::Router, Signal::Routed(role), Target::To(role)))
      .collect();
    for role in Role::SPECIALISTS {
      let on_text = if policies.policy(role).text_terminates {
        Role::Done
      } else {
        Role::Correction
      };
      edges.push(Edge::new(role, Signal::Terminal, Target::To(Role::Done)));
      edges.push(Edge::new(role, Signal::Invocations, Target::To(Role::Tools)));
      edges.push(Edge::new(role, Signal::TextOnly, Target::To(on_text)));
      edges.push(Edge::new(role, Signal::Degenerate, Target::To(Role::Correction)));
    }
    edges.push(Edge::new(Role::Tools, Signal::Resume, Target::Origin));
    edges.push(Edge::new(Role::Correction, Signal::Resume, Target::Origin));
    Self::from_edges(edges)
  }

  pub fn from_edges(edges: Vec<Edge>) -> Result<Self, GraphError> {
    let table = Self { edges };
    table.validate()?;
    Ok(table)
  }

  /// Completeness, determinism and predecessor checks.
  pub fn validate(&self) -> Result<(), GraphError> {
    for edge in &self.edges {
      if !expected_signals(edge.from).contains(&edge.on) {
        return Err(GraphError::UnexpectedEdge {
          from: edge.from,
          on: edge.on,
        });
      }
      match edge.to {
        Target::To(to) if !allowed_predecessor(edge.from, to) => {
          return Err(GraphError::IllegalPredecessor { from: edge.from, to });
        }
        Target::Origin if !matches!(edge.from, Role::Tools | Role::Correction) => {
          return Err(GraphError::IllegalResume { from: edge.from });
        }
        _ => {}
      }
    }

    for role in Role::ALL {
      for on in expected_signals(role) {
        match self.edges.iter().filter(|e| e.from == role && e.on == on).count() {
          0 => return Err(GraphError::MissingEdge { from: role, on }),
          1 => {}
          _ => return Err(GraphError::AmbiguousEdge { from: role, on }),
        }
      }
    }
    Ok(())
  }

  /// Resolve the successor of `from` on `on`.
  pub fn next(&self, from: Role, on: Signal, origin: Option<Role>) -> Result<Role, GraphError> {
    let edge = self
      .edges
      .iter()
      .find(|e| e.from == from && e.on == on)
      .ok_or(GraphError::MissingEdge { from, on })?;
    match edge.to {
      Target::To(role) => Ok(role),
      Target::Origin => origin
        .filter(|role| role.is_specialist())
        .ok_or(GraphError::MissingOrigin { from }),
    }
  }

  pub fn edges(&self) -> &[Edge] {
    &self.edges
  }
}
