//! Core library for autopilot.
//!
//! Takes tasks from a board, routes each one to a specialist agent (coder,
//! bugfixer, analyst) and lets it work through capabilities: local file and
//! git tools plus whatever the configured MCP capability servers offer.
//!
//! Quick start:
//! - Load config via `autopilot_core::config::load(Some(project_root))`.
//! - Build a model with `model::HttpChatModel::new`.
//! - Run one task with `cycle::run`, or inspect capabilities with
//!   `cycle::list_capabilities`.
//!
//! The agent graph lives in `agent`; its transition table is validated when
//! the `Orchestrator` is built, so a malformed graph never starts a run.

pub mod adapters;
pub mod agent;
pub mod capability;
pub mod config;
pub mod cycle;
pub mod domain;
pub mod logging;
pub mod model;
pub mod secrets;
pub mod source;
