//! JSON-lines logging for the autopilot binary.
//!
//! Everything a cycle logs while working on a task runs inside [`task_span`],
//! so each line carries the task id and its source under `span`.

use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::OnceLock;

use crate::config::LogLevel;
use tracing::{Span, info, info_span, subscriber::set_global_default};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::{EnvFilter, Registry, fmt, layer::SubscriberExt};

/// Filter directives that replace the configured level, e.g. `mcp=debug,info`.
pub const LOG_ENV: &str = "AUTOPILOT_LOG";

static WORKER_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Start appending JSON lines to `logs_path`. Only the first call installs a
/// subscriber.
pub fn init(logs_path: &Path, level: LogLevel) -> std::io::Result<()> {
  if let Some(parent) = logs_path.parent() {
    fs::create_dir_all(parent)?;
  }
  let file = OpenOptions::new().create(true).append(true).open(logs_path)?;

  let (writer, guard) = tracing_appender::non_blocking(file);
  let _ = WORKER_GUARD.set(guard);

  let overridden = std::env::var(LOG_ENV).ok();
  let filter = filter_for(level, overridden.as_deref());

  let json_layer = fmt::layer()
    .with_timer(ChronoUtc::rfc_3339())
    .json()
    .with_current_span(true)
    .with_span_list(false)
    .with_level(true)
    .with_target(true)
    .with_thread_ids(false)
    .with_thread_names(false)
    .with_writer(move || writer.clone());

  let _ = set_global_default(Registry::default().with(filter).with(json_layer));

  info!(
    event = "logging_initialized",
    logs_path = %logs_path.display(),
    level = ?level,
    overridden = overridden.is_some()
  );
  Ok(())
}

/// Span wrapping the work on one task.
pub fn task_span(source: &str, task_id: &str) -> Span {
  info_span!("task", source, task_id)
}

fn filter_for(level: LogLevel, overridden: Option<&str>) -> EnvFilter {
  if let Some(directives) = overridden.filter(|d| !d.trim().is_empty())
    && let Ok(filter) = EnvFilter::try_new(directives)
  {
    return filter;
  }
  let base = level_directive(level);
  if level == LogLevel::Off {
    return EnvFilter::new(base);
  }
  // The HTTP client stack is chatty below warn.
  EnvFilter::new(format!("{base},hyper=warn,reqwest=warn"))
}

fn level_directive(level: LogLevel) -> &'static str {
  match level {
    LogLevel::Off => "off",
    LogLevel::Warn => "warn",
    LogLevel::Info => "info",
    LogLevel::Debug => "debug",
    LogLevel::Trace => "trace",
  }
}
