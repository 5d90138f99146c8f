use std::process::ExitCode;

fn main() -> ExitCode {
  // Initialize structured logging early
  let root = std::env::current_dir().unwrap_or_else(|_| std::path::PathBuf::from("."));
  let cfg = autopilot_core::config::load(Some(&root))
    .unwrap_or_else(|_| autopilot_core::config::Config::default());
  let log_path = autopilot_core::adapters::fs::logs_path(&root);
  if let Err(err) = autopilot_core::logging::init(&log_path, cfg.log_level) {
    eprintln!("logging disabled: {err}");
  }

  cli::run()
}
