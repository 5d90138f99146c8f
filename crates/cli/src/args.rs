use clap::{CommandFactory, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
  version,
  about = "Autopilot: works through a task board with specialist agents",
  long_about = None,
  bin_name = "autopilot"
)]
pub struct Cli {
  #[command(subcommand)]
  pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
  /// Take the first open task, work on it and report back
  Run,
  /// Write a default project config to .autopilot/config.toml
  Init,
  /// Start the configured capability servers and list what they offer
  Capabilities,
}

impl Cli {
  pub fn print_help_and_exit() {
    let mut cmd = Cli::command();
    let _ = cmd.print_help();
    println!();
  }
}
