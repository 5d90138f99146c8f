pub mod args;
mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use yansi::Paint;

/// Parse the command line and run one command. Errors are printed as a
/// single line and turned into exit code 1.
pub fn run() -> ExitCode {
  // If no additional args, show help and exit 0
  if std::env::args_os().len() == 1 {
    args::Cli::print_help_and_exit();
    return ExitCode::SUCCESS;
  }

  let cli = args::Cli::parse();
  let root = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
  let result = match cli.command {
    Some(args::Commands::Run) => commands::run::run(&root),
    Some(args::Commands::Init) => commands::init::run(&root),
    Some(args::Commands::Capabilities) => commands::capabilities::run(&root),
    None => {
      args::Cli::print_help_and_exit();
      Ok(())
    }
  };

  match result {
    Ok(()) => ExitCode::SUCCESS,
    Err(err) => {
      tracing::error!(event = "command_failed", error = %format!("{err:#}"));
      eprintln!("{} {err:#}", "error:".red().bold());
      ExitCode::FAILURE
    }
  }
}
