use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use autopilot_core::config;
use autopilot_core::cycle::{self, CycleOutcome};
use autopilot_core::model::HttpChatModel;
use autopilot_core::secrets::Secrets;
use yansi::Paint;

pub fn run(root: &Path) -> Result<()> {
  let config = config::load(Some(root)).context("failed to load config")?;
  let secrets = Secrets::from_env(&config.secret_env);
  let model = HttpChatModel::new(config.model.clone(), secrets.model_api_key())
    .context("cannot reach the model")?;

  let outcome = super::runtime()?.block_on(cycle::run(&config, &secrets, Arc::new(model), root))?;
  match outcome {
    CycleOutcome::Idle => println!("no open tasks"),
    CycleOutcome::Completed {
      task_id,
      summary,
      steps,
    } => {
      println!("{} task {} in {} steps", "done".green().bold(), task_id.bold(), steps);
      println!();
      println!("{summary}");
    }
  }
  Ok(())
}
