use std::path::Path;

use anyhow::{Context, Result};
use autopilot_core::config;
use autopilot_core::cycle;
use autopilot_core::domain::capability::Capability;
use autopilot_core::secrets::Secrets;

pub fn run(root: &Path) -> Result<()> {
  let config = config::load(Some(root)).context("failed to load config")?;
  let secrets = Secrets::from_env(&config.secret_env);
  let capabilities = super::runtime()?.block_on(cycle::list_capabilities(&config, &secrets, root))?;
  print!("{}", render(&capabilities));
  Ok(())
}

/// One row per capability: name, effect, first line of the description.
pub fn render(capabilities: &[Capability]) -> String {
  let width = capabilities
    .iter()
    .map(|c| c.name.len())
    .max()
    .unwrap_or(4)
    .max(4);
  let mut out = format!("{:<width$}  {:<9}  DESCRIPTION\n", "NAME", "EFFECT");
  for capability in capabilities {
    let effect = if capability.is_mutating() {
      "mutating"
    } else {
      "read-only"
    };
    let description = capability.description.lines().next().unwrap_or_default();
    out.push_str(&format!("{:<width$}  {:<9}  {}\n", capability.name, effect, description));
  }
  out
}

#[cfg(test)]
mod tests {
  use super::*;
  use autopilot_core::domain::capability::Effect;
  use pretty_assertions::assert_eq;

  #[test]
  fn renders_aligned_rows() {
    let caps = vec![
      Capability::new("read_file", "Read a file.\nMore detail.", Effect::ReadOnly),
      Capability::new("git_push_origin", "Push.", Effect::Mutating),
    ];
    assert_eq!(
      render(&caps),
      "\
NAME             EFFECT     DESCRIPTION
read_file        read-only  Read a file.
git_push_origin  mutating   Push.
"
    );
  }
}
