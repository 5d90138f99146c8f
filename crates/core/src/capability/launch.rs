use std::collections::HashMap;
use std::path::Path;

use mcp::ServerCommand;

use crate::config::ServerConfig;
use crate::secrets::Secrets;

/// Tokens available to server commands and environment values as `$NAME`.
pub fn build_env(work_dir: &Path, repo_url: Option<&str>, secrets: &Secrets) -> HashMap<String, String> {
  let mut env = HashMap::new();
  env.insert("AUTOPILOT_WORK_DIR".to_string(), path_to_string(work_dir));
  if let Some(url) = repo_url {
    env.insert("AUTOPILOT_REPO_URL".to_string(), url.to_string());
  }
  for (name, value) in secrets.tokens() {
    env.insert(name.to_string(), value.to_string());
  }
  env
}

/// Replace `$NAME` tokens. Longer names are substituted first so that
/// `$AUTOPILOT_WORK_DIR` is never clobbered by a shorter `$AUTOPILOT_WORK`.
pub fn substitute_tokens(args: &[String], env: &HashMap<String, String>) -> Vec<String> {
  let mut keys: Vec<&String> = env.keys().collect();
  keys.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
  args
    .iter()
    .map(|arg| {
      let mut substituted = arg.clone();
      for env_key in &keys {
        let token = format!("${}", env_key);
        if substituted.contains(&token) {
          substituted = substituted.replace(&token, &env[*env_key]);
        }
      }
      substituted
    })
    .collect()
}

/// Resolve a configured server into a launchable command.
/// The caller guarantees `server.command` is non-empty (checked at config load).
pub fn server_command(
  name: &str,
  server: &ServerConfig,
  env: &HashMap<String, String>,
  work_dir: &Path,
) -> ServerCommand {
  let command = substitute_tokens(&server.command, env);
  let mut parts = command.into_iter();
  let program = parts.next().unwrap_or_default();
  let args = parts.collect();

  let server_env = server
    .env
    .iter()
    .map(|(key, value)| {
      let value = substitute_tokens(std::slice::from_ref(value), env)
        .pop()
        .unwrap_or_default();
      (key.clone(), value)
    })
    .collect();

  ServerCommand {
    name: name.to_string(),
    program,
    args,
    env: server_env,
    cwd: work_dir.is_dir().then(|| work_dir.to_path_buf()),
  }
}

fn path_to_string(path: &Path) -> String {
  path.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::BTreeMap;

  fn secrets() -> Secrets {
    Secrets::from_lookup(&["TRELLO_TOKEN".to_string()], |name| match name {
      "GITHUB_TOKEN" => Some("gh".to_string()),
      "TRELLO_TOKEN" => Some("tr".to_string()),
      _ => None,
    })
  }

  #[test]
  fn build_env_populates_expected_keys() {
    let env = build_env(Path::new("/tmp/work"), Some("https://x/repo.git"), &secrets());
    assert_eq!(env.get("AUTOPILOT_WORK_DIR").map(String::as_str), Some("/tmp/work"));
    assert_eq!(
      env.get("AUTOPILOT_REPO_URL").map(String::as_str),
      Some("https://x/repo.git")
    );
    assert_eq!(env.get("GITHUB_TOKEN").map(String::as_str), Some("gh"));
    assert_eq!(env.get("TRELLO_TOKEN").map(String::as_str), Some("tr"));

    let env = build_env(Path::new("/tmp/work"), None, &Secrets::default());
    assert!(!env.contains_key("AUTOPILOT_REPO_URL"));
    assert!(!env.contains_key("GITHUB_TOKEN"));
  }

  #[test]
  fn substitute_tokens_replaces_matching_placeholders() {
    let mut env = HashMap::new();
    env.insert("AUTOPILOT_WORK".to_string(), "short".to_string());
    env.insert("AUTOPILOT_WORK_DIR".to_string(), "/w".to_string());
    let args = vec![
      "--repository".to_string(),
      "$AUTOPILOT_WORK_DIR".to_string(),
      "x=$AUTOPILOT_WORK".to_string(),
      "$UNKNOWN".to_string(),
    ];
    assert_eq!(
      substitute_tokens(&args, &env),
      vec!["--repository", "/w", "x=short", "$UNKNOWN"]
    );
  }

  #[test]
  fn server_command_substitutes_args_and_env() {
    let td = tempfile::tempdir().unwrap();
    let mut server_env = BTreeMap::new();
    server_env.insert("TRELLO_TOKEN".to_string(), "$TRELLO_TOKEN".to_string());
    let server = ServerConfig {
      command: vec![
        "uvx".to_string(),
        "mcp-server-git".to_string(),
        "--repository".to_string(),
        "$AUTOPILOT_WORK_DIR".to_string(),
      ],
      env: server_env,
    };
    let env = build_env(td.path(), None, &secrets());
    let cmd = server_command("git", &server, &env, td.path());
    assert_eq!(cmd.name, "git");
    assert_eq!(cmd.program, "uvx");
    assert_eq!(cmd.args[2], td.path().to_string_lossy());
    assert_eq!(cmd.env["TRELLO_TOKEN"], "tr");
    assert_eq!(cmd.cwd.as_deref(), Some(td.path()));

    let missing = server_command("git", &server, &env, &td.path().join("absent"));
    assert_eq!(missing.cwd, None);
  }
}
