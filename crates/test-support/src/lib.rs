use std::path::{Path, PathBuf};
use std::time::Duration;

/// Temporary project root with a `work` checkout beside `.autopilot`.
pub struct TempProject {
  pub root: tempfile::TempDir,
}

impl Default for TempProject {
  fn default() -> Self {
    Self::new()
  }
}

impl TempProject {
  pub fn new() -> Self {
    let root = tempfile::tempdir().expect("tempdir");
    Self { root }
  }

  pub fn path(&self) -> PathBuf {
    self.root.path().to_path_buf()
  }

  /// Where the agent's checkout lives (not created).
  pub fn work_dir(&self) -> PathBuf {
    self.path().join("work")
  }

  /// Transcript files written so far, sorted by name.
  pub fn transcripts(&self) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(self.path().join(".autopilot/transcripts")) else {
      return Vec::new();
    };
    let mut paths: Vec<PathBuf> = entries.map(|entry| entry.unwrap().path()).collect();
    paths.sort();
    paths
  }
}

/// Initialize a git repository at `path` and configure user.
pub fn init_repo_only<P: AsRef<Path>>(path: P) -> git2::Repository {
  let repo = git2::Repository::init(path.as_ref()).expect("init git");
  let mut cfg = repo.config().unwrap();
  cfg.set_str("user.name", "Test").unwrap();
  cfg.set_str("user.email", "test@example.com").unwrap();
  repo
}

/// Initialize a repo with an initial commit on `main` and set HEAD.
pub fn init_repo_with_initial_commit<P: AsRef<Path>>(path: P) -> git2::Repository {
  let repo = init_repo_only(&path);
  // Write a file and commit
  let path_ref = path.as_ref();
  std::fs::write(path_ref.join("README.md"), "hello").unwrap();
  let mut idx = repo.index().unwrap();
  idx.add_path(Path::new("README.md")).unwrap();
  idx.write().unwrap();
  let tree_id = idx.write_tree().unwrap();
  let oid = {
    let tree = repo.find_tree(tree_id).unwrap();
    let sig = repo.signature().unwrap();
    repo
      .commit(Some("HEAD"), &sig, &sig, "init", &tree, &[])
      .unwrap()
  };
  let _ = repo.branch("main", &repo.find_commit(oid).unwrap(), true);
  repo.set_head("refs/heads/main").unwrap();
  repo
}

/// Poll a condition repeatedly until it returns true or times out.
/// Returns true if condition met, false on timeout.
pub async fn poll_until<F, Fut>(timeout: Duration, interval: Duration, mut check: F) -> bool
where
  F: FnMut() -> Fut,
  Fut: std::future::Future<Output = bool>,
{
  use tokio::time::{Instant, sleep};
  let start = Instant::now();
  loop {
    if check().await {
      return true;
    }
    if start.elapsed() >= timeout {
      return false;
    }
    sleep(interval).await;
  }
}

/// Whether a process with `pid` still exists.
#[cfg(unix)]
pub fn process_alive(pid: u32) -> bool {
  std::process::Command::new("kill")
    .args(["-0", &pid.to_string()])
    .stderr(std::process::Stdio::null())
    .status()
    .map(|status| status.success())
    .unwrap_or(false)
}

/// Write an executable shell script into `dir`.
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
  let path = dir.join(name);
  std::fs::write(&path, body).expect("write script");
  #[cfg(unix)]
  {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
  }
  path
}

/// A capability server speaking line-delimited JSON-RPC from `sh`.
///
/// `tools/list` answers with `tools` (must not contain single quotes).
/// `tools/call` answers by tool name:
/// - `fail`: an error result with text `boom`
/// - `silent`: a result without content
/// - `slow`: sleeps five seconds, then answers `late`
/// - a tool with a [`canned_reply`] in `dir`: that text
/// - anything else: `called <name>`
///
/// On start the server writes its pid to [`server_pid`]'s file.
///
/// Requests are expected with `id` as the first key, which holds for
/// serde_json's sorted maps.
pub fn fake_capability_server(dir: &Path, tools: &serde_json::Value) -> PathBuf {
  let body = format!(
    r#"#!/bin/sh
TOOLS='{tools}'
HERE=$(dirname "$0")
echo $$ > "$HERE/fake-capability-server.pid"
echo "fake capability server starting" >&2
while IFS= read -r line; do
  id=$(printf '%s\n' "$line" | sed -n 's/^{{"id":\([0-9]*\).*/\1/p')
  [ -z "$id" ] && continue
  method=$(printf '%s\n' "$line" | sed -n 's/^{{"id":[0-9]*,"jsonrpc":"2.0","method":"\([^"]*\)".*/\1/p')
  case "$method" in
    initialize)
      result='{{"protocolVersion":"2024-11-05","serverInfo":{{"name":"fake","version":"1"}},"capabilities":{{}}}}' ;;
    tools/list)
      result="{{\"tools\":$TOOLS}}" ;;
    tools/call)
      tool=$(printf '%s\n' "$line" | sed -n 's/.*"name":"\([^"]*\)".*/\1/p')
      case "$tool" in
        fail) result='{{"content":[{{"type":"text","text":"boom"}}],"isError":true}}' ;;
        silent) result='{{"content":[]}}' ;;
        slow) sleep 5; result='{{"content":[{{"type":"text","text":"late"}}]}}' ;;
        *) if [ -f "$HERE/replies/$tool" ]; then
             result="{{\"content\":[{{\"type\":\"text\",\"text\":$(cat "$HERE/replies/$tool")}}]}}"
           else
             result="{{\"content\":[{{\"type\":\"text\",\"text\":\"called $tool\"}}]}}"
           fi ;;
      esac ;;
    *) result='{{}}' ;;
  esac
  printf '{{"jsonrpc":"2.0","id":%s,"result":%s}}\n' "$id" "$result"
done
"#,
    tools = tools
  );
  write_script(dir, "fake-capability-server.sh", &body)
}

/// Make the fake server answer `tool` with `text`.
pub fn canned_reply(dir: &Path, tool: &str, text: &str) {
  let replies = dir.join("replies");
  std::fs::create_dir_all(&replies).expect("mkdir replies");
  let literal = serde_json::to_string(text).expect("encode reply");
  std::fs::write(replies.join(tool), literal).expect("write reply");
}

/// Pid written by the fake server started from `dir`, once it is up.
pub fn server_pid(dir: &Path) -> Option<u32> {
  std::fs::read_to_string(dir.join("fake-capability-server.pid"))
    .ok()?
    .trim()
    .parse()
    .ok()
}

/// A server that reads its input but never answers, for handshake timeouts.
pub fn mute_capability_server(dir: &Path) -> PathBuf {
  write_script(
    dir,
    "mute-capability-server.sh",
    "#!/bin/sh\nwhile IFS= read -r line; do :; done\n",
  )
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn git_init_with_commit_creates_main() {
    let td = tempfile::tempdir().unwrap();
    let repo = init_repo_with_initial_commit(td.path());
    // Ensure HEAD points to main
    let head = repo.head().unwrap();
    assert_eq!(head.name(), Some("refs/heads/main"));
  }

  #[test]
  fn fake_server_script_embeds_tools() {
    let td = tempfile::tempdir().unwrap();
    let tools = serde_json::json!([{ "name": "echo", "inputSchema": { "type": "object" } }]);
    let path = fake_capability_server(td.path(), &tools);
    let body = std::fs::read_to_string(path).unwrap();
    assert!(body.contains(r#"TOOLS='[{"inputSchema":{"type":"object"},"name":"echo"}]'"#));
    assert!(body.starts_with("#!/bin/sh\n"));
  }

  #[test]
  fn canned_reply_is_stored_as_a_json_string() {
    let td = tempfile::tempdir().unwrap();
    canned_reply(td.path(), "read_board", "{\"cards\": []}\n");
    let stored = std::fs::read_to_string(td.path().join("replies/read_board")).unwrap();
    assert_eq!(stored, r#""{\"cards\": []}\n""#);
    assert_eq!(server_pid(td.path()), None);
  }

  #[test]
  fn project_lists_no_transcripts_before_a_run() {
    let project = TempProject::new();
    assert!(project.transcripts().is_empty());
    assert_eq!(project.work_dir(), project.path().join("work"));
  }
}
