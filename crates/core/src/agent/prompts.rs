use crate::domain::role::Role;

pub const ROUTER_SYSTEM: &str = "\
You are a technical lead triaging incoming work for a team of agents.

Pick exactly one specialist:
- CODER: new features, new files, refactoring.
- BUGFIXER: fixing errors, debugging, broken behaviour in existing code.
- ANALYST: explaining code, reviewing design, answering questions. No code changes.

Reply with the category name only: CODER, BUGFIXER or ANALYST.";

const SHARED_RULES: &str = "\
You are an autonomous engineering agent working inside a git checkout.
Solve the task with the capabilities you are given; every step is a capability call.

Rules:
1. Do not chat. Explain your reasoning with log_thought.
2. Code only exists once it is written with write_to_file.
3. Stage, commit and push your work (git_push_origin) before calling finish_task.
4. finish_task ends the job; its summary is posted back on the task.";

const CODER_CHECKLIST: &str = "\
Role: CODER (feature work)

Checklist:
1. Explore with list_files and read_file.
2. Plan with log_thought.
3. Create a feature branch with git_create_branch.
4. Implement with write_to_file. Complete code, no placeholders.
5. Save: git_add, git_commit, git_push_origin.
6. finish_task with a summary of the change.";

const BUGFIXER_CHECKLIST: &str = "\
Role: BUGFIXER (error correction)

Checklist:
1. Read the failing code with read_file.
2. Locate the cause and plan the fix with log_thought.
3. Create a fix branch with git_create_branch.
4. Apply the fix with write_to_file.
5. Save: git_add, git_commit, git_push_origin.
6. finish_task describing cause and fix.";

const ANALYST_SYSTEM: &str = "\
You are a code consultant. Answer the question using the code in the checkout.
You can only read: list_files, read_file and log_thought. You cannot modify anything.

Workflow:
1. Explore with list_files.
2. Read the relevant files with read_file.
3. Think with log_thought.
4. Answer in plain text, or call finish_task with the answer as summary.";

/// Appended as a human message after a text-only or empty turn.
pub const CORRECTION_DIRECTIVE: &str = "\
You replied without calling a capability. Stop planning and act now: \
call the next capability on your checklist, or finish_task if the work is done.";

/// System prompt for a specialist role.
pub fn specialist_system(role: Role, repo_url: Option<&str>) -> String {
  let body = match role {
    Role::Bugfixer => format!("{SHARED_RULES}\n\n{BUGFIXER_CHECKLIST}"),
    Role::Analyst => ANALYST_SYSTEM.to_string(),
    _ => format!("{SHARED_RULES}\n\n{CODER_CHECKLIST}"),
  };
  match repo_url {
    Some(url) => format!("{body}\n\nRepository: {url}"),
    None => body,
  }
}

/// Directive added to the request after an empty answer.
pub fn forcing_directive(role: Role) -> String {
  match role {
    Role::Analyst => {
      "Your last answer was empty. Call read_file or list_files now, or answer in text.".to_string()
    }
    _ => "Your last answer was empty. Stop thinking and call a capability now, \
          for example write_to_file with the complete content."
      .to_string(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn prompts_differ_per_role_and_include_repo() {
    let coder = specialist_system(Role::Coder, Some("https://example.com/r.git"));
    assert!(coder.contains("CODER"));
    assert!(coder.ends_with("Repository: https://example.com/r.git"));
    assert!(specialist_system(Role::Bugfixer, None).contains("BUGFIXER"));
    let analyst = specialist_system(Role::Analyst, None);
    assert!(analyst.contains("cannot modify"));
    assert!(!analyst.contains("git_push_origin"));
  }
}
