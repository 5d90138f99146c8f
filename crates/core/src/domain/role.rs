use std::fmt;

use serde::{Deserialize, Serialize};

/// Node of the agent graph. `Router` is the entry point, `Done` the only exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
  Router,
  Coder,
  Bugfixer,
  Analyst,
  Tools,
  Correction,
  Done,
}

impl Role {
  pub const ALL: [Role; 7] = [
    Role::Router,
    Role::Coder,
    Role::Bugfixer,
    Role::Analyst,
    Role::Tools,
    Role::Correction,
    Role::Done,
  ];

  /// Roles that produce model turns and own a capability scope.
  pub const SPECIALISTS: [Role; 3] = [Role::Coder, Role::Bugfixer, Role::Analyst];

  pub fn is_specialist(self) -> bool {
    matches!(self, Role::Coder | Role::Bugfixer | Role::Analyst)
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Role::Router => "ROUTER",
      Role::Coder => "CODER",
      Role::Bugfixer => "BUGFIXER",
      Role::Analyst => "ANALYST",
      Role::Tools => "TOOLS",
      Role::Correction => "CORRECTION",
      Role::Done => "DONE",
    }
  }

  /// Case-insensitive lookup restricted to specialist keywords.
  pub fn specialist_from_keyword(keyword: &str) -> Option<Role> {
    Role::SPECIALISTS
      .into_iter()
      .find(|role| role.as_str().eq_ignore_ascii_case(keyword))
  }
}

impl fmt::Display for Role {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}
