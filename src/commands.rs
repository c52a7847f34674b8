/// Available commands and autocomplete logic

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
  Dashboard,
  Books,
  Borrowed,
  Recommendations,
  Genres,
  Seed,
  Logout,
  Quit,
}

#[derive(Debug, Clone)]
pub struct Command {
  pub name: &'static str,
  pub aliases: &'static [&'static str],
  pub description: &'static str,
  pub kind: CommandKind,
  /// Only offered to staff accounts
  pub admin_only: bool,
}

pub const COMMANDS: &[Command] = &[
  Command {
    name: "dashboard",
    aliases: &["d", "home"],
    description: "Your stats and popular books",
    kind: CommandKind::Dashboard,
    admin_only: false,
  },
  Command {
    name: "books",
    aliases: &["b", "browse", "catalog"],
    description: "Browse and filter the catalog",
    kind: CommandKind::Books,
    admin_only: false,
  },
  Command {
    name: "borrowed",
    aliases: &["my", "loans"],
    description: "Books you have borrowed",
    kind: CommandKind::Borrowed,
    admin_only: false,
  },
  Command {
    name: "recommendations",
    aliases: &["r", "recs", "recommended"],
    description: "Recommended for you",
    kind: CommandKind::Recommendations,
    admin_only: false,
  },
  Command {
    name: "genres",
    aliases: &["g", "genre"],
    description: "Manage genres",
    kind: CommandKind::Genres,
    admin_only: true,
  },
  Command {
    name: "seed",
    aliases: &["setup", "sample"],
    description: "Create sample genres and books",
    kind: CommandKind::Seed,
    admin_only: true,
  },
  Command {
    name: "logout",
    aliases: &["signout"],
    description: "Sign out and clear cached data",
    kind: CommandKind::Logout,
    admin_only: false,
  },
  Command {
    name: "quit",
    aliases: &["q", "exit"],
    description: "Exit booklend",
    kind: CommandKind::Quit,
    admin_only: false,
  },
];

/// Look up a command by its exact name or alias.
pub fn find(input: &str, admin: bool) -> Option<&'static Command> {
  let input = input.trim().to_lowercase();
  COMMANDS
    .iter()
    .filter(|cmd| admin || !cmd.admin_only)
    .find(|cmd| cmd.name == input || cmd.aliases.contains(&input.as_str()))
}

/// Get autocomplete suggestions for a given input
pub fn get_suggestions(input: &str, admin: bool) -> Vec<&'static Command> {
  let input_lower = input.trim().to_lowercase();
  let visible = COMMANDS.iter().filter(|cmd| admin || !cmd.admin_only);

  if input_lower.is_empty() {
    return visible.collect();
  }

  let mut matches: Vec<(&Command, u32)> = visible
    .filter_map(|cmd| {
      let priority = if cmd.name == input_lower {
        0
      } else if cmd.aliases.contains(&input_lower.as_str()) {
        1
      } else if cmd.name.starts_with(&input_lower) {
        2
      } else if cmd.aliases.iter().any(|a| a.starts_with(&input_lower)) {
        3
      } else if cmd.name.contains(&input_lower) {
        4
      } else if cmd.aliases.iter().any(|a| a.contains(&input_lower)) {
        5
      } else {
        return None;
      };
      Some((cmd, priority))
    })
    .collect();

  // Stable, so equal priorities keep declaration order
  matches.sort_by_key(|(_, priority)| *priority);
  matches.into_iter().map(|(cmd, _)| cmd).collect()
}
