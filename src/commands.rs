/// Browse-mode commands and input parsing

#[derive(Debug, Clone)]
pub struct Command {
  pub name: &'static str,
  pub aliases: &'static [&'static str],
  pub usage: &'static str,
  pub description: &'static str,
}

/// All available commands
pub const COMMANDS: &[Command] = &[
  Command {
    name: "page",
    aliases: &["p"],
    usage: ":page N",
    description: "Go to page N",
  },
  Command {
    name: "limit",
    aliases: &["l"],
    usage: ":limit N",
    description: "Set page size (back to page 1)",
  },
  Command {
    name: "filter",
    aliases: &["f"],
    usage: ":filter name=value",
    description: "Set a filter such as industry=Software (empty value clears it)",
  },
  Command {
    name: "clear",
    aliases: &["c", "reset"],
    usage: ":clear",
    description: "Reset all filters and refetch",
  },
  Command {
    name: "back",
    aliases: &["b", "revisit"],
    usage: ":back",
    description: "Navigate away and back again",
  },
  Command {
    name: "help",
    aliases: &["h", "?"],
    usage: ":help",
    description: "Show commands",
  },
  Command {
    name: "quit",
    aliases: &["q", "exit"],
    usage: ":quit",
    description: "Exit",
  },
];

/// One line of browse-mode input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
  /// Free text, fed to the debounced search
  Search(String),
  Page(u32),
  Limit(u32),
  Filter { name: String, value: Option<String> },
  Clear,
  Back,
  Help,
  Quit,
}

/// Find a command by exact name, exact alias, or unique-enough prefix
pub fn resolve(input: &str) -> Option<&'static Command> {
  let input_lower = input.to_lowercase();
  if input_lower.is_empty() {
    return None;
  }

  let mut matches: Vec<(&Command, u32)> = Vec::new();

  for cmd in COMMANDS {
    // Exact match on name
    if cmd.name == input_lower {
      matches.push((cmd, 0));
      continue;
    }

    // Exact match on alias
    if cmd.aliases.contains(&input_lower.as_str()) {
      matches.push((cmd, 1));
      continue;
    }

    // Prefix match on name
    if cmd.name.starts_with(&input_lower) {
      matches.push((cmd, 2));
    }
  }

  matches.sort_by_key(|(_, priority)| *priority);
  matches.first().map(|(cmd, _)| *cmd)
}

/// Parse a line. Lines starting with `:` are commands; anything else is search
/// text.
pub fn parse(line: &str) -> Result<Input, String> {
  let Some(rest) = line.strip_prefix(':') else {
    return Ok(Input::Search(line.to_string()));
  };

  let (name, arg) = match rest.trim().split_once(char::is_whitespace) {
    Some((name, arg)) => (name, arg.trim()),
    None => (rest.trim(), ""),
  };
  let cmd = resolve(name).ok_or_else(|| format!("Unknown command: {}", name))?;

  let number = |arg: &str| {
    arg
      .parse::<u32>()
      .ok()
      .filter(|n| *n > 0)
      .ok_or_else(|| format!("Usage: {}", cmd.usage))
  };

  match cmd.name {
    "page" => number(arg).map(Input::Page),
    "limit" => number(arg).map(Input::Limit),
    "filter" => {
      let (name, value) = arg
        .split_once('=')
        .ok_or_else(|| format!("Usage: {}", cmd.usage))?;
      let value = value.trim();
      Ok(Input::Filter {
        name: name.trim().to_string(),
        value: (!value.is_empty()).then(|| value.to_string()),
      })
    }
    "clear" => Ok(Input::Clear),
    "back" => Ok(Input::Back),
    "help" => Ok(Input::Help),
    _ => Ok(Input::Quit),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_resolve() {
    assert_eq!(resolve("page").unwrap().name, "page");
    assert_eq!(resolve("q").unwrap().name, "quit");
    assert_eq!(resolve("fil").unwrap().name, "filter");
    assert_eq!(resolve("RESET").unwrap().name, "clear");
    assert!(resolve("zzz").is_none());
    assert!(resolve("").is_none());
  }

  #[test]
  fn test_parse_search_text() {
    assert_eq!(parse("acme").unwrap(), Input::Search("acme".into()));
    assert_eq!(parse("").unwrap(), Input::Search(String::new()));
  }

  #[test]
  fn test_parse_commands() {
    assert_eq!(parse(":page 3").unwrap(), Input::Page(3));
    assert_eq!(parse(":l 50").unwrap(), Input::Limit(50));
    assert_eq!(
      parse(":filter industry = Software").unwrap(),
      Input::Filter {
        name: "industry".into(),
        value: Some("Software".into())
      }
    );
    assert_eq!(
      parse(":f country=").unwrap(),
      Input::Filter {
        name: "country".into(),
        value: None
      }
    );
    assert_eq!(parse(":clear").unwrap(), Input::Clear);
    assert_eq!(parse(":q").unwrap(), Input::Quit);
  }

  #[test]
  fn test_parse_errors() {
    assert_eq!(parse(":page zero").unwrap_err(), "Usage: :page N");
    assert_eq!(parse(":page 0").unwrap_err(), "Usage: :page N");
    assert!(parse(":filter industry").is_err());
    assert!(parse(":bogus").is_err());
  }
}
