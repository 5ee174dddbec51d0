//! Free-text message parsing into typed bot commands.

use serde::Deserialize;

/// Matching rules for command names and keywords.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CommandRules {
    /// `ADD`, `Add` and `add` all name the add command.
    pub case_insensitive_commands: bool,
    /// Keywords are lowercased before they reach the cache or the repositories.
    pub case_insensitive_keywords: bool,
}

impl Default for CommandRules {
    fn default() -> Self {
        Self {
            case_insensitive_commands: true,
            case_insensitive_keywords: false,
        }
    }
}

impl CommandRules {
    pub fn normalize_keyword(&self, keyword: &str) -> String {
        if self.case_insensitive_keywords {
            keyword.to_lowercase()
        } else {
            keyword.to_string()
        }
    }

    fn command_matches(&self, token: &str, name: &str) -> bool {
        if self.case_insensitive_commands {
            token.eq_ignore_ascii_case(name)
        } else {
            token == name
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Add { keyword: String, description: String },
    Remove { keyword: String },
    List,
    Highscore,
    Stat,
    Reset,
    Help,
    Profile,
    /// Any other single token: increment the keyword if it is registered.
    Mention { keyword: String },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Add { .. } => "add",
            Command::Remove { .. } => "remove",
            Command::List => "list",
            Command::Highscore => "highscore",
            Command::Stat => "stat",
            Command::Reset => "reset",
            Command::Help => "help",
            Command::Profile => "profile",
            Command::Mention { .. } => "mention",
        }
    }
}

/// Command names with the exact token count each one requires.
const SHAPES: [(&str, usize); 8] = [
    ("add", 3),
    ("remove", 2),
    ("list", 1),
    ("highscore", 1),
    ("stat", 1),
    ("reset", 1),
    ("help", 1),
    ("profile", 1),
];

/// Parse a message into a command.
///
/// Returns `None` when the message should be ignored without a reply: empty
/// text, a command with the wrong number of tokens, or several tokens that do
/// not start with a command name.
pub fn parse(text: &str, rules: &CommandRules) -> Option<Command> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    let first = *tokens.first()?;

    let shape = SHAPES
        .iter()
        .find(|(name, _)| rules.command_matches(first, name));

    let Some(&(name, arity)) = shape else {
        return (tokens.len() == 1).then(|| Command::Mention {
            keyword: rules.normalize_keyword(first),
        });
    };

    if tokens.len() != arity {
        return None;
    }

    let command = match name {
        "add" => Command::Add {
            keyword: rules.normalize_keyword(tokens[1]),
            description: tokens[2].to_string(),
        },
        "remove" => Command::Remove {
            keyword: rules.normalize_keyword(tokens[1]),
        },
        "list" => Command::List,
        "highscore" => Command::Highscore,
        "stat" => Command::Stat,
        "reset" => Command::Reset,
        "help" => Command::Help,
        _ => Command::Profile,
    };
    Some(command)
}
