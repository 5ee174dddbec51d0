//! Reply texts sent back to the conversation.

use std::fmt::Write as _;

use crate::domain::{entities::KeywordEntry, ranking::KeywordTally};

pub const GREETING: &str =
    "Hi! Tallybot here. Add me to your group and keep count of what your friends keep saying!";

pub const HELP: &str = "Here are available commands:
- add [keyword] [desc]
- remove [keyword]
- list
- [keyword] -> Increase count
- highscore -> Last 30 days
- stat
- reset -> Reset all
- profile
- help";

pub const NO_KEYWORDS: &str = "No keyword registered.";
pub const NO_HIGHSCORE: &str = "No highscore";
pub const ONLY_CREATOR: &str = "Only the creator can remove it";
pub const ALL_CLEARED: &str = "All cleared up.";
pub const PROFILE_WITHOUT_USER: &str = "Bot can't use profile API without user ID";
pub const PROFILE_UNAVAILABLE: &str = "Profile is not available right now";

pub fn greeting() -> String {
    format!("{GREETING}\n\n{HELP}")
}

pub fn already_exists(keyword: &str) -> String {
    format!("{keyword} is already here before.")
}

pub fn added(keyword: &str) -> String {
    format!("{keyword} has been added")
}

pub fn not_exists(keyword: &str) -> String {
    format!("Keyword {keyword} is not exists")
}

pub fn removed(keyword: &str) -> String {
    format!("Keyword {keyword} removed")
}

pub fn mentioned(keyword: &str, description: &str) -> String {
    format!("{keyword}, {description} again?")
}

/// Numbered keyword list; `names` holds the creator display name per entry.
pub fn keyword_list(entries: &[KeywordEntry], names: &[String]) -> String {
    let mut message = String::from("Keywords:");
    for (index, (entry, name)) in entries.iter().zip(names).enumerate() {
        let _ = write!(
            message,
            "\n{}. {}: {} ({})",
            index + 1,
            entry.keyword,
            entry.description,
            name
        );
    }
    message
}

/// Ranked list lines of `keyword - description : count`.
pub fn highscore(rows: &[(KeywordTally, String)]) -> String {
    let mut message = String::from("Highscore:");
    for (tally, description) in rows {
        let _ = write!(
            message,
            "\n{} - {} : {}",
            tally.keyword, description, tally.count
        );
    }
    message
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowStat {
    pub label: &'static str,
    pub total: u64,
    pub top: Option<KeywordTally>,
}

pub fn stats(windows: &[WindowStat]) -> String {
    let mut message = String::from("Stats:");
    for window in windows {
        let _ = match &window.top {
            Some(top) => write!(
                message,
                "\n{}: {} (top: {} x{})",
                window.label, window.total, top.keyword, top.count
            ),
            None => write!(message, "\n{}: {}", window.label, window.total),
        };
    }
    message
}

pub fn profile(display_name: &str, status_message: Option<&str>) -> Vec<String> {
    vec![
        format!("Display name: {display_name}"),
        format!("Status message: {}", status_message.unwrap_or("")),
    ]
}
