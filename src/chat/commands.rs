//! Slash command parsing for the chat application.
//!
//! This module handles parsing of special commands that start with `/`,
//! allowing users to control the chat session without sending messages
//! to the model.

/// A parsed chat command.
///
/// These commands control the chat session and are not sent to the model.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatCommand {
    /// List the blog categories.
    Categories,

    /// Select a category by name or number.
    Category(String),

    /// Stop using article context.
    ClearCategory,

    /// Show the currently selected category.
    ShowCategory,

    /// Attach feedback to the most recent answer.
    Feedback(String),

    /// Show the turns of this session.
    History,

    /// Show every row of the CSV log.
    LogHistory,

    /// Display help information.
    Help,

    /// Exit the chat application.
    Quit,

    /// Display session statistics.
    Stats,

    /// Report a parsing error back to the caller.
    Invalid(String),
}

/// Parses user input for slash commands.
///
/// Returns `Some(ChatCommand)` if the input is a valid command,
/// or `None` if it should be treated as a regular message.
///
/// # Examples
///
/// ```
/// # use chatmtl::chat::parse_command;
/// assert!(parse_command("/quit").is_some());
/// assert!(parse_command("/category news").is_some());
/// assert!(parse_command("What's new in Montreal?").is_none());
/// ```
pub fn parse_command(input: &str) -> Option<ChatCommand> {
    let input = input.trim();

    if !input.starts_with('/') {
        return None;
    }

    let mut parts = input[1..].splitn(2, ' ');
    let command = parts.next()?.to_lowercase();
    let argument = parts.next().map(|s| s.trim()).filter(|s| !s.is_empty());

    let result = match command.as_str() {
        "categories" => ChatCommand::Categories,
        "category" | "cat" => match argument {
            Some("clear") | Some("none") => ChatCommand::ClearCategory,
            Some(name) => ChatCommand::Category(name.to_string()),
            None => ChatCommand::ShowCategory,
        },
        "feedback" => match argument {
            Some(text) => ChatCommand::Feedback(text.to_string()),
            None => ChatCommand::Invalid("/feedback requires some text".to_string()),
        },
        "history" => match argument {
            Some("all") => ChatCommand::LogHistory,
            Some(other) => ChatCommand::Invalid(format!(
                "Unknown /history option: {other}. Use /history or /history all."
            )),
            None => ChatCommand::History,
        },
        "help" | "?" => ChatCommand::Help,
        "quit" | "exit" | "q" => ChatCommand::Quit,
        "stats" => ChatCommand::Stats,
        _ => ChatCommand::Invalid(format!(
            "Unknown command: /{command}. Type /help for a list of commands."
        )),
    };
    Some(result)
}

/// Returns help text for all available commands.
pub fn help_text() -> &'static str {
    "\
Commands:
  /categories           List the MTL Blog categories
  /category [NAME|NUM]  Answer from a category (no argument shows the current one)
  /category clear       Answer without article context
  /feedback TEXT        Leave feedback on the last answer
  /history              Show this session's questions and answers
  /history all          Show every conversation in the log file
  /stats                Show session statistics
  /help, /?             Show this help
  /quit, /exit, /q      Exit the chat"
}
