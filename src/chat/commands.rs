//! Slash command parsing for the chat application.
//!
//! This module handles parsing of special commands that start with `/`,
//! allowing users to control the chat session without sending messages
//! to the provider.

use crate::theme::Theme;

/// A parsed chat command.
///
/// These commands control the chat session and are not sent to the provider.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatCommand {
    /// Clear the conversation history.
    Clear,

    /// Switch themes.  `None` toggles between light and dark.
    Theme(Option<Theme>),

    /// Sign in under the given name.
    Login(String),

    /// Forget the signed-in user.
    Logout,

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
/// # use trickle::chat::parse_command;
/// assert!(parse_command("/quit").is_some());
/// assert!(parse_command("/theme dark").is_some());
/// assert!(parse_command("How do I stop renting?").is_none());
/// ```
pub fn parse_command(input: &str) -> Option<ChatCommand> {
    let input = input.trim();
    let rest = input.strip_prefix('/')?;

    let mut parts = rest.splitn(2, char::is_whitespace);
    let command = parts.next()?.to_lowercase();
    let argument = parts.next().map(|s| s.trim()).filter(|s| !s.is_empty());

    let result = match command.as_str() {
        "clear" => ChatCommand::Clear,
        "theme" => match argument {
            None => ChatCommand::Theme(None),
            Some(name) => match name.parse::<Theme>() {
                Ok(theme) => ChatCommand::Theme(Some(theme)),
                Err(_) => ChatCommand::Invalid("/theme expects 'light' or 'dark'".to_string()),
            },
        },
        "login" => match argument {
            Some(name) => ChatCommand::Login(name.to_string()),
            None => ChatCommand::Invalid("/login requires a name".to_string()),
        },
        "logout" => ChatCommand::Logout,
        "help" | "?" => ChatCommand::Help,
        "quit" | "exit" | "q" => ChatCommand::Quit,
        "stats" | "status" => ChatCommand::Stats,
        _ => ChatCommand::Invalid(format!("Unknown command: /{}", command)),
    };

    Some(result)
}

/// Returns help text describing available commands.
pub fn help_text() -> &'static str {
    r#"Available commands:
  /clear                 Clear conversation history
  /theme [light|dark]    Switch themes (no argument toggles)
  /login <name>          Sign in so messages can be sent
  /logout                Sign out
  /stats                 Show session statistics
  /help                  Show this help message
  /quit                  Exit the chat

Press Ctrl+C while a reply is being revealed to show it in full."#
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_quit_commands() {
        assert_eq!(parse_command("/quit"), Some(ChatCommand::Quit));
        assert_eq!(parse_command("/exit"), Some(ChatCommand::Quit));
        assert_eq!(parse_command("/q"), Some(ChatCommand::Quit));
        assert_eq!(parse_command("  /quit  "), Some(ChatCommand::Quit));
    }

    #[test]
    fn parse_clear() {
        assert_eq!(parse_command("/clear"), Some(ChatCommand::Clear));
        assert_eq!(parse_command("/CLEAR"), Some(ChatCommand::Clear));
    }

    #[test]
    fn parse_theme() {
        assert_eq!(parse_command("/theme"), Some(ChatCommand::Theme(None)));
        assert_eq!(
            parse_command("/theme Dark"),
            Some(ChatCommand::Theme(Some(Theme::Dark)))
        );
        assert_eq!(
            parse_command("/theme  light "),
            Some(ChatCommand::Theme(Some(Theme::Light)))
        );
        assert!(matches!(
            parse_command("/theme sepia"),
            Some(ChatCommand::Invalid(msg)) if msg.contains("expects")
        ));
    }

    #[test]
    fn parse_login() {
        assert_eq!(
            parse_command("/login ada lovelace"),
            Some(ChatCommand::Login("ada lovelace".to_string()))
        );
        assert_eq!(
            parse_command("/login"),
            Some(ChatCommand::Invalid("/login requires a name".to_string()))
        );
        assert_eq!(parse_command("/logout"), Some(ChatCommand::Logout));
    }

    #[test]
    fn parse_stats_and_help() {
        assert_eq!(parse_command("/stats"), Some(ChatCommand::Stats));
        assert_eq!(parse_command("/help"), Some(ChatCommand::Help));
        assert_eq!(parse_command("/?"), Some(ChatCommand::Help));
    }

    #[test]
    fn unknown_command() {
        assert_eq!(
            parse_command("/model gpt"),
            Some(ChatCommand::Invalid("Unknown command: /model".to_string()))
        );
    }

    #[test]
    fn non_commands() {
        assert_eq!(parse_command("Hello there!"), None);
        assert_eq!(parse_command(""), None);
        assert_eq!(parse_command("  "), None);
    }

    #[test]
    fn help_text_not_empty() {
        let help = help_text();
        assert!(help.contains("/quit"));
        assert!(help.contains("/clear"));
        assert!(help.contains("/theme"));
        assert!(help.contains("/login"));
    }
}
