/// Commands typed into the terminal front end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserCommand {
    SendMessage(String),
    /// Toggle the simulated participants on or off.
    ToggleBot,
    Summarize,
    /// Clear the room. The front end asks for confirmation first.
    Clear,
    /// Resend the last message that failed to go out.
    Resend,
    Help,
    Quit,
}

impl UserCommand {
    /// Parse one input line. Blank lines yield `None`.
    pub fn parse(line: &str) -> Option<Self> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }

        let Some(rest) = trimmed.strip_prefix('/') else {
            return Some(UserCommand::SendMessage(line.trim_end().to_string()));
        };

        let name = rest.split_whitespace().next().unwrap_or_default();
        let command = match name {
            "bot" => UserCommand::ToggleBot,
            "summarize" | "sum" => UserCommand::Summarize,
            "clear" => UserCommand::Clear,
            "retry" => UserCommand::Resend,
            "quit" | "exit" => UserCommand::Quit,
            "help" => UserCommand::Help,
            // Unknown slash commands go out as text.
            _ => UserCommand::SendMessage(trimmed.to_string()),
        };
        Some(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_sent() {
        assert_eq!(
            UserCommand::parse("hello world  "),
            Some(UserCommand::SendMessage("hello world".to_string()))
        );
        assert_eq!(UserCommand::parse("   "), None);
    }

    #[test]
    fn slash_commands_are_recognized() {
        assert_eq!(UserCommand::parse("/bot"), Some(UserCommand::ToggleBot));
        assert_eq!(UserCommand::parse("/sum"), Some(UserCommand::Summarize));
        assert_eq!(UserCommand::parse("/retry"), Some(UserCommand::Resend));
        assert_eq!(UserCommand::parse("/quit "), Some(UserCommand::Quit));
        assert_eq!(
            UserCommand::parse("/shrug"),
            Some(UserCommand::SendMessage("/shrug".to_string()))
        );
    }

    #[test]
    fn identity_is_not_editable_mid_session() {
        assert_eq!(
            UserCommand::parse("/name Ada"),
            Some(UserCommand::SendMessage("/name Ada".to_string()))
        );
        assert_eq!(
            UserCommand::parse("/color #112233"),
            Some(UserCommand::SendMessage("/color #112233".to_string()))
        );
    }
}
