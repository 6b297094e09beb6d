//! Slash commands for the terminal chat.

/// A parsed line of terminal input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    /// Free text to send as a chat turn.
    Message(String),
    NewChat,
    /// Load by full id or unique id prefix.
    Load(String),
    Pin(String),
    Unpin,
    History,
    Clear,
    Personas,
    Help,
    Quit,
    /// A slash command that needs an argument but got none, or is unknown.
    Invalid(String),
}

/// Commands and their help text, in display order.
pub const COMMANDS: &[(&str, &str)] = &[
    ("/new", "Start a new conversation"),
    ("/load <id>", "Load a recent conversation by id prefix"),
    ("/pin <persona>", "Always answer as the named persona"),
    ("/unpin", "Return to automatic persona routing"),
    ("/history", "List recent conversations"),
    ("/clear", "Clear the current conversation"),
    ("/personas", "List available personas"),
    ("/help", "Show available commands"),
    ("/quit", "Save and exit"),
];

impl ChatCommand {
    /// Parse one line of input. Blank input yields `None`.
    pub fn parse(line: &str) -> Option<Self> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }
        let Some(rest) = trimmed.strip_prefix('/') else {
            return Some(Self::Message(trimmed.to_string()));
        };

        let (command, args) = match rest.find(char::is_whitespace) {
            Some(pos) => (&rest[..pos], rest[pos..].trim()),
            None => (rest, ""),
        };

        let parsed = match command.to_ascii_lowercase().as_str() {
            "new" => Self::NewChat,
            "load" if !args.is_empty() => Self::Load(args.to_string()),
            "load" => Self::Invalid("usage: /load <conversation id>".into()),
            "pin" if !args.is_empty() => Self::Pin(args.to_string()),
            "pin" => Self::Invalid("usage: /pin <persona name>".into()),
            "unpin" => Self::Unpin,
            "history" => Self::History,
            "clear" => Self::Clear,
            "personas" => Self::Personas,
            "help" | "?" => Self::Help,
            "quit" | "exit" | "q" => Self::Quit,
            other => Self::Invalid(format!("unknown command: /{other} (try /help)")),
        };
        Some(parsed)
    }
}

/// Help text listing every command.
pub fn help_text() -> String {
    let mut lines = vec!["Available commands:".to_string()];
    for (cmd, desc) in COMMANDS {
        lines.push(format!("  {cmd:<16} {desc}"));
    }
    lines.join("\n")
}
