//! Client command model and parsing
//!
//! `Command` is a closed sum type consumed exactly once by a session's
//! writer task. Parsing and sanitization are pure functions over text.

/// Prefix character that distinguishes commands from plain chat text
pub const COMMAND_PROMPT: char = '/';

pub const COMMAND_WHO: &str = "who";
pub const COMMAND_EXIT: &str = "exit";
pub const COMMAND_ENTER: &str = "enter";
pub const COMMAND_LEAVE: &str = "leave";

/// Special characters accepted by [`sanitize`] in addition to
/// alphanumerics and spaces.
pub const ALLOWED_SPECIAL_CHARACTERS: &str = "/(){}[]!?#$%&='«»<>@£§";

/// Client command
///
/// Produced by [`parse_command`] (or injected by the session itself:
/// `Hear` for deliveries and notices, `Exit` on `stop`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Plain chat text to broadcast to the current room
    Say(String),
    /// Text to deliver to this session's client
    Hear(String),
    /// List the members of the current room
    Who,
    /// Join (or create) the named room
    Enter(String),
    /// Leave the current room
    Leave,
    /// Terminate the session's writer task
    Exit,
}

/// Strip leading/trailing whitespace and drop every character that is not
/// alphanumeric, a space, or in [`ALLOWED_SPECIAL_CHARACTERS`].
pub fn sanitize(input: &str) -> String {
    input
        .trim()
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == ' ' || ALLOWED_SPECIAL_CHARACTERS.contains(*c))
        .collect()
}

/// Split a line into its first token (lowercased) and the remaining tokens.
pub fn split_command(input: &str) -> (String, Vec<&str>) {
    let mut tokens = input.split_whitespace();
    match tokens.next() {
        Some(first) => (first.to_lowercase(), tokens.collect()),
        None => (String::new(), Vec::new()),
    }
}

/// Parse a sanitized line into a [`Command`].
///
/// Returns `None` for blank input and for prompt-prefixed input that does
/// not match the command grammar (callers surface those as "Invalid input!").
/// Text without the prompt prefix is a [`Command::Say`].
pub fn parse_command(input: &str) -> Option<Command> {
    if input.trim().is_empty() {
        return None;
    }

    if !input.starts_with(COMMAND_PROMPT) {
        return Some(Command::Say(input.to_string()));
    }

    let (cmd, args) = split_command(input);

    // Exactly one prompt character; "//who" is not a command
    match cmd.strip_prefix(COMMAND_PROMPT).unwrap_or("") {
        COMMAND_WHO => Some(Command::Who),
        COMMAND_EXIT => Some(Command::Exit),
        COMMAND_LEAVE => Some(Command::Leave),
        COMMAND_ENTER => args.first().map(|room| Command::Enter((*room).to_string())),
        _ => None,
    }
}

/// Format a chat message for broadcast within a room.
pub fn build_message(room_name: &str, who: &str, text: &str) -> String {
    format!("[{}] {}: {}", room_name, who, text)
}
