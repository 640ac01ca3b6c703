use crate::config::{DEFAULT_TITLE, TITLE_MAX_CHARS};
use crate::models::{Message, Role};

/// Derive a session title from the first user message.
pub fn derive_title(messages: &[Message]) -> String {
    messages
        .iter()
        .find(|m| m.role == Role::User)
        .map(|m| truncate_title(&m.content))
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| DEFAULT_TITLE.to_string())
}

/// Keep the first `TITLE_MAX_CHARS` characters, counted as chars so
/// multi-byte text never splits mid-character.
pub fn truncate_title(text: &str) -> String {
    text.chars().take(TITLE_MAX_CHARS).collect()
}
