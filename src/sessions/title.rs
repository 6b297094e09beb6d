//! Conversation title derivation.

use super::traits::{Message, Role, UNTITLED};

/// Number of whitespace-separated words kept from the first user message.
pub const TITLE_WORDS: usize = 5;
/// Longest title kept verbatim, in characters.
pub const TITLE_MAX_CHARS: usize = 30;
/// Length a too-long title is cut to before the ellipsis is appended.
pub const TITLE_CUT_CHARS: usize = 27;

/// Derive a title from the first user message in `messages`.
///
/// Keeps the first five words. If the result is longer than 30 characters it
/// is cut to 27 characters plus `...`. Falls back to [`UNTITLED`] when there
/// is no user message, or the first one has no words.
pub fn derive_title(messages: &[Message]) -> String {
    messages
        .iter()
        .find(|m| m.role == Role::User)
        .map(|m| title_from_text(&m.content))
        .filter(|title| !title.is_empty())
        .unwrap_or_else(|| UNTITLED.to_string())
}

/// Shorten free text into a title. Returns an empty string for blank input.
pub fn title_from_text(text: &str) -> String {
    let title = text
        .split_whitespace()
        .take(TITLE_WORDS)
        .collect::<Vec<_>>()
        .join(" ");

    if title.chars().count() > TITLE_MAX_CHARS {
        let cut: String = title.chars().take(TITLE_CUT_CHARS).collect();
        format!("{cut}...")
    } else {
        title
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_first_five_words() {
        let messages = vec![Message::user("one two three four five six seven")];
        assert_eq!(derive_title(&messages), "one two three four five");
    }

    #[test]
    fn long_words_are_cut_with_ellipsis() {
        let messages = vec![Message::user(
            "internationalization considerations for multilingual websites today",
        )];
        let title = derive_title(&messages);
        assert_eq!(title.chars().count(), TITLE_CUT_CHARS + 3);
        assert!(title.ends_with("..."));
        assert!(title.starts_with("internationalization"));
    }

    #[test]
    fn exactly_thirty_chars_is_kept() {
        // 30 characters including spaces
        let text = "abcdefghij abcdefghij abcdefgh";
        assert_eq!(text.chars().count(), 30);
        assert_eq!(title_from_text(text), text);
    }

    #[test]
    fn collapses_whitespace_between_words() {
        assert_eq!(title_from_text("  plan   a\ttrip\n"), "plan a trip");
    }

    #[test]
    fn skips_leading_assistant_messages() {
        let messages = vec![
            Message::assistant("Welcome!", "General Assistant"),
            Message::user("hello there"),
        ];
        assert_eq!(derive_title(&messages), "hello there");
    }

    #[test]
    fn no_user_message_is_untitled() {
        let messages = vec![Message::assistant("Error: boom", "System")];
        assert_eq!(derive_title(&messages), UNTITLED);
        assert_eq!(derive_title(&[]), UNTITLED);
    }

    #[test]
    fn blank_user_message_is_untitled() {
        assert_eq!(derive_title(&[Message::user("   ")]), UNTITLED);
    }

    #[test]
    fn cut_respects_char_boundaries() {
        let text = "ééééééééééé ééééééééééé éééééééééé";
        let title = title_from_text(text);
        assert_eq!(title.chars().count(), TITLE_CUT_CHARS + 3);
    }

    #[test]
    fn derivation_is_idempotent() {
        let messages = vec![Message::user("What is the best way to learn Rust quickly")];
        assert_eq!(derive_title(&messages), derive_title(&messages));
    }
}
