//! Post-processing of raw model output before it is stored.

use regex::Regex;
use std::sync::OnceLock;

const CHAR_REPLACEMENTS: &[(char, char)] = &[
    ('∗', '*'),
    ('′', '\''),
    ('´', '\''),
    ('–', '-'),
    ('—', '-'),
    ('−', '-'),
];

struct Rules {
    strong: Regex,
    emphasis: Regex,
    joined_words: Regex,
    line_endings: Regex,
    hyphen_break: Regex,
    blank_runs: Regex,
}

fn rules() -> &'static Rules {
    static RULES: OnceLock<Rules> = OnceLock::new();
    RULES.get_or_init(|| Rules {
        strong: Regex::new(r"\*\*([^*]+)\*\*").expect("valid strong pattern"),
        emphasis: Regex::new(r"\*([^*]+)\*").expect("valid emphasis pattern"),
        joined_words: Regex::new(r"([a-z])([A-Z])").expect("valid joined-words pattern"),
        line_endings: Regex::new(r"\r\n|\r").expect("valid line-ending pattern"),
        hyphen_break: Regex::new(r"(\w+)-\n(\w+)").expect("valid hyphen-break pattern"),
        blank_runs: Regex::new(r"\n{3,}").expect("valid blank-run pattern"),
    })
}

/// Clean model output. Rules run in a fixed order:
/// punctuation variants to ASCII, markdown emphasis to markup, a space between
/// run-together lowercase/uppercase letters, `\n` line endings, rejoined
/// hyphenated line breaks, then runs of 3+ newlines collapsed to one blank line.
pub fn clean(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    let rules = rules();

    let text: String = text
        .chars()
        .map(|c| {
            CHAR_REPLACEMENTS
                .iter()
                .find(|(from, _)| *from == c)
                .map_or(c, |(_, to)| *to)
        })
        .collect();

    let text = rules.strong.replace_all(&text, "<strong>${1}</strong>");
    let text = rules.emphasis.replace_all(&text, "<em>${1}</em>");
    let text = rules.joined_words.replace_all(&text, "${1} ${2}");
    let text = rules.line_endings.replace_all(&text, "\n");
    let text = rules.hyphen_break.replace_all(&text, "${1}${2}");
    let text = rules.blank_runs.replace_all(&text, "\n\n");

    text.into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_is_unchanged() {
        assert_eq!(clean(""), "");
    }

    #[test]
    fn plain_text_is_unchanged() {
        let text = "Paris is lovely in spring.\n\nVisit the Louvre early.";
        assert_eq!(clean(text), text);
    }

    #[test]
    fn normalizes_dashes_and_primes() {
        assert_eq!(clean("9–5 — it′s ´fine´ −3"), "9-5 - it's 'fine' -3");
    }

    #[test]
    fn unicode_asterisk_becomes_emphasis() {
        assert_eq!(clean("∗note∗"), "<em>note</em>");
    }

    #[test]
    fn converts_strong_before_emphasis() {
        assert_eq!(
            clean("**Bold** and *italic* text"),
            "<strong>Bold</strong> and <em>italic</em> text"
        );
    }

    #[test]
    fn splits_run_together_words() {
        assert_eq!(clean("bestTime toVisit"), "best Time to Visit");
    }

    #[test]
    fn leaves_acronyms_alone() {
        assert_eq!(clean("use HTTPS and JSON"), "use HTTPS and JSON");
    }

    #[test]
    fn normalizes_line_endings() {
        assert_eq!(clean("a\r\nb\rc"), "a\nb\nc");
    }

    #[test]
    fn rejoins_hyphenated_line_breaks() {
        assert_eq!(clean("recom-\nmendation"), "recommendation");
        assert_eq!(clean("recom-\r\nmendation"), "recommendation");
    }

    #[test]
    fn collapses_blank_line_runs() {
        assert_eq!(clean("a\n\n\n\n\nb"), "a\n\nb");
        assert_eq!(clean("a\n\nb"), "a\n\nb");
    }

    #[test]
    fn cleaning_twice_is_stable_for_clean_text() {
        let once = clean("**Tip**: pack light\r\n\r\n\r\nand enjoy");
        assert_eq!(clean(&once), once);
    }
}
