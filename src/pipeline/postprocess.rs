//! Post-processing: deterministic cleanup of completion output before parsing.
//!
//! Models asked for "only a JSON object" still sometimes wrap it in
//! ```` ```json ```` fences or add a sentence before or after it. These rules
//! recover the object without touching its content. Anything they cannot
//! recover is left for the JSON parser to reject.

use once_cell::sync::Lazy;
use regex::Regex;

// ── Rule 1: Strip outer code fences ──────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^```[A-Za-z0-9_-]*[ \t]*\r?\n(.*?)\r?\n?```\s*$").expect("valid regex")
});

/// Remove one pair of outer ```` ``` ```` fences, with or without a
/// language tag. Text without outer fences is returned trimmed.
pub fn strip_code_fences(input: &str) -> String {
    let trimmed = input.trim();
    match RE_OUTER_FENCES.captures(trimmed) {
        Some(caps) => caps[1].trim().to_string(),
        None => trimmed.to_string(),
    }
}

// ── Rule 2: Strip invisible characters ───────────────────────────────────

/// Drop a leading BOM and zero-width characters some providers emit.
pub fn remove_invisible_chars(input: &str) -> String {
    input
        .chars()
        .filter(|c| !matches!(c, '\u{FEFF}' | '\u{200B}' | '\u{200C}' | '\u{200D}'))
        .collect()
}

// ── Rule 3: Isolate the outermost object ─────────────────────────────────

/// Return the JSON object text inside `input`.
///
/// If the whole (cleaned) text parses as JSON it is returned as-is. Otherwise
/// the span from the first `{` to the last `}` is taken, which recovers
/// replies such as `Here you go: {...} Enjoy!`. `None` when no braces exist.
pub fn extract_json_object(input: &str) -> Option<String> {
    let cleaned = strip_code_fences(&remove_invisible_chars(input));
    if serde_json::from_str::<serde_json::Value>(&cleaned).is_ok() {
        return Some(cleaned);
    }
    let start = cleaned.find('{')?;
    let end = cleaned.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(cleaned[start..=end].to_string())
}

/// First `max_chars` characters of `text`, for error messages.
pub fn excerpt(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_string();
    }
    let mut cut: String = trimmed.chars().take(max_chars).collect();
    cut.push('…');
    cut
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_json_fences() {
        let input = "```json\n{\"name\": \"Soup\"}\n```";
        assert_eq!(strip_code_fences(input), "{\"name\": \"Soup\"}");
    }

    #[test]
    fn strips_bare_fences() {
        let input = "```\n{\"a\": 1}\n```\n";
        assert_eq!(strip_code_fences(input), "{\"a\": 1}");
    }

    #[test]
    fn leaves_unfenced_text_alone() {
        assert_eq!(strip_code_fences("  {\"a\": 1}  "), "{\"a\": 1}");
    }

    #[test]
    fn inner_fences_are_not_outer_fences() {
        let input = "Note:\n```json\n{}\n```";
        assert_eq!(strip_code_fences(input), input);
    }

    #[test]
    fn extracts_object_from_chatter() {
        let out = extract_json_object("Sure! Here it is: {\"name\": \"Soup\"} Enjoy.").unwrap();
        assert_eq!(out, "{\"name\": \"Soup\"}");
    }

    #[test]
    fn extract_returns_valid_json_unchanged() {
        assert_eq!(extract_json_object("[1, 2]").as_deref(), Some("[1, 2]"));
    }

    #[test]
    fn extract_without_braces_is_none() {
        assert_eq!(extract_json_object("no recipe here"), None);
        assert_eq!(extract_json_object("} backwards {"), None);
    }

    #[test]
    fn bom_is_removed() {
        assert_eq!(
            extract_json_object("\u{FEFF}{\"a\": 1}").as_deref(),
            Some("{\"a\": 1}")
        );
    }

    #[test]
    fn excerpt_truncates_on_char_boundary() {
        assert_eq!(excerpt("héllo world", 5), "héllo…");
        assert_eq!(excerpt("  short ", 10), "short");
    }
}
