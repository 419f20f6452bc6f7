//! Post-processing: deterministic cleanup of raw model replies before they
//! are parsed as JSON.
//!
//! Models are told to answer with bare JSON, and most of the time they do.
//! The rest of the time the reply arrives wrapped in a ```` ```json ```` fence,
//! prefixed with a byte-order mark, or with CRLF line endings. None of that
//! changes the meaning of the reply, so it is removed here rather than
//! handled inside the validators.
//!
//! ## Rule Order
//!
//! Invisible characters go first so a BOM in front of the opening fence does
//! not hide it. Fences are stripped before the final trim.
//!
//! Every rule is idempotent, and so is [`clean_reply`]: cleaning an already
//! clean reply returns it unchanged.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all cleanup rules to a raw model reply.
///
/// Rules (applied in order):
/// 1. Strip invisible Unicode (BOM, zero-width spaces, soft hyphens)
/// 2. Normalise line endings (CRLF → LF)
/// 3. Strip outer code fences, with or without a language tag, until none
///    are left (models sometimes nest a ```` ```json ```` fence in a bare one)
/// 4. Trim surrounding whitespace
pub fn clean_reply(input: &str) -> String {
    let s = remove_invisible_chars(input);
    let mut s = normalise_line_endings(&s);
    loop {
        let stripped = strip_code_fences(&s);
        if stripped == s {
            break;
        }
        s = stripped;
    }
    s.trim().to_string()
}

// ── Rule 1: Strip invisible Unicode ──────────────────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input
        .chars()
        .filter(|c| {
            !matches!(
                c,
                '\u{FEFF}' | '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{2060}' | '\u{00AD}'
            )
        })
        .collect()
}

// ── Rule 2: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 3: Strip outer code fences ──────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^```[A-Za-z0-9_-]*[ \t]*\n?(.*?)\n?[ \t]*```$").unwrap()
});

/// Remove one surrounding ```` ``` ```` / ```` ```json ```` wrapper.
///
/// A reply that only opens a fence (the model ran out of tokens before
/// closing it) loses the opening marker. Text without fences is returned
/// trimmed and otherwise untouched.
pub fn strip_code_fences(input: &str) -> String {
    let trimmed = input.trim();
    if let Some(caps) = RE_OUTER_FENCES.captures(trimmed) {
        return caps[1].trim().to_string();
    }
    if let Some(rest) = trimmed.strip_prefix("```") {
        let body = rest
            .split_once(|c: char| c.is_whitespace())
            .filter(|(tag, _)| is_fence_tag(tag))
            .map(|(_, body)| body)
            .unwrap_or(rest);
        return body.trim().to_string();
    }
    trimmed.to_string()
}

fn is_fence_tag(tag: &str) -> bool {
    tag.chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_json_fence() {
        let input = "```json\n{\"isCorrect\": true}\n```";
        assert_eq!(strip_code_fences(input), "{\"isCorrect\": true}");
    }

    #[test]
    fn test_strip_fence_no_lang() {
        let input = "```\n[]\n```";
        assert_eq!(strip_code_fences(input), "[]");
    }

    #[test]
    fn test_strip_single_line_fence() {
        assert_eq!(strip_code_fences("```json {\"a\":1}```"), "{\"a\":1}");
    }

    #[test]
    fn test_unclosed_fence() {
        assert_eq!(strip_code_fences("```json\n[1, 2"), "[1, 2");
    }

    #[test]
    fn test_no_fences_passthrough() {
        let input = "  {\"isCorrect\": false}\n";
        assert_eq!(strip_code_fences(input), "{\"isCorrect\": false}");
    }

    #[test]
    fn test_inner_backticks_survive() {
        let input = "```json\n{\"content\": \"use `x = 7`\"}\n```";
        assert_eq!(strip_code_fences(input), "{\"content\": \"use `x = 7`\"}");
    }

    #[test]
    fn test_strip_is_idempotent() {
        let inputs = [
            "```json\n{\"a\": 1}\n```",
            "{\"a\": 1}",
            "```\n\n[]\n\n```",
            "\u{FEFF}```json\r\n[]\r\n```\r\n",
            "```\n```json\n[]\n```\n```",
        ];
        for input in inputs {
            let once = clean_reply(input);
            assert_eq!(clean_reply(&once), once, "input: {input:?}");
        }
    }

    #[test]
    fn test_nested_fences_fully_stripped() {
        assert_eq!(clean_reply("```\n```json\n[]\n```\n```"), "[]");
        assert_eq!(clean_reply("```json\n```\n{\"a\": 1}\n```\n```"), "{\"a\": 1}");
    }

    #[test]
    fn test_bom_before_fence() {
        assert_eq!(clean_reply("\u{FEFF}```json\r\n[]\r\n```"), "[]");
    }

    #[test]
    fn test_normalise_line_endings() {
        assert_eq!(normalise_line_endings("a\r\nb\rc"), "a\nb\nc");
    }

    #[test]
    fn test_remove_invisible() {
        let input = "tr\u{200B}ue\u{FEFF}";
        assert_eq!(remove_invisible_chars(input), "true");
    }
}
