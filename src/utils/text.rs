//! Character-bounded truncation and code fence stripping.

use std::sync::OnceLock;

use regex::Regex;

static CODE_FENCE: OnceLock<Regex> = OnceLock::new();

fn code_fence() -> &'static Regex {
    CODE_FENCE.get_or_init(|| {
        Regex::new(r"(?i)```(?:sqlite|sql|python|py)?").expect("code fence pattern is valid")
    })
}

/// Returns the first `max_chars` characters of `text`.
///
/// Counts `char`s rather than bytes so a multi-byte code point is never split.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

/// Removes markdown code fence markers (```` ```sql ````, ```` ```python ````,
/// bare ```` ``` ````) anywhere in the text and trims surrounding whitespace.
///
/// Generated output is untrusted text; this only removes the wrapper, it does
/// not validate what remains.
pub fn strip_code_fences(raw: &str) -> String {
    code_fence().replace_all(raw.trim(), "").trim().to_string()
}
