use regex::bytes::Regex as BytesRegex;
use regex::Regex;
use std::borrow::Cow;
use std::sync::OnceLock;

// `\s` is Unicode-aware and already covers U+00A0 and U+202F; NBSP is
// listed anyway so the intent survives a switch to ASCII classes.
const WHITESPACE_RUN: &str = r"[\s\u{00A0}]+";

fn bytes_pattern() -> Option<&'static BytesRegex> {
    static PATTERN: OnceLock<Option<BytesRegex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| BytesRegex::new(WHITESPACE_RUN).ok())
        .as_ref()
}

fn text_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(WHITESPACE_RUN).ok()).as_ref()
}

/// Collapses every run of whitespace or non-breaking spaces into one ASCII
/// space and trims both ends
///
/// Applied to raw response bytes before JSON decoding: the upstream
/// occasionally emits stray NBSP bytes that strict decoders reject.
pub fn normalize_whitespace(body: &[u8]) -> Vec<u8> {
    let trimmed = body.trim_ascii();
    match bytes_pattern() {
        Some(pattern) => pattern.replace_all(trimmed, &b" "[..]).into_owned(),
        None => trimmed.to_vec(),
    }
}

/// String counterpart of [`normalize_whitespace`], for scraped text
pub fn normalize_text(text: &str) -> Cow<'_, str> {
    let trimmed = text.trim();
    match text_pattern() {
        Some(pattern) => pattern.replace_all(trimmed, " "),
        None => Cow::Borrowed(trimmed),
    }
}
