//! Fenced code block extraction from turn text.

use std::sync::OnceLock;

use regex::Regex;

/// Matches a ```python fenced block (case-insensitive tag), non-greedy body.
fn fence_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)```python\s*([\s\S]*?)```").expect("valid fence regex")
    })
}

/// Extracts the last fenced `python` code block from a turn's text.
///
/// Earlier blocks are ignored by design: the protocol treats the final block
/// as the model's current version, so "last block wins" is intentional, not a
/// fallback for malformed output. Returns `None` when no complete fenced
/// block exists.
pub fn extract_last_code_block(text: &str) -> Option<String> {
    fence_regex()
        .captures_iter(text)
        .last()
        .map(|caps| caps[1].trim().to_string())
        .filter(|code| !code.is_empty())
}
