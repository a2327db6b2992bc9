//! Small text helpers shared across crates.

/// Keep at most `max_chars` characters, appending `...` when something was cut.
///
/// Counts chars, not bytes, so Vietnamese diacritics are never split.
pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}
