// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

/// Cut `text` to at most `max_chars` characters, on a char boundary.
#[inline]
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Single-line preview with collapsed whitespace, used in logs and `show`.
pub fn preview(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() > max_chars {
        format!("{}...", truncate_chars(&flat, max_chars))
    } else {
        flat
    }
}
