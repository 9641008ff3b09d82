//! Word-level helpers shared by validation and truncation.

/// Appended to the last kept word when a summary is cut.
pub const TRUNCATION_MARKER: &str = "...";

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Keep at most `max_words` words, joined by single spaces.
///
/// Returns `None` when `text` already fits, so callers can keep the original
/// spacing in that case.
pub fn truncate_words(text: &str, max_words: usize) -> Option<String> {
    let mut words = text.split_whitespace();
    let kept: Vec<&str> = words.by_ref().take(max_words).collect();
    if words.next().is_none() {
        return None;
    }
    let mut out = kept.join(" ");
    out.push_str(TRUNCATION_MARKER);
    Some(out)
}

/// `part / whole * 100`, rounded to two decimals. Zero when `whole` is zero.
pub fn ratio_percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    let pct = part as f64 / whole as f64 * 100.0;
    (pct * 100.0).round() / 100.0
}
