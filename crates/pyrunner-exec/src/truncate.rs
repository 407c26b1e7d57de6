//! Output truncation helpers.
//!
//! Run messages are stored in a column with a fixed character cap, so the
//! cut is a plain prefix: the result is never longer than the cap and the
//! split is on character boundaries, never inside a multi-byte sequence.

/// Truncate `text` to at most `max_chars` characters.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => text[..byte_idx].to_owned(),
        None => text.to_owned(),
    }
}
