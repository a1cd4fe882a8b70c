//! Text segmentation for the synthesis backend's input limit
//!
//! The backend only accepts a bounded amount of text per request. Long
//! passages are cut into chunks at the last natural break (sentence or
//! clause punctuation, newline) inside each window, falling back to a hard
//! cut when a window has no break. Concatenating the chunks always yields
//! the original text.

/// Default maximum chunk length, in characters
pub const DEFAULT_MAX_CHUNK_CHARS: usize = 200;

/// Characters after which a chunk may end
const BREAK_CHARS: &[char] = &['。', '、', '！', '？', '\n', '.', ',', '!', '?'];

/// Split `text` into chunks of at most `max_chars` characters.
///
/// Text that already fits is returned as a single chunk, even when empty.
/// A `max_chars` of 0 is treated as 1 so that every step makes progress.
///
/// # Examples
///
/// ```
/// use narrator::voice::segment_text;
///
/// let chunks = segment_text("One. Two. Three.", 10);
/// assert_eq!(chunks, vec!["One. Two.", " Three."]);
/// ```
#[must_use]
pub fn segment_text(text: &str, max_chars: usize) -> Vec<&str> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut remaining = text;

    // Byte offset of the first character past the window; `None` once the rest fits
    while let Some((window_end, _)) = remaining.char_indices().nth(max_chars) {
        let window = &remaining[..window_end];
        let split_at = find_break(window).unwrap_or(window_end);

        chunks.push(&remaining[..split_at]);
        remaining = &remaining[split_at..];
    }

    if !remaining.is_empty() || chunks.is_empty() {
        chunks.push(remaining);
    }

    chunks
}

/// Byte offset just past the last break character in `window`.
///
/// A break at the very first character is ignored, it would produce a
/// one-character chunk and gain nothing over a hard cut.
fn find_break(window: &str) -> Option<usize> {
    window
        .char_indices()
        .rev()
        .find(|&(i, c)| i > 0 && BREAK_CHARS.contains(&c))
        .map(|(i, c)| i + c.len_utf8())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn char_lens(chunks: &[&str]) -> Vec<usize> {
        chunks.iter().map(|c| c.chars().count()).collect()
    }

    #[test]
    fn short_text_is_single_chunk() {
        assert_eq!(segment_text("Hello.", 200), vec!["Hello."]);
        assert_eq!(segment_text("", 200), vec![""]);
    }

    #[test]
    fn exact_limit_is_single_chunk() {
        let text = "a".repeat(200);
        assert_eq!(segment_text(&text, 200), vec![text.as_str()]);
    }

    #[test]
    fn hard_cut_without_punctuation() {
        let text = "a".repeat(500);
        let chunks = segment_text(&text, 200);
        assert_eq!(char_lens(&chunks), vec![200, 200, 100]);
    }

    #[test]
    fn cuts_after_last_break_in_window() {
        let text = "First sentence. Second sentence. Third";
        let chunks = segment_text(text, 20);
        assert_eq!(chunks[0], "First sentence.");
        assert_eq!(chunks.concat(), text);
        assert!(chunks.iter().all(|c| c.chars().count() <= 20));
    }

    #[test]
    fn prefers_newline_over_hard_cut() {
        let text = "line one\nline two is long";
        let chunks = segment_text(text, 12);
        assert_eq!(chunks[0], "line one\n");
    }

    #[test]
    fn break_at_first_character_is_ignored() {
        let text = format!(".{}", "b".repeat(9));
        let chunks = segment_text(&text, 5);
        assert_eq!(char_lens(&chunks), vec![5, 5]);
    }

    #[test]
    fn counts_characters_not_bytes() {
        let text = "あいうえお、かきくけこ。さしすせそ";
        let chunks = segment_text(text, 8);
        assert_eq!(chunks, vec!["あいうえお、", "かきくけこ。", "さしすせそ"]);
    }

    #[test]
    fn zero_limit_still_progresses() {
        let chunks = segment_text("abc", 0);
        assert_eq!(chunks, vec!["a", "b", "c"]);
    }

    #[test]
    fn concatenation_is_lossless() {
        let text = "Il était une fois, dans un pays lointain. Un roi!\nEt puis? Rien du tout.";
        for limit in 1..=text.chars().count() + 1 {
            let chunks = segment_text(text, limit);
            assert_eq!(chunks.concat(), text, "limit {limit}");
            assert!(chunks.iter().all(|c| !c.is_empty()), "limit {limit}");
            assert!(
                chunks.iter().all(|c| c.chars().count() <= limit),
                "limit {limit}"
            );
        }
    }
}
