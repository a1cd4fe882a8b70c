//! Passages: the units of narration

use serde::{Deserialize, Serialize};

/// Opaque reference to where a passage came from
///
/// Owned by whoever extracted the passages; the queue only hands it back in
/// events so the caller can highlight the region being read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OriginHandle(pub u64);

/// One unit of text to be narrated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Passage {
    /// Text to speak
    pub text: String,
    /// Where the text came from
    pub origin: OriginHandle,
    /// Zero-based position in the session
    pub index: usize,
}

impl Passage {
    /// Create a passage
    #[must_use]
    pub fn new(text: impl Into<String>, origin: OriginHandle, index: usize) -> Self {
        Self {
            text: text.into(),
            origin,
            index,
        }
    }
}

/// Split plain text into passages at blank lines
///
/// Each passage is trimmed; blocks holding only whitespace are skipped. The
/// origin handle is the 1-based line number where the passage starts.
#[must_use]
pub fn passages_from_text(text: &str) -> Vec<Passage> {
    let mut passages = Vec::new();
    let mut block: Vec<&str> = Vec::new();
    let mut block_start = 0;

    for (i, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            flush_block(&mut block, block_start, &mut passages);
            continue;
        }
        if block.is_empty() {
            block_start = i + 1;
        }
        block.push(line);
    }
    flush_block(&mut block, block_start, &mut passages);

    passages
}

fn flush_block(block: &mut Vec<&str>, start_line: usize, passages: &mut Vec<Passage>) {
    let joined = block.join("\n");
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        let index = passages.len();
        passages.push(Passage::new(trimmed, OriginHandle(start_line as u64), index));
    }
    block.clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_blank_lines() {
        let text = "Hello.\nStill hello.\n\n\n  World.  \n";
        let passages = passages_from_text(text);

        assert_eq!(passages.len(), 2);
        assert_eq!(passages[0].text, "Hello.\nStill hello.");
        assert_eq!(passages[0].origin, OriginHandle(1));
        assert_eq!(passages[1].text, "World.");
        assert_eq!(passages[1].origin, OriginHandle(5));
        assert_eq!(passages[1].index, 1);
    }

    #[test]
    fn whitespace_only_yields_nothing() {
        assert!(passages_from_text(" \n\t\n").is_empty());
        assert!(passages_from_text("").is_empty());
    }
}
