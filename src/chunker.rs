//! Sliding-window text chunking.
//!
//! Spans are measured in characters, not bytes, so multibyte text never
//! splits a code point. Consecutive spans overlap by a fixed amount so a
//! semantic boundary near a window edge still appears whole in one chunk.

#[derive(Debug, Clone, Copy)]
pub struct ChunkerConfig {
    /// Window size in characters.
    pub window: usize,
    /// Overlap carried into the next window, always less than `window`.
    pub overlap: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            window: 1000,
            overlap: 200,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextSpan {
    pub start: usize,
    pub end: usize,
    pub text: String,
}

impl ChunkerConfig {
    pub fn new(window: usize, overlap: usize) -> Self {
        let window = window.max(1);
        Self {
            window,
            overlap: overlap.min(window - 1),
        }
    }

    /// Splits `text` into overlapping spans covering `[0, len)`.
    ///
    /// Each span is `[start, min(start + window, len))`; the last span ends
    /// at the text end, every other pair of consecutive spans shares
    /// exactly `overlap` characters. `start` strictly increases while the
    /// window has not reached the end, so the loop always terminates.
    pub fn split(&self, text: &str) -> Vec<TextSpan> {
        let chars: Vec<char> = text.chars().collect();
        let len = chars.len();
        let mut spans = Vec::new();

        if len == 0 {
            return spans;
        }

        let overlap = self.overlap.min(self.window.saturating_sub(1));
        let mut start = 0usize;
        loop {
            let end = (start + self.window).min(len);
            spans.push(TextSpan {
                start,
                end,
                text: chars[start..end].iter().collect(),
            });
            if end == len {
                break;
            }
            start = end - overlap;
        }

        spans
    }
}
