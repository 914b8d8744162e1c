//! Deterministic bounded-size text chunking with hierarchical boundary
//! preservation.
//!
//! Stages that cannot process arbitrarily large inputs receive the text as
//! an ordered sequence of segments, each no larger than the configured
//! maximum. Splits prefer paragraph boundaries over line, sentence, clause,
//! and word boundaries, in that order, falling back to a UTF-8-safe
//! character cut only when nothing better exists inside the window.
//!
//! Segments are produced without overlap or trimming so that concatenating
//! them reconstructs the original text exactly: chunk-level outputs may be
//! cached independently, and tests assert exact segment boundaries.

/// Hierarchical separators in order of preference.
const SEPARATORS: &[&str] = &["\n\n", "\n", ". ", "! ", "? ", "; ", ": ", " "];

/// Deterministic splitter over one separator hierarchy.
///
/// Identical `(text, max_size)` always yields the identical sequence.
#[derive(Debug, Clone, Default)]
pub struct TextChunker;

impl TextChunker {
    /// Create a chunker with the default separator hierarchy.
    pub fn new() -> Self {
        Self
    }

    /// Split `text` into ordered segments of at most `max_size` bytes.
    ///
    /// If the text already fits, the single original segment is returned
    /// unchanged. Concatenating the returned segments always reproduces
    /// the input exactly.
    pub fn split(&self, text: &str, max_size: usize) -> Vec<String> {
        if text.len() <= max_size {
            return vec![text.to_string()];
        }

        let mut segments = Vec::new();
        let mut start = 0;

        while start < text.len() {
            let mut end = floor_char_boundary(text, (start + max_size).min(text.len()));

            if end >= text.len() {
                segments.push(text[start..].to_string());
                break;
            }

            if let Some(boundary) = Self::best_boundary(text, start, end) {
                end = boundary;
            } else {
                end = Self::word_boundary_backward(text, start, end);
            }

            // A degenerate window with no boundary at all must still make
            // progress, one character at a time.
            if end <= start {
                end = ceil_char_boundary(text, start + 1);
            }

            segments.push(text[start..end].to_string());
            start = end;
        }

        segments
    }

    /// Find the best separator-aligned cut inside `(start, max_end]`.
    ///
    /// Cuts land after the separator so the separator text stays with the
    /// left segment. A cut in the first quarter of the window is rejected
    /// in favor of a lower-priority separator further right.
    fn best_boundary(text: &str, start: usize, max_end: usize) -> Option<usize> {
        let window = &text[start..max_end];
        for separator in SEPARATORS {
            if let Some(pos) = window.rfind(separator) {
                let boundary = start + pos + separator.len();
                if boundary > start + (max_end - start) / 4 {
                    return Some(boundary);
                }
            }
        }
        None
    }

    /// Nearest whitespace-aligned cut at or before `end`.
    fn word_boundary_backward(text: &str, start: usize, end: usize) -> usize {
        let window = &text[start..end];
        match window.rfind(char::is_whitespace) {
            Some(pos) => {
                let ws_len = window[pos..]
                    .chars()
                    .next()
                    .map(char::len_utf8)
                    .unwrap_or(1);
                start + pos + ws_len
            }
            None => end,
        }
    }
}

fn floor_char_boundary(text: &str, mut pos: usize) -> usize {
    pos = pos.min(text.len());
    while pos > 0 && !text.is_char_boundary(pos) {
        pos -= 1;
    }
    pos
}

fn ceil_char_boundary(text: &str, mut pos: usize) -> usize {
    pos = pos.min(text.len());
    while pos < text.len() && !text.is_char_boundary(pos) {
        pos += 1;
    }
    pos
}
