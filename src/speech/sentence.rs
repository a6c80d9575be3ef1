//! Sentence-boundary chunking of streamed backend text.
//!
//! The backend streams its reply in arbitrary fragments.  Speaking each
//! fragment would sound choppy; waiting for the whole reply adds latency.
//! [`SentenceStreamBuffer`] releases text as soon as a sentence is complete
//! (`.`, `?` or `!`), or once enough unpunctuated text has piled up.
//!
//! Units are emitted in arrival order and concatenate to exactly the text
//! that was pushed.
//!
//! ```rust
//! use voice_dialogue::speech::SentenceStreamBuffer;
//!
//! let mut buf = SentenceStreamBuffer::new(30);
//! assert!(buf.push("Hello").is_empty());
//! assert_eq!(buf.push(" there. How"), vec!["Hello there."]);
//! assert_eq!(buf.finish().as_deref(), Some(" How"));
//! ```

/// Unpunctuated length (in characters) that forces a unit out.
pub const DEFAULT_MIN_UNIT_CHARS: usize = 30;

const TERMINATORS: [char; 3] = ['.', '?', '!'];

#[derive(Debug, Clone)]
pub struct SentenceStreamBuffer {
    pending: String,
    min_chars: usize,
}

impl SentenceStreamBuffer {
    /// `min_chars` is the length fallback; values below 1 are raised to 1.
    pub fn new(min_chars: usize) -> Self {
        Self {
            pending: String::new(),
            min_chars: min_chars.max(1),
        }
    }

    /// Append `fragment` and return every unit that became ready.
    pub fn push(&mut self, fragment: &str) -> Vec<String> {
        self.pending.push_str(fragment);
        let mut units = Vec::new();

        while let Some(idx) = self.pending.find(TERMINATORS) {
            // Terminators are ASCII, so idx + 1 is a char boundary.
            let rest = self.pending.split_off(idx + 1);
            units.push(std::mem::replace(&mut self.pending, rest));
        }

        if self.pending.chars().count() >= self.min_chars {
            units.push(std::mem::take(&mut self.pending));
        }

        units
    }

    /// Flush the remainder at end of stream, whatever its length.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.pending))
        }
    }

    /// Drop buffered text without emitting it.
    pub fn clear(&mut self) {
        self.pending.clear();
    }

    pub fn pending(&self) -> &str {
        &self.pending
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl Default for SentenceStreamBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_UNIT_CHARS)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
