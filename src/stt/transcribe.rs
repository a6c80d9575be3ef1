//! Whisper decoding parameters and transcript cleanup.

// ---------------------------------------------------------------------------
// SamplingStrategy
// ---------------------------------------------------------------------------

/// Owned, `Clone` mirror of `whisper_rs::SamplingStrategy`.
#[derive(Debug, Clone, PartialEq)]
pub enum SamplingStrategy {
    Greedy { best_of: i32 },
    BeamSearch { beam_size: i32, patience: f32 },
}

impl Default for SamplingStrategy {
    fn default() -> Self {
        Self::Greedy { best_of: 1 }
    }
}

// ---------------------------------------------------------------------------
// TranscribeParams
// ---------------------------------------------------------------------------

/// Settings for one Whisper inference run.
///
/// ```
/// use voice_dialogue::stt::TranscribeParams;
///
/// let params = TranscribeParams::for_language("en-US");
/// assert_eq!(params.language, "en");
/// ```
#[derive(Debug, Clone)]
pub struct TranscribeParams {
    /// ISO-639-1 code, or `"auto"` for detection.
    pub language: String,
    pub strategy: SamplingStrategy,
    /// CPU threads handed to Whisper.
    pub n_threads: i32,
}

impl TranscribeParams {
    /// Params for a BCP-47 tag such as `en-US`; only the primary subtag is
    /// used.
    pub fn for_language(tag: &str) -> Self {
        let primary = tag.split(['-', '_']).next().unwrap_or("").trim();
        let language = if primary.is_empty() {
            "auto".to_string()
        } else {
            primary.to_ascii_lowercase()
        };
        Self {
            language,
            ..Self::default()
        }
    }
}

impl Default for TranscribeParams {
    fn default() -> Self {
        Self {
            language: "en".into(),
            strategy: SamplingStrategy::default(),
            n_threads: optimal_threads(),
        }
    }
}

/// Available parallelism capped at 8.
pub(crate) fn optimal_threads() -> i32 {
    std::thread::available_parallelism()
        .map(|n| n.get().min(8) as i32)
        .unwrap_or(4)
}

// ---------------------------------------------------------------------------
// clean_transcript
// ---------------------------------------------------------------------------

/// Strip non-speech annotations Whisper emits on silence or noise
/// (`[BLANK_AUDIO]`, `(music)`, `*coughs*`) and collapse whitespace.
///
/// ```
/// use voice_dialogue::stt::clean_transcript;
///
/// assert_eq!(clean_transcript(" [BLANK_AUDIO]"), "");
/// assert_eq!(clean_transcript(" Book a  repair. (door slams)"), "Book a repair.");
/// ```
pub fn clean_transcript(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut closer: Option<char> = None;
    for c in raw.chars() {
        match closer {
            Some(end) if c == end => closer = None,
            Some(_) => {}
            None => match c {
                '[' => closer = Some(']'),
                '(' => closer = Some(')'),
                '*' => closer = Some('*'),
                _ => out.push(c),
            },
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_language_is_english() {
        assert_eq!(TranscribeParams::default().language, "en");
    }

    #[test]
    fn language_tag_uses_primary_subtag() {
        assert_eq!(TranscribeParams::for_language("en-US").language, "en");
        assert_eq!(TranscribeParams::for_language("th_TH").language, "th");
        assert_eq!(TranscribeParams::for_language("").language, "auto");
    }

    #[test]
    fn threads_are_bounded() {
        let t = optimal_threads();
        assert!((1..=8).contains(&t));
    }

    #[test]
    fn plain_text_is_trimmed() {
        assert_eq!(clean_transcript("  hello   world "), "hello world");
    }

    #[test]
    fn annotations_are_removed() {
        assert_eq!(clean_transcript("[MUSIC] yes please *laughs*"), "yes please");
    }

    #[test]
    fn unterminated_annotation_drops_rest() {
        assert_eq!(clean_transcript("okay [inaudible"), "okay");
    }
}
