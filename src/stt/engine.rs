//! Batch transcription engines.
//!
//! [`SttEngine`] turns one finished clip of 16 kHz mono audio into text.  It
//! is object-safe and `Send + Sync` so the dictation recognizer can hand an
//! `Arc<dyn SttEngine>` to `spawn_blocking`.
//!
//! [`WhisperEngine`] (feature `native`) wraps `whisper_rs::WhisperContext`.
//! [`MockSttEngine`] (tests only) returns a canned response.

use thiserror::Error;

#[cfg(feature = "native")]
use std::path::Path;

#[cfg(feature = "native")]
use whisper_rs::{FullParams, WhisperContext, WhisperContextParameters};

#[cfg(feature = "native")]
use crate::stt::transcribe::{clean_transcript, SamplingStrategy, TranscribeParams};

// ---------------------------------------------------------------------------
// SttError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SttError {
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Whisper context initialisation failed: {0}")]
    ContextInit(String),

    #[error("Transcription error: {0}")]
    Transcription(String),

    /// Clips longer than [`MAX_AUDIO_SAMPLES`] are rejected.
    #[error("Audio too long: {0} samples (maximum 60 s at 16 kHz)")]
    AudioTooLong(usize),
}

// ---------------------------------------------------------------------------
// SttEngine trait
// ---------------------------------------------------------------------------

/// Speech-to-text over a complete clip.
///
/// `audio` is 16 kHz mono `f32`.  Clips shorter than [`MIN_AUDIO_SAMPLES`]
/// are padded with trailing silence by the engine; clips longer than
/// [`MAX_AUDIO_SAMPLES`] fail with [`SttError::AudioTooLong`].
pub trait SttEngine: Send + Sync {
    fn transcribe(&self, audio: &[f32]) -> Result<String, SttError>;
}

// Compile-time assertion: Box<dyn SttEngine> must be constructible.
const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn SttEngine>) {}
};

/// Whisper needs at least one second of input: 1 s × 16 000 Hz.
pub const MIN_AUDIO_SAMPLES: usize = 16_000;
/// 60 s × 16 000 Hz.
pub const MAX_AUDIO_SAMPLES: usize = 960_000;

/// Pad `audio` with silence up to [`MIN_AUDIO_SAMPLES`].
///
/// ```rust
/// use voice_dialogue::stt::engine::{pad_to_minimum, MIN_AUDIO_SAMPLES};
///
/// assert_eq!(pad_to_minimum(&[0.3; 100]).len(), MIN_AUDIO_SAMPLES);
/// ```
pub fn pad_to_minimum(audio: &[f32]) -> Vec<f32> {
    let mut padded = audio.to_vec();
    if padded.len() < MIN_AUDIO_SAMPLES {
        padded.resize(MIN_AUDIO_SAMPLES, 0.0);
    }
    padded
}

// ---------------------------------------------------------------------------
// WhisperEngine
// ---------------------------------------------------------------------------

/// Production engine backed by a GGML Whisper model.
///
/// A fresh `WhisperState` is created per call, so one engine can serve
/// concurrent transcriptions without locking.
#[cfg(feature = "native")]
pub struct WhisperEngine {
    ctx: WhisperContext,
    params: TranscribeParams,
}

#[cfg(feature = "native")]
impl std::fmt::Debug for WhisperEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhisperEngine")
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

// SAFETY: whisper-rs declares WhisperContext Send + Sync; the model weights
// are read-only after loading.
#[cfg(feature = "native")]
unsafe impl Send for WhisperEngine {}
#[cfg(feature = "native")]
unsafe impl Sync for WhisperEngine {}

#[cfg(feature = "native")]
impl WhisperEngine {
    /// Load a GGML model.
    ///
    /// # Errors
    ///
    /// [`SttError::ModelNotFound`] when the file is missing,
    /// [`SttError::ContextInit`] when whisper-rs cannot load it.
    pub fn load(model_path: impl AsRef<Path>, params: TranscribeParams) -> Result<Self, SttError> {
        let path = model_path.as_ref();
        if !path.exists() {
            return Err(SttError::ModelNotFound(path.display().to_string()));
        }
        let path_str = path
            .to_str()
            .ok_or_else(|| SttError::ModelNotFound(format!("non-UTF-8 path: {}", path.display())))?;

        let ctx = WhisperContext::new_with_params(path_str, WhisperContextParameters::default())
            .map_err(|e| SttError::ContextInit(e.to_string()))?;
        log::info!("stt: loaded model {}", path.display());
        Ok(Self { ctx, params })
    }

    fn full_params(&self) -> FullParams<'_, '_> {
        use whisper_rs::SamplingStrategy as WS;
        let strategy = match self.params.strategy {
            SamplingStrategy::Greedy { best_of } => WS::Greedy { best_of },
            SamplingStrategy::BeamSearch { beam_size, patience } => {
                WS::BeamSearch { beam_size, patience }
            }
        };

        let mut fp = FullParams::new(strategy);
        let lang = (self.params.language != "auto").then_some(self.params.language.as_str());
        fp.set_language(lang);
        fp.set_n_threads(self.params.n_threads);
        // Each utterance is independent; prior text only causes drift.
        fp.set_no_context(true);
        fp.set_print_progress(false);
        fp.set_print_realtime(false);
        fp.set_print_timestamps(false);
        fp
    }
}

#[cfg(feature = "native")]
impl SttEngine for WhisperEngine {
    fn transcribe(&self, audio: &[f32]) -> Result<String, SttError> {
        if audio.len() > MAX_AUDIO_SAMPLES {
            return Err(SttError::AudioTooLong(audio.len()));
        }
        let audio = pad_to_minimum(audio);

        let mut state = self
            .ctx
            .create_state()
            .map_err(|e| SttError::ContextInit(e.to_string()))?;
        let started = std::time::Instant::now();
        state
            .full(self.full_params(), &audio)
            .map_err(|e| SttError::Transcription(e.to_string()))?;

        let n_segments = state
            .full_n_segments()
            .map_err(|e| SttError::Transcription(e.to_string()))?;
        let mut text = String::new();
        for i in 0..n_segments {
            let segment = state
                .full_get_segment_text(i)
                .map_err(|e| SttError::Transcription(format!("segment {i}: {e}")))?;
            text.push_str(&segment);
        }

        log::debug!(
            "stt: {} samples -> {} segments in {} ms",
            audio.len(),
            n_segments,
            started.elapsed().as_millis()
        );
        Ok(clean_transcript(&text))
    }
}

// ---------------------------------------------------------------------------
// MockSttEngine  (test-only)
// ---------------------------------------------------------------------------

/// Returns a fixed response and counts calls.
#[cfg(test)]
pub struct MockSttEngine {
    response: Result<String, SttError>,
    calls: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl MockSttEngine {
    pub fn ok(text: impl Into<String>) -> Self {
        Self {
            response: Ok(text.into()),
            calls: Default::default(),
        }
    }

    pub fn err(error: SttError) -> Self {
        Self {
            response: Err(error),
            calls: Default::default(),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
impl SttEngine for MockSttEngine {
    fn transcribe(&self, audio: &[f32]) -> Result<String, SttError> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        if audio.len() > MAX_AUDIO_SAMPLES {
            return Err(SttError::AudioTooLong(audio.len()));
        }
        self.response.clone()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
