//! Speech capability contracts and the adapters the session drives.
//!
//! # Architecture
//!
//! ```text
//! SpeechRecognizer (trait) ──▶ SpeechInputAdapter   start / abort, listen generations
//! SpeechSynthesizer (trait) ─▶ SpeechOutputAdapter  one utterance in flight
//! SentenceStreamBuffer       backend text → speakable units
//! ```
//!
//! Engines report back asynchronously through an [`EventSink`].  They are
//! treated as opaque capability providers: [`crate::stt::DictationRecognizer`]
//! and [`crate::tts::EspeakSynthesizer`] are the bundled implementations.

pub mod input;
pub mod output;
pub mod sentence;

use thiserror::Error;

use crate::events::EventSink;

pub use input::SpeechInputAdapter;
pub use output::{SpeechOutputAdapter, VoiceSettings};
pub use sentence::{SentenceStreamBuffer, DEFAULT_MIN_UNIT_CHARS};

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// A piece of recognised speech.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptEvent {
    pub text: String,
    /// `false` for interim hypotheses that later events supersede.
    pub is_final: bool,
}

impl TranscriptEvent {
    pub fn interim(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: false,
        }
    }

    pub fn final_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: true,
        }
    }
}

/// Everything a recognizer can report during one listen.
#[derive(Debug, Clone, PartialEq)]
pub enum RecognitionEvent {
    Transcript(TranscriptEvent),
    /// Listening ended naturally without a final transcript.
    NoResult,
    /// Recoverable recognition failure (no-speech glitch, engine hiccup).
    Error(String),
}

impl RecognitionEvent {
    /// Whether this event closes the listen that produced it.
    pub fn ends_listen(&self) -> bool {
        match self {
            RecognitionEvent::Transcript(t) => t.is_final,
            RecognitionEvent::NoResult | RecognitionEvent::Error(_) => true,
        }
    }
}

/// Lifecycle of one synthesized utterance.
#[derive(Debug, Clone, PartialEq)]
pub enum SynthesisEvent {
    Started,
    Ended,
    Error(String),
}

pub type RecognitionSink = EventSink<RecognitionEvent>;
pub type SynthesisSink = EventSink<SynthesisEvent>;

/// Text plus the voice parameters it should be spoken with.
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub text: String,
    /// Speaking rate; 1.0 is the engine's normal speed.
    pub rate: f32,
    /// Pitch multiplier; 1.0 is the engine's normal pitch.
    pub pitch: f32,
    pub voice: Option<String>,
}

// ---------------------------------------------------------------------------
// SpeechError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SpeechError {
    /// The runtime has no usable engine for this capability.
    #[error("speech capability unavailable: {0}")]
    CapabilityUnavailable(String),

    /// `speak` was called while another utterance was still playing.
    #[error("an utterance is already in flight")]
    UtteranceInFlight,

    /// The engine refused the request.
    #[error("speech engine error: {0}")]
    Engine(String),
}

// ---------------------------------------------------------------------------
// Capability traits
// ---------------------------------------------------------------------------

/// Speech-to-text capability with single-utterance semantics.
///
/// One `start` yields zero or more interim transcripts followed by exactly
/// one terminal event: a final transcript, `NoResult`, or `Error`.  The
/// engine then stops itself and must be started again.
pub trait SpeechRecognizer: Send {
    fn start(&mut self, sink: RecognitionSink) -> Result<(), SpeechError>;

    /// Stop listening immediately and discard any partial result.
    ///
    /// Must be safe to call when not listening.
    fn abort(&mut self);
}

/// Text-to-speech capability; one utterance at a time.
pub trait SpeechSynthesizer: Send {
    fn speak(&mut self, utterance: Utterance, sink: SynthesisSink) -> Result<(), SpeechError>;

    /// Stop the active utterance, if any.  Must be safe to call when idle.
    fn cancel(&mut self);
}

// Compile-time assertion: both capabilities are object-safe.
const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn SpeechRecognizer>, _: Box<dyn SpeechSynthesizer>) {}
};
