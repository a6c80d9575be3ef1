//! Speech-to-text.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │  DictationRecognizer (impl SpeechRecognizer)         │
//! │                                                      │
//! │   capture broadcast ─▶ UtteranceDetector ─▶ clip     │
//! │                                              │       │
//! │                                              ▼       │
//! │                      ┌──────────────────────────┐    │
//! │                      │ SttEngine (trait)        │    │
//! │                      │  WhisperEngine  (native) │    │
//! │                      └──────────────────────────┘    │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick start
//!
//! ```rust,no_run
//! # #[cfg(feature = "native")]
//! # fn demo() {
//! use voice_dialogue::stt::{SttEngine, TranscribeParams, WhisperEngine};
//!
//! let engine = WhisperEngine::load("models/ggml-base.en.bin", TranscribeParams::default())
//!     .expect("model not found");
//! let audio: Vec<f32> = vec![0.0; 16_000]; // 1 s of silence at 16 kHz
//! println!("{}", engine.transcribe(&audio).unwrap());
//! # }
//! ```

pub mod engine;
pub mod recognizer;
pub mod transcribe;

pub use engine::{SttEngine, SttError};
#[cfg(feature = "native")]
pub use engine::WhisperEngine;
pub use recognizer::{DictationRecognizer, DictationSettings, RECOGNIZER_SAMPLE_RATE};
pub use transcribe::{clean_transcript, SamplingStrategy, TranscribeParams};

#[cfg(test)]
pub use engine::MockSttEngine;
