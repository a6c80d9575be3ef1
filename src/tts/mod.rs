//! Text-to-speech engines.
//!
//! [`EspeakSynthesizer`] drives the `espeak-ng` command-line tool; any other
//! engine only needs to implement [`crate::speech::SpeechSynthesizer`].

pub mod espeak;

pub use espeak::{pitch_value, words_per_minute, EspeakSynthesizer};
