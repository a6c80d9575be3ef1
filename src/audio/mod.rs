//! Audio path: microphone capture → mono/resample → VAD and PCM framing.
//!
//! # Pipeline
//!
//! ```text
//! Microphone → cpal callback → AudioChunk (broadcast)
//!           ├─▶ DictationRecognizer: stereo_to_mono → resample → UtteranceDetector
//!           └─▶ uplink task:         stereo_to_mono → resample → AudioFrameEncoder
//!                                     → CallHandle::send_frame → transport
//! ```
//!
//! Capture itself ([`AudioCapture`]) needs the `native` feature; everything
//! else is plain Rust and works on synthetic chunks.

#[cfg(feature = "native")]
pub mod capture;
pub mod encoder;
pub mod resample;
pub mod uplink;
pub mod vad;

#[cfg(feature = "native")]
pub use capture::{AudioCapture, CaptureError, StreamHandle};
pub use encoder::{pcm_from_f32, AudioFrame, AudioFrameEncoder, DEFAULT_FRAME_SAMPLES};
pub use resample::{resample, stereo_to_mono};
pub use uplink::run_uplink;
pub use vad::{UtteranceDetector, UtteranceLimits, UtteranceStatus, VadDetector};

/// One hardware buffer of captured audio.
///
/// Samples are interleaved `f32` in `[-1.0, 1.0]`.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    pub samples: Vec<f32>,
    /// Sample rate in Hz (e.g. 44100, 48000, 16000).
    pub sample_rate: u32,
    /// Interleaved channel count.
    pub channels: u16,
}

impl AudioChunk {
    /// Downmix and resample to mono at `target_rate`.
    pub fn to_mono(&self, target_rate: u32) -> Vec<f32> {
        let mono = stereo_to_mono(&self.samples, self.channels);
        resample(&mono, self.sample_rate, target_rate)
    }
}
