//! Energy-based voice activity detection.
//!
//! [`VadDetector`] classifies fixed-size frames by RMS amplitude and can trim
//! leading/trailing silence from a finished clip.  [`UtteranceDetector`]
//! applies the same classification to a live stream and decides when a
//! single spoken utterance is over: after enough trailing silence, after a
//! no-speech timeout, or when the maximum utterance length is reached.
//!
//! ## Algorithm
//!
//! Audio is split into 30 ms frames (480 samples @ 16 kHz).  A frame counts
//! as *voice* when its RMS amplitude exceeds the configured threshold.

use std::time::Duration;

// ---------------------------------------------------------------------------
// VadDetector
// ---------------------------------------------------------------------------

/// Energy-based frame classifier and silence trimmer.
///
/// ```rust
/// use voice_dialogue::audio::VadDetector;
///
/// let vad = VadDetector::new(0.01);
/// let mut audio = vec![0.0_f32; 480];
/// audio.extend(vec![0.5_f32; 480]);
/// audio.extend(vec![0.0_f32; 480]);
///
/// assert_eq!(vad.trim_silence(&audio).len(), 480);
/// ```
#[derive(Debug, Clone)]
pub struct VadDetector {
    rms_threshold: f32,
    frame_size: usize,
}

impl VadDetector {
    /// Detector with 30 ms frames at 16 kHz.
    pub fn new(rms_threshold: f32) -> Self {
        Self {
            rms_threshold,
            frame_size: 480,
        }
    }

    /// Detector with a custom frame size, for other sample rates.
    ///
    /// # Panics
    ///
    /// Panics if `frame_size == 0`.
    pub fn with_frame_size(rms_threshold: f32, frame_size: usize) -> Self {
        assert!(frame_size > 0, "frame_size must be > 0");
        Self {
            rms_threshold,
            frame_size,
        }
    }

    pub fn threshold(&self) -> f32 {
        self.rms_threshold
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Returns `true` when `chunk` carries voice energy.
    pub fn is_voice_frame(&self, chunk: &[f32]) -> bool {
        if chunk.is_empty() {
            return false;
        }
        let mean_sq: f32 = chunk.iter().map(|s| s * s).sum::<f32>() / chunk.len() as f32;
        mean_sq.sqrt() > self.rms_threshold
    }

    /// Trim leading and trailing silence; returns a sub-slice of `audio`.
    ///
    /// An all-silent clip yields an empty slice.
    pub fn trim_silence<'a>(&self, audio: &'a [f32]) -> &'a [f32] {
        let frames: Vec<&[f32]> = audio.chunks(self.frame_size).collect();

        let Some(first) = frames.iter().position(|f| self.is_voice_frame(f)) else {
            return &audio[0..0];
        };
        let last = frames
            .iter()
            .rposition(|f| self.is_voice_frame(f))
            .unwrap_or(first);

        let start = first * self.frame_size;
        let end = ((last + 1) * self.frame_size).min(audio.len());
        &audio[start..end]
    }
}

// ---------------------------------------------------------------------------
// UtteranceDetector
// ---------------------------------------------------------------------------

/// Outcome of feeding audio into an [`UtteranceDetector`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UtteranceStatus {
    /// No voice heard yet.
    Waiting,
    /// Voice heard; the utterance is still open.
    Speaking,
    /// Voice was heard and the utterance has ended.
    Complete,
    /// Nothing was said before the no-speech timeout.
    NoSpeech,
}

/// Limits that decide when a streamed utterance is over.
#[derive(Debug, Clone)]
pub struct UtteranceLimits {
    /// Trailing silence that closes an utterance.
    pub end_silence: Duration,
    /// How long to wait for any voice at all.
    pub no_speech_timeout: Duration,
    /// Hard cap on utterance length.
    pub max_utterance: Duration,
}

impl Default for UtteranceLimits {
    fn default() -> Self {
        Self {
            end_silence: Duration::from_millis(800),
            no_speech_timeout: Duration::from_secs(8),
            max_utterance: Duration::from_secs(30),
        }
    }
}

/// Streaming end-of-utterance detector.
pub struct UtteranceDetector {
    vad: VadDetector,
    end_silence_samples: usize,
    no_speech_samples: usize,
    max_samples: usize,
    carry: Vec<f32>,
    total: usize,
    silence_run: usize,
    heard_voice: bool,
}

impl UtteranceDetector {
    pub fn new(vad: VadDetector, sample_rate: u32, limits: &UtteranceLimits) -> Self {
        let samples = |d: Duration| (d.as_secs_f64() * sample_rate as f64) as usize;
        Self {
            end_silence_samples: samples(limits.end_silence),
            no_speech_samples: samples(limits.no_speech_timeout),
            max_samples: samples(limits.max_utterance),
            vad,
            carry: Vec::new(),
            total: 0,
            silence_run: 0,
            heard_voice: false,
        }
    }

    /// Classify `samples` and report the utterance status afterwards.
    ///
    /// Samples that do not fill a whole VAD frame are carried over to the
    /// next call.  Once `Complete` or `NoSpeech` is returned the detector
    /// keeps returning it.
    pub fn push(&mut self, samples: &[f32]) -> UtteranceStatus {
        if let Some(done) = self.terminal() {
            return done;
        }

        self.carry.extend_from_slice(samples);
        let frame_size = self.vad.frame_size();
        let whole = self.carry.len() / frame_size * frame_size;

        for frame in self.carry[..whole].chunks(frame_size) {
            self.total += frame.len();
            if self.vad.is_voice_frame(frame) {
                self.heard_voice = true;
                self.silence_run = 0;
            } else {
                self.silence_run += frame.len();
            }
            if self.terminal().is_some() {
                break;
            }
        }
        self.carry.drain(..whole);

        self.terminal().unwrap_or(if self.heard_voice {
            UtteranceStatus::Speaking
        } else {
            UtteranceStatus::Waiting
        })
    }

    fn terminal(&self) -> Option<UtteranceStatus> {
        if self.heard_voice {
            let ended = self.silence_run >= self.end_silence_samples;
            (ended || self.total >= self.max_samples).then_some(UtteranceStatus::Complete)
        } else {
            let timed_out = self.total >= self.no_speech_samples || self.total >= self.max_samples;
            timed_out.then_some(UtteranceStatus::NoSpeech)
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn make_signal(silent_pre: usize, voice: usize, silent_post: usize) -> Vec<f32> {
        let mut v = vec![0.0_f32; silent_pre];
        v.extend(vec![0.5_f32; voice]);
        v.extend(vec![0.0_f32; silent_post]);
        v
    }

    fn limits(end_ms: u64, no_speech_ms: u64, max_ms: u64) -> UtteranceLimits {
        UtteranceLimits {
            end_silence: Duration::from_millis(end_ms),
            no_speech_timeout: Duration::from_millis(no_speech_ms),
            max_utterance: Duration::from_millis(max_ms),
        }
    }

    // ---- VadDetector ---

    #[test]
    fn trims_leading_and_trailing_silence() {
        let audio = make_signal(480, 480, 480);
        assert_eq!(VadDetector::new(0.01).trim_silence(&audio).len(), 480);
    }

    #[test]
    fn all_silence_trims_to_empty() {
        let audio = vec![0.0_f32; 1440];
        assert!(VadDetector::new(0.01).trim_silence(&audio).is_empty());
    }

    #[test]
    fn empty_input_trims_to_empty() {
        assert!(VadDetector::new(0.01).trim_silence(&[]).is_empty());
    }

    #[test]
    fn custom_frame_size() {
        let vad = VadDetector::with_frame_size(0.01, 160);
        assert_eq!(vad.trim_silence(&make_signal(160, 160, 160)).len(), 160);
    }

    #[test]
    #[should_panic(expected = "frame_size must be > 0")]
    fn zero_frame_size_panics() {
        VadDetector::with_frame_size(0.01, 0);
    }

    // ---- UtteranceDetector ---

    #[test]
    fn silence_then_no_speech_timeout() {
        // 300 ms timeout at 16 kHz = 4800 samples = 10 frames.
        let mut det = UtteranceDetector::new(VadDetector::new(0.01), 16_000, &limits(500, 300, 5_000));
        assert_eq!(det.push(&vec![0.0; 3_000]), UtteranceStatus::Waiting);
        assert_eq!(det.push(&vec![0.0; 2_000]), UtteranceStatus::NoSpeech);
    }

    #[test]
    fn voice_then_trailing_silence_completes() {
        let mut det = UtteranceDetector::new(VadDetector::new(0.01), 16_000, &limits(300, 2_000, 5_000));
        assert_eq!(det.push(&vec![0.5; 4_800]), UtteranceStatus::Speaking);
        assert_eq!(det.push(&vec![0.0; 2_400]), UtteranceStatus::Speaking);
        assert_eq!(det.push(&vec![0.0; 2_400]), UtteranceStatus::Complete);
        // Stays terminal.
        assert_eq!(det.push(&vec![0.5; 480]), UtteranceStatus::Complete);
    }

    #[test]
    fn voice_resets_the_silence_run() {
        let mut det = UtteranceDetector::new(VadDetector::new(0.01), 16_000, &limits(300, 2_000, 10_000));
        det.push(&vec![0.5; 960]);
        det.push(&vec![0.0; 3_840]); // 240 ms
        assert_eq!(det.push(&vec![0.5; 480]), UtteranceStatus::Speaking);
        assert_eq!(det.push(&vec![0.0; 3_840]), UtteranceStatus::Speaking);
    }

    #[test]
    fn max_length_caps_an_endless_utterance() {
        let mut det = UtteranceDetector::new(VadDetector::new(0.01), 16_000, &limits(300, 2_000, 600));
        assert_eq!(det.push(&vec![0.5; 9_600]), UtteranceStatus::Complete);
    }

    #[test]
    fn partial_frames_are_carried_over() {
        let mut det = UtteranceDetector::new(VadDetector::new(0.01), 16_000, &limits(300, 2_000, 5_000));
        assert_eq!(det.push(&vec![0.5; 200]), UtteranceStatus::Waiting);
        assert_eq!(det.push(&vec![0.5; 300]), UtteranceStatus::Speaking);
    }
}
