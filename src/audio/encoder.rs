//! Float → 16-bit PCM frame encoder.
//!
//! [`AudioFrameEncoder`] turns a continuous stream of normalised `f32`
//! samples into fixed-size [`AudioFrame`]s of signed 16-bit PCM, ready to be
//! shipped to the dialogue backend as binary messages.
//!
//! ## Sample mapping
//!
//! Each sample is clamped to `[-1.0, 1.0]` and then scaled asymmetrically:
//! negative values by 32 768, non-negative values by 32 767.  The backend
//! decoder assumes exactly this mapping.
//!
//! # Example
//!
//! ```rust
//! use voice_dialogue::audio::AudioFrameEncoder;
//!
//! let mut enc = AudioFrameEncoder::new(4, 16_000);
//! let frames = enc.push(&[0.0, 0.5, -0.5, 1.0, -1.0, 0.25]);
//! assert_eq!(frames.len(), 1);
//! assert_eq!(frames[0].samples(), &[0, 16384, -16384, 32767]);
//! assert_eq!(enc.pending(), 2);
//! ```

use std::time::Duration;

/// Default frame length in samples (~256 ms at 16 kHz).
pub const DEFAULT_FRAME_SAMPLES: usize = 4096;

/// Map one normalised sample to signed 16-bit PCM.
///
/// ```rust
/// use voice_dialogue::audio::pcm_from_f32;
///
/// assert_eq!(pcm_from_f32(1.0), 32767);
/// assert_eq!(pcm_from_f32(-1.0), -32768);
/// assert_eq!(pcm_from_f32(2.5), 32767); // clamped
/// ```
pub fn pcm_from_f32(sample: f32) -> i16 {
    let s = sample.clamp(-1.0, 1.0);
    // NaN survives the clamp; the saturating float→int cast maps it to 0.
    if s < 0.0 {
        (s * 32_768.0).round() as i16
    } else {
        (s * 32_767.0).round() as i16
    }
}

// ---------------------------------------------------------------------------
// AudioFrame
// ---------------------------------------------------------------------------

/// One completed block of PCM audio.
///
/// Frames are immutable once emitted and own their samples, so they can be
/// moved across threads and serialised independently of the encoder.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    seq: u64,
    samples: Vec<i16>,
    sample_rate: u32,
}

impl AudioFrame {
    /// Position of this frame in the stream, starting at 0.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Playback duration of the frame.
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        let nanos = self.samples.len() as u64 * 1_000_000_000 / self.sample_rate as u64;
        Duration::from_nanos(nanos)
    }

    /// Little-endian byte payload for binary transmission.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        self.samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }
}

// ---------------------------------------------------------------------------
// AudioFrameEncoder
// ---------------------------------------------------------------------------

/// Accumulates mapped samples and cuts them into fixed-length frames.
pub struct AudioFrameEncoder {
    frame_len: usize,
    sample_rate: u32,
    buf: Vec<i16>,
    next_seq: u64,
}

impl AudioFrameEncoder {
    /// Create an encoder emitting frames of `frame_len` samples.
    ///
    /// # Panics
    ///
    /// Panics if `frame_len == 0`.
    pub fn new(frame_len: usize, sample_rate: u32) -> Self {
        assert!(frame_len > 0, "frame length must be > 0");
        Self {
            frame_len,
            sample_rate,
            buf: Vec::with_capacity(frame_len),
            next_seq: 0,
        }
    }

    /// Encode `block` and return every frame it completed (zero or more).
    pub fn push(&mut self, block: &[f32]) -> Vec<AudioFrame> {
        let mut frames = Vec::new();
        let mut rest = block;

        while !rest.is_empty() {
            let room = self.frame_len - self.buf.len();
            let take = room.min(rest.len());
            let (head, tail) = rest.split_at(take);
            self.buf.extend(head.iter().copied().map(pcm_from_f32));
            rest = tail;

            if self.buf.len() == self.frame_len {
                let full = std::mem::replace(&mut self.buf, Vec::with_capacity(self.frame_len));
                frames.push(self.seal(full));
            }
        }

        frames
    }

    /// Emit whatever is buffered as a final, possibly short frame.
    ///
    /// Returns `None` when nothing is pending.
    pub fn flush(&mut self) -> Option<AudioFrame> {
        if self.buf.is_empty() {
            return None;
        }
        let partial = std::mem::take(&mut self.buf);
        Some(self.seal(partial))
    }

    /// Samples held internally, not yet part of an emitted frame.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    pub fn frame_len(&self) -> usize {
        self.frame_len
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn seal(&mut self, samples: Vec<i16>) -> AudioFrame {
        let frame = AudioFrame {
            seq: self.next_seq,
            samples,
            sample_rate: self.sample_rate,
        };
        self.next_seq += 1;
        frame
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
