//! Microphone → frame uplink task.
//!
//! Subscribes to the capture broadcast, converts every chunk to mono at the
//! encoder's rate, and hands completed [`AudioFrame`](super::AudioFrame)s to
//! the coordinator.  Whether a frame is actually transmitted is the
//! coordinator's decision.

use tokio::sync::broadcast;

use crate::session::CallHandle;

use super::{AudioChunk, AudioFrameEncoder};

/// Run until the capture broadcast closes or the coordinator goes away.
///
/// The partial frame still held by the encoder is flushed when capture
/// closes.
pub async fn run_uplink(
    mut rx: broadcast::Receiver<AudioChunk>,
    mut encoder: AudioFrameEncoder,
    handle: CallHandle,
) {
    log::debug!(
        "uplink: {} samples per frame at {} Hz",
        encoder.frame_len(),
        encoder.sample_rate()
    );
    loop {
        match rx.recv().await {
            Ok(chunk) => {
                let mono = chunk.to_mono(encoder.sample_rate());
                for frame in encoder.push(&mono) {
                    if !handle.send_frame(frame) {
                        log::debug!("uplink: coordinator gone, stopping");
                        return;
                    }
                }
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                log::warn!("uplink: lagged, skipped {n} audio chunks");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    if let Some(frame) = encoder.flush() {
        handle.send_frame(frame);
    }
    log::debug!("uplink: capture closed");
}
