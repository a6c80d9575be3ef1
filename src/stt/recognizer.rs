//! Single-utterance recognizer over live microphone audio.
//!
//! ```text
//! start(sink)
//!   └─▶ subscribe to capture broadcast
//!         └─▶ to_mono(16 kHz) → UtteranceDetector
//!               ├─ NoSpeech ─────────────▶ sink: NoResult
//!               └─ Complete → trim_silence
//!                     └─▶ spawn_blocking(engine.transcribe)
//!                           ├─ text  ────▶ sink: Transcript(final)
//!                           ├─ empty ────▶ sink: NoResult
//!                           └─ error ────▶ sink: Error
//! abort()  └─▶ cancel the listen task; nothing more is emitted
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::audio::{AudioChunk, UtteranceDetector, UtteranceLimits, UtteranceStatus, VadDetector};
use crate::speech::{RecognitionEvent, RecognitionSink, SpeechError, SpeechRecognizer, TranscriptEvent};

use super::engine::SttEngine;
use super::transcribe::clean_transcript;

/// Rate the engine expects.
pub const RECOGNIZER_SAMPLE_RATE: u32 = 16_000;

/// Audio kept from before the first voice frame, so soft word onsets are
/// not clipped.
const PRE_ROLL: Duration = Duration::from_millis(300);

#[derive(Debug, Clone)]
pub struct DictationSettings {
    /// RMS level above which a 30 ms frame counts as voice.
    pub vad_threshold: f32,
    pub limits: UtteranceLimits,
}

impl Default for DictationSettings {
    fn default() -> Self {
        Self {
            vad_threshold: 0.01,
            limits: UtteranceLimits::default(),
        }
    }
}

/// [`SpeechRecognizer`] built from an energy VAD plus a batch [`SttEngine`].
///
/// Produces no interim transcripts: each listen yields exactly one of
/// final transcript, `NoResult` or `Error`.
pub struct DictationRecognizer {
    engine: Arc<dyn SttEngine>,
    audio: broadcast::Sender<AudioChunk>,
    settings: DictationSettings,
    task: Option<JoinHandle<()>>,
}

impl DictationRecognizer {
    pub fn new(
        engine: Arc<dyn SttEngine>,
        audio: broadcast::Sender<AudioChunk>,
        settings: DictationSettings,
    ) -> Self {
        Self {
            engine,
            audio,
            settings,
            task: None,
        }
    }
}

impl SpeechRecognizer for DictationRecognizer {
    fn start(&mut self, sink: RecognitionSink) -> Result<(), SpeechError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| SpeechError::CapabilityUnavailable("no async runtime".into()))?;
        self.abort();

        let rx = self.audio.subscribe();
        let engine = Arc::clone(&self.engine);
        let settings = self.settings.clone();
        self.task = Some(runtime.spawn(listen(rx, engine, settings, sink)));
        Ok(())
    }

    fn abort(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for DictationRecognizer {
    fn drop(&mut self) {
        self.abort();
    }
}

async fn listen(
    mut rx: broadcast::Receiver<AudioChunk>,
    engine: Arc<dyn SttEngine>,
    settings: DictationSettings,
    sink: RecognitionSink,
) {
    let frame_size = (RECOGNIZER_SAMPLE_RATE as usize * 30 / 1000).max(1);
    let vad = VadDetector::with_frame_size(settings.vad_threshold, frame_size);
    let mut detector = UtteranceDetector::new(vad.clone(), RECOGNIZER_SAMPLE_RATE, &settings.limits);
    let pre_roll = (PRE_ROLL.as_secs_f32() * RECOGNIZER_SAMPLE_RATE as f32) as usize;

    let mut clip: Vec<f32> = Vec::new();
    loop {
        let chunk = match rx.recv().await {
            Ok(chunk) => chunk,
            Err(broadcast::error::RecvError::Lagged(n)) => {
                log::warn!("recognizer: lagged, skipped {n} audio chunks");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => {
                sink.emit(RecognitionEvent::Error("audio input closed".into()));
                return;
            }
        };

        let mono = chunk.to_mono(RECOGNIZER_SAMPLE_RATE);
        clip.extend_from_slice(&mono);
        match detector.push(&mono) {
            UtteranceStatus::Waiting => {
                if clip.len() > pre_roll {
                    clip.drain(..clip.len() - pre_roll);
                }
            }
            UtteranceStatus::Speaking => {}
            UtteranceStatus::NoSpeech => {
                log::debug!("recognizer: no speech before timeout");
                sink.emit(RecognitionEvent::NoResult);
                return;
            }
            UtteranceStatus::Complete => break,
        }
    }
    drop(rx);

    let speech = vad.trim_silence(&clip).to_vec();
    log::debug!("recognizer: utterance of {} samples", speech.len());
    let result = tokio::task::spawn_blocking(move || engine.transcribe(&speech)).await;

    let event = match result {
        Ok(Ok(text)) => {
            let text = clean_transcript(&text);
            if text.is_empty() {
                RecognitionEvent::NoResult
            } else {
                RecognitionEvent::Transcript(TranscriptEvent::final_text(text))
            }
        }
        Ok(Err(e)) => RecognitionEvent::Error(e.to_string()),
        Err(e) => RecognitionEvent::Error(format!("transcription task failed: {e}")),
    };
    sink.emit(event);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stt::engine::MockSttEngine;
    use crate::stt::SttError;
    use tokio::sync::mpsc;

    fn settings() -> DictationSettings {
        DictationSettings {
            vad_threshold: 0.01,
            limits: UtteranceLimits {
                end_silence: Duration::from_millis(300),
                no_speech_timeout: Duration::from_millis(600),
                max_utterance: Duration::from_secs(5),
            },
        }
    }

    fn chunk(level: f32, ms: usize) -> AudioChunk {
        AudioChunk {
            samples: vec![level; RECOGNIZER_SAMPLE_RATE as usize * ms / 1000],
            sample_rate: RECOGNIZER_SAMPLE_RATE,
            channels: 1,
        }
    }

    fn collecting_sink() -> (RecognitionSink, mpsc::UnboundedReceiver<RecognitionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            RecognitionSink::new(move |ev| {
                let _ = tx.send(ev);
            }),
            rx,
        )
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<RecognitionEvent>) -> RecognitionEvent {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("no recognition event")
            .expect("sink dropped")
    }

    #[tokio::test]
    async fn speech_then_silence_yields_final_transcript() {
        let (audio, _keep) = broadcast::channel(64);
        let engine = Arc::new(MockSttEngine::ok(" Book a repair. [BLANK_AUDIO]"));
        let mut rec = DictationRecognizer::new(engine.clone(), audio.clone(), settings());
        let (sink, mut events) = collecting_sink();
        rec.start(sink).unwrap();

        audio.send(chunk(0.0, 100)).unwrap();
        audio.send(chunk(0.4, 600)).unwrap();
        audio.send(chunk(0.0, 400)).unwrap();

        assert_eq!(
            next(&mut events).await,
            RecognitionEvent::Transcript(TranscriptEvent::final_text("Book a repair."))
        );
        assert_eq!(engine.calls(), 1);
    }

    #[tokio::test]
    async fn silence_times_out_with_no_result() {
        let (audio, _keep) = broadcast::channel(64);
        let engine = Arc::new(MockSttEngine::ok("never"));
        let mut rec = DictationRecognizer::new(engine.clone(), audio.clone(), settings());
        let (sink, mut events) = collecting_sink();
        rec.start(sink).unwrap();

        for _ in 0..4 {
            audio.send(chunk(0.0, 200)).unwrap();
        }
        assert_eq!(next(&mut events).await, RecognitionEvent::NoResult);
        assert_eq!(engine.calls(), 0);
    }

    #[tokio::test]
    async fn engine_failure_is_transient_error() {
        let (audio, _keep) = broadcast::channel(64);
        let engine = Arc::new(MockSttEngine::err(SttError::Transcription("decoder".into())));
        let mut rec = DictationRecognizer::new(engine, audio.clone(), settings());
        let (sink, mut events) = collecting_sink();
        rec.start(sink).unwrap();

        audio.send(chunk(0.4, 300)).unwrap();
        audio.send(chunk(0.0, 400)).unwrap();
        assert!(matches!(next(&mut events).await, RecognitionEvent::Error(_)));
    }

    #[tokio::test]
    async fn empty_transcript_is_no_result() {
        let (audio, _keep) = broadcast::channel(64);
        let engine = Arc::new(MockSttEngine::ok("[BLANK_AUDIO]"));
        let mut rec = DictationRecognizer::new(engine, audio.clone(), settings());
        let (sink, mut events) = collecting_sink();
        rec.start(sink).unwrap();

        audio.send(chunk(0.4, 300)).unwrap();
        audio.send(chunk(0.0, 400)).unwrap();
        assert_eq!(next(&mut events).await, RecognitionEvent::NoResult);
    }

    #[tokio::test]
    async fn abort_suppresses_events() {
        let (audio, _keep) = broadcast::channel(64);
        let engine = Arc::new(MockSttEngine::ok("hello"));
        let mut rec = DictationRecognizer::new(engine.clone(), audio.clone(), settings());
        let (sink, mut events) = collecting_sink();
        rec.start(sink).unwrap();
        tokio::task::yield_now().await;
        rec.abort();
        rec.abort();

        let _ = audio.send(chunk(0.4, 300));
        let _ = audio.send(chunk(0.0, 400));
        let waited = tokio::time::timeout(Duration::from_millis(100), events.recv()).await;
        // Either nothing arrives or the sink was dropped with the task.
        assert!(matches!(waited, Err(_) | Ok(None)));
        assert_eq!(engine.calls(), 0);
    }

    #[test]
    fn start_without_runtime_is_unavailable() {
        let (audio, _keep) = broadcast::channel(4);
        let mut rec = DictationRecognizer::new(Arc::new(MockSttEngine::ok("x")), audio, settings());
        let (sink, _events) = collecting_sink();
        assert!(matches!(
            rec.start(sink),
            Err(SpeechError::CapabilityUnavailable(_))
        ));
    }
}
