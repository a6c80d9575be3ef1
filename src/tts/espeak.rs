//! espeak-ng child-process synthesizer.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::task::JoinHandle;

use crate::speech::{SpeechError, SpeechSynthesizer, SynthesisEvent, SynthesisSink, Utterance};

/// Text larger than this is refused (64 KiB).
const MAX_TTS_INPUT_BYTES: usize = 64 * 1024;

/// Upper bound on one utterance's playback.
const TTS_TIMEOUT: Duration = Duration::from_secs(60);

/// Words per minute at rate 1.0.
pub const BASE_WPM: f32 = 175.0;
/// Pitch value at pitch 1.0 (espeak range 0-99).
pub const BASE_PITCH: f32 = 50.0;

/// espeak-ng speed for a rate multiplier, within the engine's 80-450 wpm.
pub fn words_per_minute(rate: f32) -> u32 {
    (BASE_WPM * rate).round().clamp(80.0, 450.0) as u32
}

/// espeak-ng pitch for a pitch multiplier, within 0-99.
pub fn pitch_value(pitch: f32) -> u32 {
    (BASE_PITCH * pitch).round().clamp(0.0, 99.0) as u32
}

/// Speaks through `espeak-ng` on the default audio output.
///
/// Each utterance is one child process fed through stdin; `cancel` kills it.
pub struct EspeakSynthesizer {
    binary: PathBuf,
    task: Option<JoinHandle<()>>,
}

impl EspeakSynthesizer {
    pub fn new(binary: impl AsRef<Path>) -> Self {
        Self {
            binary: binary.as_ref().to_path_buf(),
            task: None,
        }
    }

    fn command(&self, utterance: &Utterance) -> Command {
        let mut command = Command::new(&self.binary);
        command
            .arg("-s")
            .arg(words_per_minute(utterance.rate).to_string())
            .arg("-p")
            .arg(pitch_value(utterance.pitch).to_string());
        if let Some(voice) = &utterance.voice {
            command.arg("-v").arg(voice);
        }
        command
            .arg("--stdin")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }
}

impl Default for EspeakSynthesizer {
    fn default() -> Self {
        Self::new("espeak-ng")
    }
}

impl SpeechSynthesizer for EspeakSynthesizer {
    fn speak(&mut self, utterance: Utterance, sink: SynthesisSink) -> Result<(), SpeechError> {
        if utterance.text.len() > MAX_TTS_INPUT_BYTES {
            return Err(SpeechError::Engine(format!(
                "text exceeds maximum size: {} bytes (limit: {MAX_TTS_INPUT_BYTES} bytes)",
                utterance.text.len()
            )));
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| SpeechError::CapabilityUnavailable("no async runtime".into()))?;
        self.cancel();

        let mut child = {
            let _guard = runtime.enter();
            self.command(&utterance).spawn().map_err(|e| match e.kind() {
                ErrorKind::NotFound => SpeechError::CapabilityUnavailable(format!(
                    "{} not found",
                    self.binary.display()
                )),
                _ => SpeechError::Engine(format!("failed to spawn {}: {e}", self.binary.display())),
            })?
        };
        let stdin = child.stdin.take();
        let text = utterance.text;

        self.task = Some(runtime.spawn(async move {
            sink.emit(SynthesisEvent::Started);

            if let Some(mut stdin) = stdin {
                if let Err(e) = stdin.write_all(text.as_bytes()).await {
                    log::debug!("tts: stdin write failed: {e}");
                }
            }

            let event = match tokio::time::timeout(TTS_TIMEOUT, child.wait_with_output()).await {
                Ok(Ok(output)) if output.status.success() => SynthesisEvent::Ended,
                Ok(Ok(output)) => {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    SynthesisEvent::Error(format!("espeak-ng failed ({}): {}", output.status, stderr.trim()))
                }
                Ok(Err(e)) => SynthesisEvent::Error(format!("failed to wait for espeak-ng: {e}")),
                Err(_) => SynthesisEvent::Error(format!(
                    "speech timed out after {} seconds",
                    TTS_TIMEOUT.as_secs()
                )),
            };
            sink.emit(event);
        }));
        Ok(())
    }

    fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for EspeakSynthesizer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn utterance(text: &str) -> Utterance {
        Utterance {
            text: text.into(),
            rate: 1.0,
            pitch: 1.0,
            voice: None,
        }
    }

    fn collecting_sink() -> (SynthesisSink, mpsc::UnboundedReceiver<SynthesisEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            SynthesisSink::new(move |ev| {
                let _ = tx.send(ev);
            }),
            rx,
        )
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<SynthesisEvent>) -> Option<SynthesisEvent> {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .ok()
            .flatten()
    }

    #[test]
    fn rate_maps_to_words_per_minute() {
        assert_eq!(words_per_minute(1.0), 175);
        assert_eq!(words_per_minute(2.0), 350);
        assert_eq!(words_per_minute(0.1), 80);
        assert_eq!(words_per_minute(10.0), 450);
    }

    #[test]
    fn pitch_maps_to_espeak_range() {
        assert_eq!(pitch_value(1.0), 50);
        assert_eq!(pitch_value(0.0), 0);
        assert_eq!(pitch_value(3.0), 99);
    }

    #[test]
    fn command_carries_voice_settings() {
        let synth = EspeakSynthesizer::default();
        let mut u = utterance("hi");
        u.voice = Some("en-us".into());
        u.rate = 1.2;
        let cmd = synth.command(&u);
        let args: Vec<_> = cmd.as_std().get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(args, vec!["-s", "210", "-p", "50", "-v", "en-us", "--stdin"]);
    }

    #[tokio::test]
    async fn missing_binary_is_capability_unavailable() {
        let mut synth = EspeakSynthesizer::new("/nonexistent/espeak-ng");
        let (sink, _rx) = collecting_sink();
        assert!(matches!(
            synth.speak(utterance("hello"), sink),
            Err(SpeechError::CapabilityUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn oversized_text_is_refused() {
        let mut synth = EspeakSynthesizer::new("true");
        let (sink, _rx) = collecting_sink();
        let text = "a".repeat(MAX_TTS_INPUT_BYTES + 1);
        assert!(matches!(
            synth.speak(utterance(&text), sink),
            Err(SpeechError::Engine(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn successful_run_reports_started_then_ended() {
        let mut synth = EspeakSynthesizer::new("true");
        let (sink, mut rx) = collecting_sink();
        synth.speak(utterance("hello"), sink).unwrap();
        assert_eq!(next(&mut rx).await, Some(SynthesisEvent::Started));
        assert_eq!(next(&mut rx).await, Some(SynthesisEvent::Ended));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_run_reports_error() {
        let mut synth = EspeakSynthesizer::new("false");
        let (sink, mut rx) = collecting_sink();
        synth.speak(utterance("hello"), sink).unwrap();
        assert_eq!(next(&mut rx).await, Some(SynthesisEvent::Started));
        assert!(matches!(next(&mut rx).await, Some(SynthesisEvent::Error(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn cancel_suppresses_completion() {
        // `sh -s` runs the utterance text as a script.
        let mut synth = EspeakSynthesizer::new("sh");
        let (sink, mut rx) = collecting_sink();
        synth.speak(utterance("sleep 5"), sink).unwrap();
        assert_eq!(next(&mut rx).await, Some(SynthesisEvent::Started));

        synth.cancel();
        synth.cancel();
        let after = tokio::time::timeout(Duration::from_millis(300), rx.recv()).await;
        assert!(!matches!(after, Ok(Some(SynthesisEvent::Ended))));
    }
}
