//! Synthesizer adapter enforcing a single in-flight utterance.

use super::{SpeechError, SpeechSynthesizer, SynthesisEvent, SynthesisSink, Utterance};

/// Voice parameters applied to every utterance.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceSettings {
    pub rate: f32,
    pub pitch: f32,
    pub voice: Option<String>,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            rate: 1.0,
            pitch: 1.0,
            voice: None,
        }
    }
}

/// Wraps a [`SpeechSynthesizer`]; rejects overlapping `speak` calls.
///
/// Each utterance gets an id stamped onto its events.  `cancel_all` and
/// completion both retire the id, so late `Ended` / `Error` callbacks from a
/// cancelled utterance fail [`is_current`](Self::is_current).
pub struct SpeechOutputAdapter {
    synthesizer: Box<dyn SpeechSynthesizer>,
    voice: VoiceSettings,
    next_id: u64,
    in_flight: Option<u64>,
}

impl SpeechOutputAdapter {
    pub fn new(synthesizer: Box<dyn SpeechSynthesizer>, voice: VoiceSettings) -> Self {
        Self {
            synthesizer,
            voice,
            next_id: 1,
            in_flight: None,
        }
    }

    /// Speak `text` with the configured voice.
    ///
    /// `deliver` receives the utterance's events with its id.
    ///
    /// # Errors
    ///
    /// [`SpeechError::UtteranceInFlight`] while another utterance is active,
    /// or whatever the synthesizer reports when it cannot start.
    pub fn speak<F>(&mut self, text: &str, deliver: F) -> Result<u64, SpeechError>
    where
        F: Fn(u64, SynthesisEvent) + Send + Sync + 'static,
    {
        if self.in_flight.is_some() {
            return Err(SpeechError::UtteranceInFlight);
        }
        let id = self.next_id;
        self.next_id += 1;

        let utterance = Utterance {
            text: text.to_string(),
            rate: self.voice.rate,
            pitch: self.voice.pitch,
            voice: self.voice.voice.clone(),
        };
        self.synthesizer
            .speak(utterance, SynthesisSink::new(move |event| deliver(id, event)))?;
        self.in_flight = Some(id);
        log::debug!("speech output: utterance #{id} ({} chars)", text.len());
        Ok(id)
    }

    /// Mark utterance `id` as finished (ended or failed).
    pub fn finish(&mut self, id: u64) {
        if self.in_flight == Some(id) {
            self.in_flight = None;
        }
    }

    /// Stop the active utterance.  Idempotent.
    pub fn cancel_all(&mut self) {
        if self.in_flight.take().is_some() {
            self.synthesizer.cancel();
            log::debug!("speech output: cancelled");
        }
    }

    pub fn is_current(&self, id: u64) -> bool {
        self.in_flight == Some(id)
    }

    pub fn is_speaking(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn voice(&self) -> &VoiceSettings {
        &self.voice
    }
}
