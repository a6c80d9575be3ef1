//! Turn coordinator: the single writer of session state.
//!
//! [`TurnCoordinator`] owns the speech adapters, the sentence buffer and the
//! transport link.  Every change happens inside [`apply`](TurnCoordinator::apply),
//! called from one task, so no flag is ever shared between callbacks.
//!
//! # Turn flow
//!
//! ```text
//! Start           └─▶ spawn connect                          [Connecting]
//! Connected       └─▶ recognizer.start                       [Listening]
//! final transcript└─▶ send {text, config, mode}, restart listening
//! fragment        └─▶ SentenceStreamBuffer → queue
//!                       └─▶ recognizer.abort, synthesizer.speak   [Speaking]
//! synthesis ended └─▶ next queued unit, or restart listening [Listening]
//! Stop / closed   └─▶ cancel, abort, close                   [Ended]
//! (a reply that arrives while Connecting is queued and spoken on connect)
//! fault           └─▶ cancel, abort, close                   [Error]
//! ```
//!
//! Teardown bumps `epoch`.  Callbacks stamped with an older epoch, an
//! aborted listen generation or a retired utterance id are dropped.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::audio::AudioFrame;
use crate::speech::{
    RecognitionEvent, SentenceStreamBuffer, SpeechError, SpeechInputAdapter, SpeechOutputAdapter,
    SpeechRecognizer, SpeechSynthesizer, SynthesisEvent, VoiceSettings, DEFAULT_MIN_UNIT_CHARS,
};
use crate::transport::{
    Connector, InboundMessage, OutboundMessage, TransportError, TransportEvent, TransportLink,
    TransportSink,
};

use super::events::{call_channel, CallHandle, CoordinatorEvent, SessionCommand, SessionError};
use super::state::{Role, Session, SharedCallState, TurnState};

/// Length of the transcript preview in the "Processing" status.
const STATUS_PREVIEW_CHARS: usize = 20;

/// Status after a locally requested stop.
pub const READY_STATUS: &str = "Ready to Interview";

// ---------------------------------------------------------------------------
// CoordinatorSettings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    /// Operator knowledge base forwarded with every message.
    pub config_text: String,
    pub mode: Option<String>,
    pub voice: VoiceSettings,
    pub sentence_min_chars: usize,
    /// Consecutive transient recognition errors tolerated before the
    /// session fails.
    pub max_consecutive_errors: u32,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            config_text: String::new(),
            mode: None,
            voice: VoiceSettings::default(),
            sentence_min_chars: DEFAULT_MIN_UNIT_CHARS,
            max_consecutive_errors: 5,
        }
    }
}

// ---------------------------------------------------------------------------
// TurnCoordinator
// ---------------------------------------------------------------------------

pub struct TurnCoordinator {
    state: TurnState,
    session: Option<Session>,
    epoch: u64,

    /// Settings copied into each new [`Session`].
    config_text: String,
    mode: Option<String>,
    max_consecutive_errors: u32,
    consecutive_errors: u32,

    connector: Arc<dyn Connector>,
    link: Option<TransportLink>,
    input: SpeechInputAdapter,
    output: SpeechOutputAdapter,
    sentences: SentenceStreamBuffer,
    queue: VecDeque<String>,

    shared: SharedCallState,
    events_tx: mpsc::UnboundedSender<CoordinatorEvent>,
    events_rx: mpsc::UnboundedReceiver<CoordinatorEvent>,
}

impl TurnCoordinator {
    /// Create a coordinator.
    ///
    /// # Arguments
    ///
    /// * `shared`      : call state read by observers.
    /// * `connector`   : opens the backend connection (e.g. `WsConnector`).
    /// * `recognizer`  : speech-to-text capability.
    /// * `synthesizer` : text-to-speech capability.
    pub fn new(
        shared: SharedCallState,
        connector: Arc<dyn Connector>,
        recognizer: Box<dyn SpeechRecognizer>,
        synthesizer: Box<dyn SpeechSynthesizer>,
        settings: CoordinatorSettings,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            state: TurnState::Idle,
            session: None,
            epoch: 0,
            config_text: settings.config_text,
            mode: settings.mode,
            max_consecutive_errors: settings.max_consecutive_errors,
            consecutive_errors: 0,
            connector,
            link: None,
            input: SpeechInputAdapter::new(recognizer),
            output: SpeechOutputAdapter::new(synthesizer, settings.voice),
            sentences: SentenceStreamBuffer::new(settings.sentence_min_chars),
            queue: VecDeque::new(),
            shared,
            events_tx,
            events_rx,
        }
    }

    /// Run on a new tokio task and return the caller's handle.
    pub fn spawn(self) -> (CallHandle, JoinHandle<()>) {
        let (handle, commands) = call_channel(Arc::clone(&self.shared));
        let task = tokio::spawn(self.run(commands));
        (handle, task)
    }

    /// Event loop.  Returns after every [`CallHandle`] has been dropped.
    pub async fn run(mut self, mut commands: mpsc::UnboundedReceiver<SessionCommand>) {
        log::info!("TurnCoordinator: running");
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.apply(CoordinatorEvent::Command(command)),
                    None => {
                        log::info!("TurnCoordinator: command channel closed, shutting down");
                        break;
                    }
                },
                Some(event) = self.events_rx.recv() => self.apply(event),
            }
        }
        self.terminate(TurnState::Ended, READY_STATUS);
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Perform one transition.
    pub fn apply(&mut self, event: CoordinatorEvent) {
        match event {
            CoordinatorEvent::Command(command) => self.on_command(command),
            CoordinatorEvent::Connected { epoch, link } => self.on_connected(epoch, link),
            CoordinatorEvent::ConnectFailed { epoch, error } => {
                if self.is_live(epoch) {
                    self.fail(error.into());
                }
            }
            CoordinatorEvent::Transport { epoch, event } => self.on_transport(epoch, event),
            CoordinatorEvent::Recognition {
                epoch,
                generation,
                event,
            } => self.on_recognition(epoch, generation, event),
            CoordinatorEvent::Synthesis {
                epoch,
                utterance,
                event,
            } => self.on_synthesis(epoch, utterance, event),
        }
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    fn on_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Start => self.start_session(),
            SessionCommand::Stop => {
                if self.state.is_active() {
                    log::info!("TurnCoordinator: stop requested");
                    self.terminate(TurnState::Ended, READY_STATUS);
                } else {
                    log::debug!("TurnCoordinator: stop ignored in {:?}", self.state);
                }
            }
            SessionCommand::SubmitText(text) => {
                if self.state == TurnState::Listening {
                    self.submit_user_text(&text);
                } else {
                    log::debug!("TurnCoordinator: typed text ignored in {:?}", self.state);
                }
            }
            SessionCommand::UpdateConfig(text) => {
                if let Some(session) = self.session.as_mut() {
                    session.config_text = text.clone();
                }
                self.config_text = text;
            }
            SessionCommand::Frame(frame) => self.forward_frame(frame),
        }
    }

    fn start_session(&mut self) {
        if !self.state.can_start() {
            log::debug!("TurnCoordinator: start ignored in {:?}", self.state);
            return;
        }

        self.epoch += 1;
        self.consecutive_errors = 0;
        self.queue.clear();
        self.sentences.clear();

        let session = Session::new(self.config_text.clone(), self.mode.clone());
        log::info!("TurnCoordinator: starting session {}", session.id);
        {
            let mut s = self.shared.lock().unwrap();
            s.session_id = Some(session.id);
            s.log = Default::default();
            s.interim = None;
            s.error_message = None;
        }
        self.session = Some(session);
        self.set_state(TurnState::Connecting, "Connecting...");

        let epoch = self.epoch;
        let connector = Arc::clone(&self.connector);
        let tx = self.events_tx.clone();
        let sink_tx = tx.clone();
        let sink = TransportSink::new(move |event| {
            let _ = sink_tx.send(CoordinatorEvent::Transport { epoch, event });
        });
        tokio::spawn(async move {
            let event = match connector.connect(sink).await {
                Ok(link) => CoordinatorEvent::Connected { epoch, link },
                Err(error) => CoordinatorEvent::ConnectFailed { epoch, error },
            };
            let _ = tx.send(event);
        });
    }

    fn submit_user_text(&mut self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        let (Some(link), Some(session)) = (self.link.as_ref(), self.session.as_ref()) else {
            return;
        };

        let message = OutboundMessage::new(text, session.config_text.clone(), session.mode.clone());
        if let Err(e) = link.send(&message) {
            self.fail(e.into());
            return;
        }
        log::debug!("TurnCoordinator: sent user turn ({} chars)", text.len());

        let preview: String = text.chars().take(STATUS_PREVIEW_CHARS).collect();
        let mut s = self.shared.lock().unwrap();
        s.log.push(Role::User, text);
        s.interim = None;
        s.status = format!("Processing: {preview}...");
    }

    fn forward_frame(&mut self, frame: AudioFrame) {
        if self.state != TurnState::Listening {
            return;
        }
        if let Some(link) = self.link.as_ref() {
            if let Err(e) = link.send_frame(&frame) {
                log::debug!("TurnCoordinator: frame {} dropped: {e}", frame.seq());
            }
        }
    }

    // -----------------------------------------------------------------------
    // Transport
    // -----------------------------------------------------------------------

    fn on_connected(&mut self, epoch: u64, link: TransportLink) {
        if !self.is_live(epoch) || self.state != TurnState::Connecting {
            log::debug!("TurnCoordinator: closing stale connection");
            link.close();
            return;
        }
        self.link = Some(link);
        self.set_state(TurnState::Listening, "Connected • Listening...");

        if self.queue.is_empty() {
            self.start_listening();
        } else {
            self.drive_speech();
        }
    }

    fn on_transport(&mut self, epoch: u64, event: TransportEvent) {
        if !self.is_live(epoch) {
            return;
        }
        match event {
            TransportEvent::Message(message) => self.on_inbound(message),
            TransportEvent::Closed => {
                log::info!("TurnCoordinator: backend closed the connection");
                self.terminate(TurnState::Ended, "Disconnected");
            }
            TransportEvent::Error(reason) => {
                self.fail(TransportError::ClosedUnexpectedly(reason).into())
            }
        }
    }

    fn on_inbound(&mut self, message: InboundMessage) {
        match message {
            InboundMessage::Fragment(text) => {
                self.shared.lock().unwrap().log.extend_reply(&text);
                let units = self.sentences.push(&text);
                self.enqueue(units);
            }
            InboundMessage::EndOfStream => {
                self.shared.lock().unwrap().log.close_reply();
                let rest = self.sentences.finish();
                self.enqueue(rest);
            }
            InboundMessage::CompleteResponse(text) => {
                let open = self.sentences.finish();
                self.enqueue(open);
                {
                    let mut s = self.shared.lock().unwrap();
                    s.log.close_reply();
                    s.log.push(Role::Ai, text.as_str());
                }
                let units = self.sentences.push(&text);
                self.enqueue(units);
                let rest = self.sentences.finish();
                self.enqueue(rest);
            }
        }
        self.drive_speech();
    }

    // -----------------------------------------------------------------------
    // Recognition
    // -----------------------------------------------------------------------

    fn start_listening(&mut self) {
        if self.state != TurnState::Listening || self.output.is_speaking() {
            return;
        }
        let epoch = self.epoch;
        let tx = self.events_tx.clone();
        let started = self.input.start(move |generation, event| {
            let _ = tx.send(CoordinatorEvent::Recognition {
                epoch,
                generation,
                event,
            });
        });
        if let Err(e) = started {
            self.fail(SessionError::Speech(e));
        }
    }

    fn on_recognition(&mut self, epoch: u64, generation: u64, event: RecognitionEvent) {
        if !self.is_live(epoch) || !self.input.is_current(generation) {
            log::debug!("TurnCoordinator: stale recognition event dropped");
            return;
        }
        if event.ends_listen() {
            self.input.settle(generation);
        }

        match event {
            RecognitionEvent::Transcript(t) if !t.is_final => {
                self.shared.lock().unwrap().interim = Some(t.text);
                return;
            }
            RecognitionEvent::Transcript(t) => {
                self.consecutive_errors = 0;
                self.submit_user_text(&t.text);
            }
            RecognitionEvent::NoResult => {
                self.consecutive_errors = 0;
            }
            RecognitionEvent::Error(e) => {
                self.consecutive_errors += 1;
                log::warn!(
                    "TurnCoordinator: recognition error #{}: {e}",
                    self.consecutive_errors
                );
                if self.consecutive_errors > self.max_consecutive_errors {
                    self.fail(SessionError::RecognitionFailed {
                        count: self.consecutive_errors,
                        last: e,
                    });
                    return;
                }
            }
        }
        self.start_listening();
    }

    // -----------------------------------------------------------------------
    // Synthesis
    // -----------------------------------------------------------------------

    fn enqueue(&mut self, units: impl IntoIterator<Item = String>) {
        self.queue
            .extend(units.into_iter().filter(|u| !u.trim().is_empty()));
    }

    /// Speak the next queued unit if the synthesizer is free, otherwise go
    /// (back) to listening.
    fn drive_speech(&mut self) {
        if !matches!(self.state, TurnState::Listening | TurnState::Speaking) {
            return;
        }
        if self.output.is_speaking() {
            return;
        }

        while let Some(unit) = self.queue.pop_front() {
            self.input.abort();

            let epoch = self.epoch;
            let tx = self.events_tx.clone();
            let spoken = self.output.speak(&unit, move |utterance, event| {
                let _ = tx.send(CoordinatorEvent::Synthesis {
                    epoch,
                    utterance,
                    event,
                });
            });
            match spoken {
                Ok(_) => {
                    self.set_state(TurnState::Speaking, "AI Speaking...");
                    return;
                }
                Err(e @ SpeechError::CapabilityUnavailable(_)) => {
                    self.fail(SessionError::Speech(e));
                    return;
                }
                Err(e) => log::warn!("TurnCoordinator: skipping unit: {e}"),
            }
        }

        if self.state == TurnState::Speaking {
            self.set_state(TurnState::Listening, "Listening...");
        }
        self.start_listening();
    }

    fn on_synthesis(&mut self, epoch: u64, utterance: u64, event: SynthesisEvent) {
        if !self.is_live(epoch) || !self.output.is_current(utterance) {
            log::debug!("TurnCoordinator: stale synthesis event dropped");
            return;
        }
        match event {
            SynthesisEvent::Started => self.input.abort(),
            SynthesisEvent::Ended => {
                self.output.finish(utterance);
                self.drive_speech();
            }
            SynthesisEvent::Error(e) => {
                log::warn!("TurnCoordinator: synthesis failed: {e}");
                self.output.finish(utterance);
                self.drive_speech();
            }
        }
    }

    // -----------------------------------------------------------------------
    // Teardown
    // -----------------------------------------------------------------------

    fn fail(&mut self, error: SessionError) {
        log::error!("TurnCoordinator: {error}");
        let message = error.to_string();
        if self.terminate(TurnState::Error, &message) {
            self.shared.lock().unwrap().error_message = Some(message);
        }
    }

    /// Release every session resource.  Returns `false` when there was no
    /// active session (already torn down).
    fn terminate(&mut self, final_state: TurnState, status: &str) -> bool {
        if !self.state.is_active() {
            return false;
        }
        self.epoch += 1;

        self.output.cancel_all();
        self.input.abort();
        if let Some(link) = self.link.take() {
            link.close();
        }
        self.queue.clear();
        self.sentences.clear();
        self.consecutive_errors = 0;

        if let Some(session) = self.session.take() {
            log::info!(
                "TurnCoordinator: session {} -> {:?} after {}s",
                session.id,
                final_state,
                session.age().num_seconds()
            );
        }
        self.shared.lock().unwrap().interim = None;
        self.set_state(final_state, status);
        true
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn is_live(&self, epoch: u64) -> bool {
        epoch == self.epoch && self.state.is_active()
    }

    fn set_state(&mut self, state: TurnState, status: &str) {
        if self.state != state {
            log::debug!("TurnCoordinator: {:?} -> {:?}", self.state, state);
        }
        self.state = state;
        let mut s = self.shared.lock().unwrap();
        s.turn = state;
        s.status = status.to_string();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
