//! Commands, internal events and session-fatal errors.

use thiserror::Error;
use tokio::sync::mpsc;

use crate::audio::AudioFrame;
use crate::speech::{RecognitionEvent, SpeechError, SynthesisEvent};
use crate::transport::{TransportError, TransportEvent, TransportLink};

use super::state::{CallState, SharedCallState};

// ---------------------------------------------------------------------------
// SessionCommand / CallHandle
// ---------------------------------------------------------------------------

/// Requests from the caller to the coordinator.
#[derive(Debug, Clone)]
pub enum SessionCommand {
    /// Open a new session (from `Idle`, `Ended` or `Error`).
    Start,
    /// End the active session.
    Stop,
    /// Typed input, handled like a final transcript.
    SubmitText(String),
    /// Replace the configuration text sent with later messages.
    UpdateConfig(String),
    /// One encoded microphone frame for the uplink.
    Frame(AudioFrame),
}

/// Caller-side handle to a running coordinator.
///
/// Cheap to clone.  When every clone is dropped the coordinator tears the
/// session down and its `run` future returns.
#[derive(Debug, Clone)]
pub struct CallHandle {
    tx: mpsc::UnboundedSender<SessionCommand>,
    state: SharedCallState,
}

/// Create a handle plus the command receiver to pass to
/// [`TurnCoordinator::run`](super::TurnCoordinator::run).
pub fn call_channel(state: SharedCallState) -> (CallHandle, mpsc::UnboundedReceiver<SessionCommand>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (CallHandle { tx, state }, rx)
}

impl CallHandle {
    /// Returns `false` once the coordinator has shut down.
    pub fn start(&self) -> bool {
        self.send(SessionCommand::Start)
    }

    pub fn stop(&self) -> bool {
        self.send(SessionCommand::Stop)
    }

    pub fn submit_text(&self, text: impl Into<String>) -> bool {
        self.send(SessionCommand::SubmitText(text.into()))
    }

    pub fn update_config(&self, text: impl Into<String>) -> bool {
        self.send(SessionCommand::UpdateConfig(text.into()))
    }

    pub fn send_frame(&self, frame: AudioFrame) -> bool {
        self.send(SessionCommand::Frame(frame))
    }

    /// Copy of the current call state.
    pub fn snapshot(&self) -> CallState {
        self.state.lock().unwrap().clone()
    }

    pub fn shared_state(&self) -> &SharedCallState {
        &self.state
    }

    fn send(&self, command: SessionCommand) -> bool {
        self.tx.send(command).is_ok()
    }
}

// ---------------------------------------------------------------------------
// CoordinatorEvent
// ---------------------------------------------------------------------------

/// Everything the coordinator's `apply` consumes.
///
/// Callback-originated variants carry the session `epoch` they were created
/// under, plus the listen generation or utterance id, so the coordinator can
/// drop events that outlived their session, listen or utterance.
#[derive(Debug)]
pub enum CoordinatorEvent {
    Command(SessionCommand),
    Connected {
        epoch: u64,
        link: TransportLink,
    },
    ConnectFailed {
        epoch: u64,
        error: TransportError,
    },
    Transport {
        epoch: u64,
        event: TransportEvent,
    },
    Recognition {
        epoch: u64,
        generation: u64,
        event: RecognitionEvent,
    },
    Synthesis {
        epoch: u64,
        utterance: u64,
        event: SynthesisEvent,
    },
}

// ---------------------------------------------------------------------------
// SessionError
// ---------------------------------------------------------------------------

/// Faults that end a session in `TurnState::Error`.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SessionError {
    #[error("{0}")]
    Speech(#[from] SpeechError),

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Connection error: {0}")]
    Transport(String),

    #[error("Speech recognition failed {count} times in a row: {last}")]
    RecognitionFailed { count: u32, last: String },
}

impl From<TransportError> for SessionError {
    fn from(error: TransportError) -> Self {
        match error {
            TransportError::Connect { .. } => SessionError::Connect(error.to_string()),
            other => SessionError::Transport(other.to_string()),
        }
    }
}
