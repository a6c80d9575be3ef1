//! Turn state, conversation log and shared call state.
//!
//! [`TurnState`] is owned by the coordinator.  Observers read a snapshot of
//! [`CallState`] through [`SharedCallState`] to render status and transcript.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// TurnState
// ---------------------------------------------------------------------------

/// States of a voice session.
///
/// ```text
/// Idle ──start──▶ Connecting ──connected──▶ Listening ⇄ Speaking
///                     │                         │          │
///                     └──connect error──▶ Error ◀── transport error
///                                               stop / transport closed ──▶ Ended
/// Idle / Ended / Error ──start──▶ Connecting
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TurnState {
    #[default]
    Idle,
    Connecting,
    Listening,
    Speaking,
    Ended,
    Error,
}

impl TurnState {
    /// `true` while a session holds resources.
    ///
    /// ```
    /// use voice_dialogue::session::TurnState;
    ///
    /// assert!(TurnState::Connecting.is_active());
    /// assert!(TurnState::Speaking.is_active());
    /// assert!(!TurnState::Ended.is_active());
    /// ```
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            TurnState::Connecting | TurnState::Listening | TurnState::Speaking
        )
    }

    /// States from which a new session may be started.
    pub fn can_start(&self) -> bool {
        !self.is_active()
    }

    pub fn label(&self) -> &'static str {
        match self {
            TurnState::Idle => "Idle",
            TurnState::Connecting => "Connecting",
            TurnState::Listening => "Listening",
            TurnState::Speaking => "Speaking",
            TurnState::Ended => "Ended",
            TurnState::Error => "Error",
        }
    }
}

// ---------------------------------------------------------------------------
// Conversation log
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Ai,
    System,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConversationMessage {
    pub role: Role,
    pub text: String,
    /// Zero-based position in the log.
    pub position: usize,
}

/// Append-only transcript of one session.
///
/// A streamed AI reply grows in place: the first fragment opens an AI
/// message, later fragments extend it until the stream ends.
#[derive(Debug, Clone, Default)]
pub struct ConversationLog {
    messages: Vec<ConversationMessage>,
    open_reply: bool,
}

impl ConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, role: Role, text: impl Into<String>) {
        let position = self.messages.len();
        self.messages.push(ConversationMessage {
            role,
            text: text.into(),
            position,
        });
        self.open_reply = false;
    }

    /// Append `fragment` to the open AI reply, opening one if needed.
    pub fn extend_reply(&mut self, fragment: &str) {
        match self.messages.last_mut() {
            Some(last) if self.open_reply && last.role == Role::Ai => last.text.push_str(fragment),
            _ => {
                self.push(Role::Ai, fragment);
                self.open_reply = true;
            }
        }
    }

    /// Close the open AI reply; the next fragment starts a new message.
    pub fn close_reply(&mut self) {
        self.open_reply = false;
    }

    /// `true` while a streamed AI reply may still grow.
    pub fn is_reply_open(&self) -> bool {
        self.open_reply
    }

    /// Number of leading messages that will not change any more: all of
    /// them, minus a still-open streamed reply.
    pub fn settled_len(&self) -> usize {
        if self.open_reply {
            self.messages.len().saturating_sub(1)
        } else {
            self.messages.len()
        }
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.open_reply = false;
    }

    pub fn messages(&self) -> &[ConversationMessage] {
        &self.messages
    }

    pub fn last(&self) -> Option<&ConversationMessage> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Identity and settings of one connection lifetime.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: Uuid,
    pub config_text: String,
    pub mode: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn new(config_text: impl Into<String>, mode: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            config_text: config_text.into(),
            mode,
            created_at: Utc::now(),
        }
    }

    /// Time since the session was opened.
    pub fn age(&self) -> chrono::Duration {
        Utc::now() - self.created_at
    }
}

// ---------------------------------------------------------------------------
// CallState
// ---------------------------------------------------------------------------

/// Everything an observer needs to render a call.
#[derive(Debug, Clone, Default)]
pub struct CallState {
    pub turn: TurnState,

    /// One-line human-readable status ("Connecting...", "AI Speaking...").
    pub status: String,

    pub session_id: Option<Uuid>,

    pub log: ConversationLog,

    /// Latest interim transcript, cleared when the utterance is final.
    pub interim: Option<String>,

    /// Set when `turn == TurnState::Error`.
    pub error_message: Option<String>,
}

/// Thread-safe handle to [`CallState`].
///
/// Lock with `.lock().unwrap()` for a short critical section; never hold
/// the lock across `.await`.
pub type SharedCallState = Arc<Mutex<CallState>>;

pub fn new_shared_state() -> SharedCallState {
    Arc::new(Mutex::new(CallState::default()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
