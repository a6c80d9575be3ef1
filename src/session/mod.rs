//! Session orchestration.
//!
//! [`TurnCoordinator`] runs a half-duplex voice call; [`ChatSession`] is the
//! text-only variant over the same transport.  Observers read
//! [`SharedCallState`] and talk to a running coordinator through a
//! [`CallHandle`].

pub mod chat;
pub mod coordinator;
pub mod events;
pub mod state;

pub use chat::ChatSession;
pub use coordinator::{CoordinatorSettings, TurnCoordinator};
pub use events::{call_channel, CallHandle, CoordinatorEvent, SessionCommand, SessionError};
pub use state::{
    new_shared_state, CallState, ConversationLog, ConversationMessage, Role, Session,
    SharedCallState, TurnState,
};
