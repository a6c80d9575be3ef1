//! Persistent duplex connection to the dialogue backend.
//!
//! # Architecture
//!
//! ```text
//! Connector::connect ──▶ TransportLink (send / send_frame / close)
//!                    └─▶ EventSink<TransportEvent> (Message / Closed / Error)
//! ```
//!
//! [`WsConnector`] is the WebSocket implementation.  Session code depends
//! only on the [`Connector`] trait so tests can swap in an in-memory link.

pub mod link;
pub mod protocol;
pub mod websocket;

use async_trait::async_trait;
use thiserror::Error;

use crate::events::EventSink;

pub use link::{Outgoing, TransportLink};
pub use protocol::{InboundMessage, OutboundMessage, ProtocolError, END_OF_STREAM};
pub use websocket::WsConnector;

// ---------------------------------------------------------------------------
// TransportError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum TransportError {
    /// The connection could not be established (refused, bad URL, timeout).
    #[error("could not connect to {url}: {reason}")]
    Connect { url: String, reason: String },

    #[error("connection closed unexpectedly: {0}")]
    ClosedUnexpectedly(String),

    #[error("not connected")]
    NotConnected,

    #[error("could not encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// TransportEvent
// ---------------------------------------------------------------------------

/// What the reading side of a connection reports.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Message(InboundMessage),
    /// The peer (or our own `close`) ended the connection cleanly.
    Closed,
    /// The connection broke mid-stream; no further events follow.  Session
    /// code reports it as [`TransportError::ClosedUnexpectedly`].
    Error(String),
}

pub type TransportSink = EventSink<TransportEvent>;

// ---------------------------------------------------------------------------
// Connector
// ---------------------------------------------------------------------------

/// Opens connections to the backend.
///
/// Malformed inbound messages are logged and dropped by the implementation;
/// only decoded [`InboundMessage`]s reach `events`.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, events: TransportSink) -> Result<TransportLink, TransportError>;
}

// Compile-time assertion: Connector is object-safe.
const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn Connector>) {}
};
