//! JSON message framing for the dialogue backend.
//!
//! Outbound (client → backend):
//!
//! ```json
//! { "text": "book a repair", "config": "<knowledge base>", "mode": "hiring" }
//! ```
//!
//! Inbound (backend → client), one of:
//!
//! ```json
//! { "fullText": "complete reply" }
//! { "chunk": "partial reply" }
//! { "chunk": "[END]" }
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Chunk payload that marks the end of a streamed reply.
pub const END_OF_STREAM: &str = "[END]";

/// A user turn sent to the backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundMessage {
    pub text: String,
    /// Free-form operator configuration, forwarded verbatim every turn.
    pub config: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
}

impl OutboundMessage {
    pub fn new(text: impl Into<String>, config: impl Into<String>, mode: Option<String>) -> Self {
        Self {
            text: text.into(),
            config: config.into(),
            mode,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// A decoded backend message.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// The whole reply in one message.
    CompleteResponse(String),
    /// The next piece of a streamed reply.
    Fragment(String),
    /// The streamed reply is complete.
    EndOfStream,
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("message has neither `fullText` nor `chunk`")]
    UnknownShape,
}

#[derive(Deserialize)]
struct RawInbound {
    #[serde(rename = "fullText")]
    full_text: Option<String>,
    chunk: Option<String>,
}

impl InboundMessage {
    /// Decode one text frame.
    ///
    /// A non-empty `fullText` wins over `chunk` when both are present.
    ///
    /// ```rust
    /// use voice_dialogue::transport::InboundMessage;
    ///
    /// assert_eq!(
    ///     InboundMessage::parse(r#"{"chunk":"Hi"}"#).unwrap(),
    ///     InboundMessage::Fragment("Hi".into()),
    /// );
    /// assert_eq!(
    ///     InboundMessage::parse(r#"{"chunk":"[END]"}"#).unwrap(),
    ///     InboundMessage::EndOfStream,
    /// );
    /// assert!(InboundMessage::parse(r#"{"status":"ok"}"#).is_err());
    /// ```
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        let msg: RawInbound = serde_json::from_str(raw)?;
        match (msg.full_text, msg.chunk) {
            (Some(full), _) if !full.is_empty() => Ok(InboundMessage::CompleteResponse(full)),
            (_, Some(chunk)) if chunk == END_OF_STREAM => Ok(InboundMessage::EndOfStream),
            (_, Some(chunk)) => Ok(InboundMessage::Fragment(chunk)),
            (Some(full), None) => Ok(InboundMessage::CompleteResponse(full)),
            (None, None) => Err(ProtocolError::UnknownShape),
        }
    }
}
