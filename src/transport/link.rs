//! Sending half of an open backend connection.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::audio::AudioFrame;

use super::protocol::OutboundMessage;
use super::TransportError;

/// Work item for the connection's writer task.
#[derive(Debug, Clone, PartialEq)]
pub enum Outgoing {
    Text(String),
    Binary(Vec<u8>),
    Close,
}

/// Cloneable handle used to write to an open connection.
///
/// Sends are non-blocking; the writer task drains the queue.  Once
/// [`close`](Self::close) has been called (from any clone) every later send
/// fails with [`TransportError::NotConnected`].
#[derive(Debug, Clone)]
pub struct TransportLink {
    tx: mpsc::UnboundedSender<Outgoing>,
    closed: Arc<AtomicBool>,
}

impl TransportLink {
    /// Create a link plus the receiver a writer task should drain.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Outgoing>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let link = Self {
            tx,
            closed: Arc::new(AtomicBool::new(false)),
        };
        (link, rx)
    }

    /// Serialize and queue one user turn.
    pub fn send(&self, message: &OutboundMessage) -> Result<(), TransportError> {
        let json = message.to_json()?;
        self.push(Outgoing::Text(json))
    }

    /// Queue one PCM frame as a binary message.
    pub fn send_frame(&self, frame: &AudioFrame) -> Result<(), TransportError> {
        self.push(Outgoing::Binary(frame.to_le_bytes()))
    }

    /// Ask the writer to close the connection.  Idempotent.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            let _ = self.tx.send(Outgoing::Close);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst) || self.tx.is_closed()
    }

    fn push(&self, item: Outgoing) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::NotConnected);
        }
        self.tx.send(item).map_err(|_| TransportError::NotConnected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioFrameEncoder;

    #[test]
    fn send_queues_json_text() {
        let (link, mut rx) = TransportLink::channel();
        link.send(&OutboundMessage::new("hi", "cfg", None)).unwrap();
        assert_eq!(
            rx.try_recv().unwrap(),
            Outgoing::Text(r#"{"text":"hi","config":"cfg"}"#.into())
        );
    }

    #[test]
    fn send_frame_queues_le_bytes() {
        let (link, mut rx) = TransportLink::channel();
        let mut enc = AudioFrameEncoder::new(2, 16_000);
        let frame = enc.push(&[1.0, -1.0]).remove(0);
        link.send_frame(&frame).unwrap();
        assert_eq!(
            rx.try_recv().unwrap(),
            Outgoing::Binary(vec![0xff, 0x7f, 0x00, 0x80])
        );
    }

    #[test]
    fn close_is_idempotent_and_blocks_sends() {
        let (link, mut rx) = TransportLink::channel();
        let other = link.clone();
        link.close();
        other.close();

        assert_eq!(rx.try_recv().unwrap(), Outgoing::Close);
        assert!(rx.try_recv().is_err());
        assert!(other.is_closed());
        assert!(matches!(
            other.send(&OutboundMessage::new("x", "", None)),
            Err(TransportError::NotConnected)
        ));
    }

    #[test]
    fn dropped_writer_reads_as_closed() {
        let (link, rx) = TransportLink::channel();
        drop(rx);
        assert!(link.is_closed());
        assert!(link.send(&OutboundMessage::new("x", "", None)).is_err());
    }
}
