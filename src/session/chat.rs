//! Text-only chat over the same backend connection.
//!
//! No speech capabilities are involved: typed lines go out as
//! [`OutboundMessage`]s and replies are collected into a
//! [`ConversationLog`].

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::transport::{
    Connector, InboundMessage, OutboundMessage, TransportError, TransportEvent, TransportLink,
    TransportSink,
};

use super::state::{ConversationLog, ConversationMessage, Role};

pub const GREETING: &str = "Hello! I am connected and ready to help.";
pub const ENDED_NOTICE: &str = "Chat session ended.";

pub struct ChatSession {
    connector: Arc<dyn Connector>,
    config_text: String,
    mode: Option<String>,
    log: ConversationLog,
    link: Option<TransportLink>,
    events: Option<mpsc::UnboundedReceiver<TransportEvent>>,
}

impl ChatSession {
    pub fn new(connector: Arc<dyn Connector>, config_text: impl Into<String>, mode: Option<String>) -> Self {
        Self {
            connector,
            config_text: config_text.into(),
            mode,
            log: ConversationLog::new(),
            link: None,
            events: None,
        }
    }

    /// Open the connection and start a fresh log with the greeting.  No-op
    /// when already open.
    pub async fn connect(&mut self) -> Result<(), TransportError> {
        if self.is_open() {
            return Ok(());
        }
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = TransportSink::new(move |event| {
            let _ = tx.send(event);
        });
        let link = self.connector.connect(sink).await?;

        self.link = Some(link);
        self.events = Some(rx);
        self.log.clear();
        self.log.push(Role::Ai, GREETING);
        log::info!("chat: connected");
        Ok(())
    }

    /// Post a user message and send it to the backend.
    ///
    /// Blank input is ignored.
    pub fn send(&mut self, text: &str) -> Result<(), TransportError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(());
        }
        let link = self.link.as_ref().ok_or(TransportError::NotConnected)?;
        link.send(&OutboundMessage::new(text, self.config_text.clone(), self.mode.clone()))?;
        self.log.push(Role::User, text);
        Ok(())
    }

    /// Wait for the next backend event and fold it into the log.
    ///
    /// Returns `None` once the session is closed.
    pub async fn next_event(&mut self) -> Option<TransportEvent> {
        let event = self.events.as_mut()?.recv().await?;
        match &event {
            TransportEvent::Message(InboundMessage::CompleteResponse(text)) => {
                self.log.close_reply();
                self.log.push(Role::Ai, text.as_str());
            }
            TransportEvent::Message(InboundMessage::Fragment(text)) => self.log.extend_reply(text),
            TransportEvent::Message(InboundMessage::EndOfStream) => self.log.close_reply(),
            TransportEvent::Closed => self.close(),
            TransportEvent::Error(e) => {
                log::warn!("chat: connection error: {e}");
                self.close();
            }
        }
        Some(event)
    }

    /// Close the connection.  Idempotent.
    pub fn close(&mut self) {
        let Some(link) = self.link.take() else {
            return;
        };
        link.close();
        self.events = None;
        self.log.push(Role::System, ENDED_NOTICE);
        log::info!("chat: session ended");
    }

    pub fn is_open(&self) -> bool {
        self.link.is_some()
    }

    pub fn messages(&self) -> &[ConversationMessage] {
        self.log.messages()
    }

    pub fn update_config(&mut self, text: impl Into<String>) {
        self.config_text = text.into();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::transport::Outgoing;

    #[derive(Default)]
    struct Wire {
        sink: Option<TransportSink>,
        outgoing: Option<mpsc::UnboundedReceiver<Outgoing>>,
    }

    struct LoopConnector(Arc<Mutex<Wire>>);

    #[async_trait]
    impl Connector for LoopConnector {
        async fn connect(&self, events: TransportSink) -> Result<TransportLink, TransportError> {
            let (link, rx) = TransportLink::channel();
            let mut wire = self.0.lock().unwrap();
            wire.sink = Some(events);
            wire.outgoing = Some(rx);
            Ok(link)
        }
    }

    async fn connected() -> (ChatSession, Arc<Mutex<Wire>>) {
        let wire = Arc::new(Mutex::new(Wire::default()));
        let mut chat = ChatSession::new(
            Arc::new(LoopConnector(Arc::clone(&wire))),
            "Spring sale on boilers.",
            Some("marketing".into()),
        );
        chat.connect().await.unwrap();
        (chat, wire)
    }

    fn backend_says(wire: &Arc<Mutex<Wire>>, event: TransportEvent) {
        wire.lock().unwrap().sink.clone().unwrap().emit(event);
    }

    #[tokio::test]
    async fn connect_posts_greeting() {
        let (chat, _wire) = connected().await;
        assert_eq!(chat.messages().len(), 1);
        assert_eq!(chat.messages()[0].role, Role::Ai);
        assert_eq!(chat.messages()[0].text, GREETING);
    }

    #[tokio::test]
    async fn send_posts_user_message_with_mode() {
        let (mut chat, wire) = connected().await;
        chat.send("  what's on offer?  ").unwrap();

        assert_eq!(chat.messages().last().unwrap().text, "what's on offer?");
        let sent = wire.lock().unwrap().outgoing.as_mut().unwrap().try_recv().unwrap();
        let Outgoing::Text(json) = sent else {
            panic!("expected text");
        };
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["mode"], "marketing");
        assert_eq!(value["config"], "Spring sale on boilers.");
    }

    #[tokio::test]
    async fn blank_input_is_ignored() {
        let (mut chat, wire) = connected().await;
        chat.send("   ").unwrap();
        assert_eq!(chat.messages().len(), 1);
        assert!(wire.lock().unwrap().outgoing.as_mut().unwrap().try_recv().is_err());
    }

    #[tokio::test]
    async fn streamed_reply_grows_one_message() {
        let (mut chat, wire) = connected().await;
        chat.send("hi").unwrap();
        for part in ["Twenty", " percent off."] {
            backend_says(&wire, TransportEvent::Message(InboundMessage::Fragment(part.into())));
            chat.next_event().await.unwrap();
        }
        backend_says(&wire, TransportEvent::Message(InboundMessage::EndOfStream));
        chat.next_event().await.unwrap();

        assert_eq!(chat.messages().len(), 3);
        assert_eq!(chat.messages()[2].text, "Twenty percent off.");
    }

    #[tokio::test]
    async fn full_text_is_its_own_message() {
        let (mut chat, wire) = connected().await;
        backend_says(
            &wire,
            TransportEvent::Message(InboundMessage::CompleteResponse("Welcome back.".into())),
        );
        chat.next_event().await.unwrap();
        assert_eq!(chat.messages().last().unwrap().text, "Welcome back.");
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let (mut chat, _wire) = connected().await;
        chat.close();
        chat.close();
        let notices = chat
            .messages()
            .iter()
            .filter(|m| m.role == Role::System && m.text == ENDED_NOTICE)
            .count();
        assert_eq!(notices, 1);
        assert!(chat.send("hello").is_err());
        assert!(chat.next_event().await.is_none());
    }

    #[tokio::test]
    async fn reconnect_starts_a_fresh_log() {
        let (mut chat, _wire) = connected().await;
        chat.send("hi").unwrap();
        chat.close();
        chat.connect().await.unwrap();

        assert_eq!(chat.messages().len(), 1);
        assert_eq!(chat.messages()[0].role, Role::Ai);
        assert_eq!(chat.messages()[0].text, GREETING);
        assert_eq!(chat.messages()[0].position, 0);
        assert!(chat.is_open());
    }

    #[tokio::test]
    async fn remote_close_ends_session() {
        let (mut chat, wire) = connected().await;
        backend_says(&wire, TransportEvent::Closed);
        assert_eq!(chat.next_event().await, Some(TransportEvent::Closed));
        assert!(!chat.is_open());
        assert_eq!(chat.messages().last().unwrap().text, ENDED_NOTICE);
    }
}
