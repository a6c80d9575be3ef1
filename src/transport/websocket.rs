//! WebSocket connector (tokio-tungstenite).
//!
//! ```text
//! connect_async(url) ──▶ split
//!   write half ◀── writer task ◀── TransportLink queue
//!   read half  ──▶ reader task ──▶ InboundMessage::parse ──▶ EventSink
//! ```

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::Message;

use super::link::{Outgoing, TransportLink};
use super::protocol::InboundMessage;
use super::{Connector, TransportError, TransportEvent, TransportSink};

pub struct WsConnector {
    url: String,
    connect_timeout: Duration,
}

impl WsConnector {
    pub fn new(url: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            url: url.into(),
            connect_timeout,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn connect_error(&self, reason: impl Into<String>) -> TransportError {
        TransportError::Connect {
            url: self.url.clone(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, events: TransportSink) -> Result<TransportLink, TransportError> {
        log::info!("transport: connecting to {}", self.url);

        let stream = match tokio::time::timeout(self.connect_timeout, connect_async(self.url.as_str())).await {
            Ok(Ok((stream, _response))) => stream,
            Ok(Err(e)) => return Err(self.connect_error(e.to_string())),
            Err(_) => {
                return Err(self.connect_error(format!(
                    "timed out after {:.1}s",
                    self.connect_timeout.as_secs_f32()
                )))
            }
        };
        log::info!("transport: connected to {}", self.url);

        let (mut write, mut read) = stream.split();
        let (link, mut outgoing) = TransportLink::channel();

        tokio::spawn(async move {
            while let Some(item) = outgoing.recv().await {
                let result = match item {
                    Outgoing::Text(text) => write.send(Message::Text(text.into())).await,
                    Outgoing::Binary(bytes) => write.send(Message::Binary(bytes.into())).await,
                    Outgoing::Close => break,
                };
                if let Err(e) = result {
                    log::warn!("transport: write failed: {e}");
                    break;
                }
            }
            let _ = write.close().await;
            log::debug!("transport: writer finished");
        });

        tokio::spawn(async move {
            while let Some(frame) = read.next().await {
                match frame {
                    Ok(Message::Text(text)) => match InboundMessage::parse(text.as_str()) {
                        Ok(message) => events.emit(TransportEvent::Message(message)),
                        Err(e) => log::warn!("transport: ignoring inbound message: {e}"),
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        log::warn!("transport: read failed: {e}");
                        events.emit(TransportEvent::Error(e.to_string()));
                        return;
                    }
                }
            }
            log::info!("transport: connection closed");
            events.emit(TransportEvent::Closed);
        });

        Ok(link)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioFrameEncoder;
    use crate::transport::OutboundMessage;
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;
    use tokio_tungstenite::accept_async;

    fn collecting_sink() -> (TransportSink, mpsc::UnboundedReceiver<TransportEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = TransportSink::new(move |ev| {
            let _ = tx.send(ev);
        });
        (sink, rx)
    }

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<TransportEvent>) -> TransportEvent {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for transport event")
            .expect("event channel closed")
    }

    #[tokio::test]
    async fn exchanges_messages_with_loopback_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(tcp).await.unwrap();

            let first = ws.next().await.unwrap().unwrap();
            let second = ws.next().await.unwrap().unwrap();

            ws.send(Message::Text("not json".into())).await.unwrap();
            ws.send(Message::Text(r#"{"chunk":"Hello"}"#.into())).await.unwrap();
            ws.send(Message::Text(r#"{"chunk":"[END]"}"#.into())).await.unwrap();
            ws.close(None).await.unwrap();
            (first, second)
        });

        let connector = WsConnector::new(format!("ws://{addr}"), Duration::from_secs(5));
        let (sink, mut events) = collecting_sink();
        let link = connector.connect(sink).await.unwrap();

        link.send(&OutboundMessage::new("book a repair", "cfg", Some("hiring".into())))
            .unwrap();
        let mut enc = AudioFrameEncoder::new(2, 16_000);
        link.send_frame(&enc.push(&[0.0, 1.0]).remove(0)).unwrap();

        assert_eq!(
            next_event(&mut events).await,
            TransportEvent::Message(InboundMessage::Fragment("Hello".into()))
        );
        assert_eq!(
            next_event(&mut events).await,
            TransportEvent::Message(InboundMessage::EndOfStream)
        );
        assert_eq!(next_event(&mut events).await, TransportEvent::Closed);

        let (first, second) = server.await.unwrap();
        match first {
            Message::Text(text) => {
                let value: serde_json::Value = serde_json::from_str(text.as_str()).unwrap();
                assert_eq!(value["text"], "book a repair");
                assert_eq!(value["mode"], "hiring");
            }
            other => panic!("expected text, got {other:?}"),
        }
        match second {
            Message::Binary(bytes) => assert_eq!(bytes.to_vec(), vec![0x00, 0x00, 0xff, 0x7f]),
            other => panic!("expected binary, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn refused_connection_is_connect_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let connector = WsConnector::new(format!("ws://{addr}"), Duration::from_secs(5));
        let (sink, _events) = collecting_sink();
        let err = connector.connect(sink).await.unwrap_err();
        assert!(matches!(err, TransportError::Connect { .. }));
    }

    #[tokio::test]
    async fn invalid_url_is_connect_error() {
        let connector = WsConnector::new("not a url", Duration::from_secs(1));
        let (sink, _events) = collecting_sink();
        assert!(matches!(
            connector.connect(sink).await,
            Err(TransportError::Connect { .. })
        ));
    }
}
