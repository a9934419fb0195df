//! Transport seam.
//!
//! The session logic only needs a message-oriented duplex channel: send text,
//! receive text, learn when it closed.  A [`Connector`] opens one such
//! [`Link`]; [`WsConnector`] is the WebSocket implementation.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use crate::types::TransportError;

/// Inbound buffer.  Outbound is unbounded; the socket sink paces it.
const INBOUND_CAPACITY: usize = 64;

/// Something the transport reports to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    Text(String),
    /// Terminal.  No further events follow.
    Closed { reason: String },
}

/// Something the client asks the transport to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Text(String),
    Close,
}

/// Client side of an open connection.
#[derive(Debug)]
pub struct Link {
    pub outbound: mpsc::UnboundedSender<Outbound>,
    pub inbound: mpsc::Receiver<LinkEvent>,
}

/// Transport side of a [`Link`], for connector implementations.
#[derive(Debug)]
pub struct LinkPeer {
    pub to_client: mpsc::Sender<LinkEvent>,
    pub from_client: mpsc::UnboundedReceiver<Outbound>,
}

impl Link {
    /// Create a connected link/peer pair.
    pub fn pair() -> (Link, LinkPeer) {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::channel(INBOUND_CAPACITY);
        (
            Link {
                outbound: out_tx,
                inbound: in_rx,
            },
            LinkPeer {
                to_client: in_tx,
                from_client: out_rx,
            },
        )
    }

    /// Whether the transport still accepts outbound messages.
    pub fn is_open(&self) -> bool {
        !self.outbound.is_closed()
    }

    /// Queue a text frame without waiting.  Fails only if the transport is
    /// gone.
    pub fn send_text(&self, text: String) -> Result<(), TransportError> {
        self.outbound
            .send(Outbound::Text(text))
            .map_err(|_| TransportError::Closed("transport is gone".into()))
    }

    /// Ask the transport to close.  Best effort.
    pub fn close(&self) {
        let _ = self.outbound.send(Outbound::Close);
    }
}

/// Opens connections to the engine.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn open(&self, url: &str) -> Result<Link, TransportError>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// WebSocket connector
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// [`Connector`] over `tokio-tungstenite`.
///
/// Each link runs a writer task (draining [`Outbound`]) and a reader task
/// (forwarding text frames); whichever notices the socket die first reports
/// [`LinkEvent::Closed`].
#[derive(Debug, Clone, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn open(&self, url: &str) -> Result<Link, TransportError> {
        let (ws, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| TransportError::Open(e.to_string()))?;
        let (mut sink, mut stream) = ws.split();

        let (link, peer) = Link::pair();
        let LinkPeer {
            to_client,
            mut from_client,
        } = peer;

        // Writer task: sends outbound frames to the socket.
        let writer_events = to_client.clone();
        tokio::spawn(async move {
            while let Some(out) = from_client.recv().await {
                match out {
                    Outbound::Text(text) => {
                        if let Err(e) = sink.send(Message::Text(text)).await {
                            let _ = writer_events
                                .send(LinkEvent::Closed {
                                    reason: format!("write failed: {e}"),
                                })
                                .await;
                            return;
                        }
                    }
                    Outbound::Close => break,
                }
            }
            if let Err(e) = sink.close().await {
                tracing::debug!(error = %e, "error closing websocket");
            }
        });

        // Reader task: forwards inbound text frames until the socket ends.
        tokio::spawn(async move {
            let reason = loop {
                match stream.next().await {
                    Some(Ok(Message::Text(text))) => {
                        if to_client.send(LinkEvent::Text(text)).await.is_err() {
                            // Client dropped the link.
                            return;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        break match frame {
                            Some(f) if !f.reason.is_empty() => f.reason.to_string(),
                            _ => "closed by peer".to_string(),
                        };
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => break e.to_string(),
                    None => break "stream ended".to_string(),
                }
            };
            let _ = to_client.send(LinkEvent::Closed { reason }).await;
        });

        Ok(link)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pair_carries_both_directions() {
        let (mut link, mut peer) = Link::pair();
        assert!(link.is_open());

        link.send_text("hello".into()).unwrap();
        assert_eq!(peer.from_client.recv().await, Some(Outbound::Text("hello".into())));

        peer.to_client.send(LinkEvent::Text("world".into())).await.unwrap();
        assert_eq!(link.inbound.recv().await, Some(LinkEvent::Text("world".into())));

        link.close();
        assert_eq!(peer.from_client.recv().await, Some(Outbound::Close));
    }

    #[tokio::test]
    async fn sends_queue_past_the_inbound_buffer_size() {
        let (link, mut peer) = Link::pair();
        for i in 0..(INBOUND_CAPACITY * 2) {
            link.send_text(format!("frame {i}")).unwrap();
        }
        for i in 0..(INBOUND_CAPACITY * 2) {
            assert_eq!(peer.from_client.recv().await, Some(Outbound::Text(format!("frame {i}"))));
        }
    }

    #[tokio::test]
    async fn link_reports_closed_once_peer_is_gone() {
        let (link, peer) = Link::pair();
        drop(peer);
        assert!(!link.is_open());
        assert!(link.send_text("x".into()).is_err());
    }

    #[tokio::test]
    async fn ws_open_failure_is_reported() {
        // Nothing listens on port 9 of the loopback interface in test environments.
        let err = WsConnector.open("ws://127.0.0.1:9/ws").await.unwrap_err();
        assert!(matches!(err, TransportError::Open(_)), "{err:?}");
    }
}
